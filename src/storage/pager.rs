//! # Page Manager
//!
//! The page manager sits between the blob layer and the raw mmap storage.
//! It hands out page views, allocates contiguous page runs, returns freed
//! runs to an in-memory pool, and tracks dirty pages for `sync()`.
//!
//! ## Free-Run Pool
//!
//! Freed pages are kept as coalesced runs in a `BTreeMap<start, count>`.
//! Allocation is first-fit: the lowest-addressed run large enough is split.
//! Adjacent runs merge on free, so a multi-page blob erased page by page
//! does not fragment the pool.
//!
//! The pool is an in-memory structure. Freed pages are stamped with a
//! `Free` page header, and the environment rebuilds the pool by scanning
//! page headers on open; a page whose header is still zeroed (grown but
//! never initialized, e.g. after an aborted operation) is reclaimed as free
//! by the same scan.
//!
//! ## Dirty Tracking
//!
//! `page_mut` marks the page dirty. `sync()` flushes the mapping and clears
//! the set. The set exists so callers can observe which pages an operation
//! touched; the mmap itself is the write-back mechanism.
//!
//! ## Thread Safety
//!
//! Not internally synchronized. The environment serializes mutators; shared
//! readers only need `&self`.

use std::collections::BTreeMap;

use eyre::{bail, ensure, Result};
use hashbrown::HashSet;
use tracing::{debug, trace};

use super::{MmapStorage, PageHeader, PageType};

#[derive(Debug)]
pub struct PageManager {
    storage: MmapStorage,
    free_runs: BTreeMap<u32, u32>,
    dirty: HashSet<u32>,
}

impl PageManager {
    pub fn new(storage: MmapStorage) -> Self {
        Self {
            storage,
            free_runs: BTreeMap::new(),
            dirty: HashSet::new(),
        }
    }

    pub fn page_size(&self) -> usize {
        self.storage.page_size()
    }

    pub fn page_count(&self) -> u32 {
        self.storage.page_count()
    }

    pub fn file_size(&self) -> u64 {
        self.storage.file_size()
    }

    pub fn free_page_count(&self) -> u32 {
        self.free_runs.values().sum()
    }

    pub fn page(&self, page_no: u32) -> Result<&[u8]> {
        self.storage.page(page_no)
    }

    pub fn page_mut(&mut self, page_no: u32) -> Result<&mut [u8]> {
        self.dirty.insert(page_no);
        self.storage.page_mut(page_no)
    }

    pub fn mark_dirty(&mut self, page_no: u32) {
        self.dirty.insert(page_no);
    }

    pub fn is_dirty(&self, page_no: u32) -> bool {
        self.dirty.contains(&page_no)
    }

    pub fn prefetch_pages(&self, start_page: u32, count: u32) {
        self.storage.prefetch_pages(start_page, count);
    }

    /// Allocates `count` contiguous pages, reusing a pooled run when one is
    /// large enough, growing the file otherwise. Returns the first page
    /// number of the run.
    pub fn allocate_pages(&mut self, count: u32) -> Result<u32> {
        ensure!(count >= 1, "page run length must be at least 1");

        let hit = self
            .free_runs
            .iter()
            .find(|(_, &len)| len >= count)
            .map(|(&start, &len)| (start, len));

        if let Some((start, len)) = hit {
            self.free_runs.remove(&start);
            if len > count {
                self.free_runs.insert(start + count, len - count);
            }
            trace!(start, count, "reusing pooled page run");
            return Ok(start);
        }

        let start = self.storage.page_count();
        let new_count = start
            .checked_add(count)
            .ok_or_else(|| eyre::eyre!("page count overflow allocating {} pages", count))?;
        self.storage.grow(new_count)?;
        debug!(start, count, new_count, "grew environment file");
        Ok(start)
    }

    /// Returns a contiguous run to the pool and stamps each page `Free`.
    pub fn free_pages(&mut self, start: u32, count: u32) -> Result<()> {
        ensure!(count >= 1, "page run length must be at least 1");
        ensure!(start >= 1, "page 0 cannot be freed");
        ensure!(
            start
                .checked_add(count)
                .is_some_and(|end| end <= self.storage.page_count()),
            "page run {}..{} out of bounds (page_count={})",
            start,
            start as u64 + count as u64,
            self.storage.page_count()
        );

        for page_no in start..start + count {
            let page = self.page_mut(page_no)?;
            PageHeader::new(PageType::Free).write_to(page)?;
        }

        self.register_free_run(start, count)
    }

    /// Records a free run in the pool without touching page contents. Used
    /// by the environment when it rebuilds the pool from page headers.
    pub fn register_free_run(&mut self, start: u32, count: u32) -> Result<()> {
        ensure!(count >= 1, "page run length must be at least 1");

        let mut start = start;
        let mut count = count;

        if let Some((&prev_start, &prev_len)) = self.free_runs.range(..start).next_back() {
            if prev_start + prev_len > start {
                bail!("page run starting at {} overlaps freed run {}", prev_start, start);
            }
            if prev_start + prev_len == start {
                self.free_runs.remove(&prev_start);
                start = prev_start;
                count += prev_len;
            }
        }

        ensure!(
            self.free_runs.range(start..start + count).next().is_none(),
            "page run starting at {} overlaps a pooled run",
            start
        );

        if let Some(&next_len) = self.free_runs.get(&(start + count)) {
            self.free_runs.remove(&(start + count));
            count += next_len;
        }

        self.free_runs.insert(start, count);
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.storage.sync()?;
        self.dirty.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_manager(pages: u32) -> PageManager {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.keep().join("pager.bdb");
        PageManager::new(MmapStorage::create(&path, 4096, pages).unwrap())
    }

    #[test]
    fn allocate_grows_when_pool_empty() {
        let mut pager = scratch_manager(1);

        let start = pager.allocate_pages(3).unwrap();

        assert_eq!(start, 1);
        assert_eq!(pager.page_count(), 4);
    }

    #[test]
    fn freed_run_is_reused() {
        let mut pager = scratch_manager(1);
        let start = pager.allocate_pages(3).unwrap();
        pager.free_pages(start, 3).unwrap();

        let again = pager.allocate_pages(3).unwrap();

        assert_eq!(again, start);
        assert_eq!(pager.page_count(), 4);
    }

    #[test]
    fn larger_run_is_split() {
        let mut pager = scratch_manager(1);
        let start = pager.allocate_pages(4).unwrap();
        pager.free_pages(start, 4).unwrap();

        let a = pager.allocate_pages(1).unwrap();
        let b = pager.allocate_pages(3).unwrap();

        assert_eq!(a, start);
        assert_eq!(b, start + 1);
        assert_eq!(pager.free_page_count(), 0);
    }

    #[test]
    fn adjacent_runs_coalesce() {
        let mut pager = scratch_manager(1);
        let start = pager.allocate_pages(4).unwrap();

        pager.free_pages(start, 2).unwrap();
        pager.free_pages(start + 2, 2).unwrap();

        // a 4-page allocation must fit in the coalesced run
        assert_eq!(pager.allocate_pages(4).unwrap(), start);
    }

    #[test]
    fn freed_pages_are_stamped() {
        let mut pager = scratch_manager(1);
        let start = pager.allocate_pages(1).unwrap();
        pager.free_pages(start, 1).unwrap();

        let header = PageHeader::from_bytes(pager.page(start).unwrap()).unwrap();
        assert_eq!(header.page_type(), PageType::Free);
    }

    #[test]
    fn page_zero_cannot_be_freed() {
        let mut pager = scratch_manager(2);
        assert!(pager.free_pages(0, 1).is_err());
    }

    #[test]
    fn page_mut_marks_dirty() {
        let mut pager = scratch_manager(2);
        assert!(!pager.is_dirty(1));

        pager.page_mut(1).unwrap();

        assert!(pager.is_dirty(1));
    }
}
