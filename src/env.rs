//! # Environment Lifecycle
//!
//! An `Environment` is one paged file plus the in-memory state the blob
//! layer needs: the page manager's free-run pool and the blob manager's
//! space hint. Both are rebuilt from page headers when a file is opened
//! and die with the environment.
//!
//! ## Open Scan
//!
//! On open, after the file header is validated, the environment walks the
//! page headers once:
//!
//! - `Blob` pages with `num_pages == 1` and free slab bytes feed the space
//!   hint; multi-page runs are skipped wholesale (their continuation pages
//!   are raw and must not be inspected).
//! - `Free` pages and never-initialized (zeroed) pages are collected into
//!   the free-run pool.
//!
//! ## Mutator Serialization
//!
//! Mutating calls take `&mut self`; the environment performs no internal
//! locking. Embedders that share an environment across threads wrap it in
//! their own lock, which is also what serializes the B-tree layer above
//! this one. Shared `&self` readers are safe because reads only borrow
//! mapped pages.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use bumpalo::Bump;
use eyre::{ensure, Result, WrapErr};
use tracing::debug;

use crate::blob::{BlobPageHeader, DiskBlobManager};
use crate::config::EnvConfig;
use crate::storage::{
    EnvFileHeader, MmapStorage, PageHeader, PageManager, PageType, FILE_HEADER_SIZE,
    PAGE_HEADER_SIZE,
};

pub struct Environment {
    path: PathBuf,
    pager: PageManager,
    blobs: DiskBlobManager,
}

impl Environment {
    /// Creates a new environment file. Page 0 is reserved for the file
    /// header; blob pages start at page 1.
    pub fn create<P: AsRef<Path>>(path: P, config: EnvConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        let storage = MmapStorage::create(&path, config.page_size, 1)?;
        let mut pager = PageManager::new(storage);

        let header = EnvFileHeader::new(config.page_size as u32);
        header.write_to(pager.page_mut(0)?)?;
        pager.sync()?;

        debug!(path = %path.display(), page_size = config.page_size, "created environment");
        Ok(Self {
            path,
            blobs: DiskBlobManager::new(config.page_size),
            pager,
        })
    }

    /// Opens an existing environment, validating the file header and
    /// rebuilding the free-run pool and the space hint from page headers.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut header_bytes = [0u8; FILE_HEADER_SIZE];
        File::open(&path)
            .and_then(|mut f| f.read_exact(&mut header_bytes))
            .wrap_err_with(|| {
                format!("failed to read environment header from '{}'", path.display())
            })?;
        let page_size = EnvFileHeader::from_bytes(&header_bytes)?.page_size() as usize;

        let storage = MmapStorage::open(&path, page_size)?;
        let pager = PageManager::new(storage);
        let blobs = DiskBlobManager::new(page_size);

        let mut env = Self { path, pager, blobs };
        env.rebuild_state()?;

        debug!(path = %env.path.display(), page_size, pages = env.pager.page_count(), "opened environment");
        Ok(env)
    }

    fn rebuild_state(&mut self) -> Result<()> {
        let page_count = self.pager.page_count();
        let mut page_no = 1;
        while page_no < page_count {
            let page = self.pager.page(page_no)?;
            let header = PageHeader::from_bytes(page)?;
            match header.page_type() {
                PageType::Blob => {
                    let blob_header = BlobPageHeader::from_payload(&page[PAGE_HEADER_SIZE..])?;
                    let num_pages = blob_header.num_pages().max(1);
                    if num_pages == 1 && blob_header.free_bytes() > 0 {
                        let free_bytes = blob_header.free_bytes();
                        self.blobs.register_blob_page(page_no, free_bytes);
                    }
                    page_no += num_pages;
                }
                // zeroed headers come from grows whose operation never
                // completed; reclaim them alongside explicit free pages
                PageType::Free | PageType::Unknown => {
                    self.pager.register_free_run(page_no, 1)?;
                    page_no += 1;
                }
            }
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.pager.page_size()
    }

    pub fn page_count(&self) -> u32 {
        self.pager.page_count()
    }

    pub fn free_page_count(&self) -> u32 {
        self.pager.free_page_count()
    }

    pub fn file_size(&self) -> u64 {
        self.pager.file_size()
    }

    /// Stores `payload` as a blob and returns its id.
    pub fn allocate_blob(&mut self, payload: &[u8], flags: u32) -> Result<u64> {
        self.blobs.allocate(&mut self.pager, payload, flags)
    }

    /// Reads a blob's payload, backed by `arena` (or by the mapped page
    /// when `DIRECT_ACCESS` applies).
    pub fn read_blob<'a>(&'a self, arena: &'a Bump, blob_id: u64, flags: u32) -> Result<&'a [u8]> {
        self.blobs.read(&self.pager, arena, blob_id, flags)
    }

    /// Returns a blob's payload length.
    pub fn blob_size(&self, blob_id: u64) -> Result<u64> {
        self.blobs.blob_size(&self.pager, blob_id)
    }

    /// Overwrites a blob; the returned id equals `blob_id` when the new
    /// payload fit the existing slab.
    pub fn overwrite_blob(&mut self, blob_id: u64, payload: &[u8], flags: u32) -> Result<u64> {
        self.blobs.overwrite(&mut self.pager, blob_id, payload, flags)
    }

    /// Erases a blob and reclaims its space.
    pub fn erase_blob(&mut self, blob_id: u64, flags: u32) -> Result<()> {
        self.blobs.erase(&mut self.pager, blob_id, flags)
    }

    /// Inspects a blob page's header: `(num_pages, free_bytes)`.
    pub fn blob_page_stats(&self, page_no: u32) -> Result<(u32, u32)> {
        let page = self.pager.page(page_no)?;
        let header = PageHeader::from_bytes(page)?;
        ensure!(
            header.page_type() == PageType::Blob,
            "page {} is not a blob page",
            page_no
        );
        let blob_header = BlobPageHeader::from_payload(&page[PAGE_HEADER_SIZE..])?;
        Ok((blob_header.num_pages(), blob_header.free_bytes()))
    }

    /// Walks every blob page and verifies its freelist invariants.
    pub fn verify_integrity(&self) -> Result<()> {
        let page_count = self.pager.page_count();
        let mut page_no = 1;
        while page_no < page_count {
            let page = self.pager.page(page_no)?;
            let header = PageHeader::from_bytes(page)?;
            match header.page_type() {
                PageType::Blob => {
                    let blob_header = BlobPageHeader::from_payload(&page[PAGE_HEADER_SIZE..])?;
                    let num_pages = blob_header.num_pages().max(1);
                    self.blobs.check_page_integrity(&self.pager, page_no)?;
                    page_no += num_pages;
                }
                PageType::Free | PageType::Unknown => page_no += 1,
            }
        }
        Ok(())
    }

    /// Flushes all dirty pages to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.pager.sync()
    }

    /// Syncs and tears the environment down.
    pub fn close(mut self) -> Result<()> {
        self.sync()?;
        self.blobs.reset();
        debug!(path = %self.path.display(), "closed environment");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_env(page_size: usize) -> (tempfile::TempDir, Environment) {
        let dir = tempfile::tempdir().unwrap();
        let env = Environment::create(dir.path().join("env.bdb"), EnvConfig::new(page_size)).unwrap();
        (dir, env)
    }

    #[test]
    fn create_writes_valid_header() {
        let (dir, env) = scratch_env(4096);
        let path = env.path().to_path_buf();
        env.close().unwrap();

        let env = Environment::open(&path).unwrap();
        assert_eq!(env.page_size(), 4096);
        drop(dir);
    }

    #[test]
    fn open_rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.bin");
        std::fs::write(&path, vec![0xABu8; 8192]).unwrap();

        assert!(Environment::open(&path).is_err());
    }

    #[test]
    fn reopen_restores_space_hint() {
        let (dir, mut env) = scratch_env(4096);
        let path = env.path().to_path_buf();
        let first = env.allocate_blob(&[1u8; 100], 0).unwrap();
        env.close().unwrap();

        let mut env = Environment::open(&path).unwrap();
        let second = env.allocate_blob(&[2u8; 100], 0).unwrap();

        // the rebuilt hint must steer the new blob into the same page
        assert_eq!(first / 4096, second / 4096);
        drop(dir);
    }

    #[test]
    fn reopen_restores_free_pool() {
        let (dir, mut env) = scratch_env(4096);
        let path = env.path().to_path_buf();
        let id = env.allocate_blob(&vec![3u8; 9000], 0).unwrap();
        env.erase_blob(id, 0).unwrap();
        let pages_before = env.page_count();
        env.close().unwrap();

        let mut env = Environment::open(&path).unwrap();
        env.allocate_blob(&vec![4u8; 9000], 0).unwrap();

        // the freed run is found again, so the file must not grow
        assert_eq!(env.page_count(), pages_before);
        drop(dir);
    }
}
