//! # Disk Blob Manager
//!
//! Places, reads, overwrites, and erases blobs in a paged environment
//! file. The manager owns no pages itself; it borrows them from the page
//! manager one operation at a time.
//!
//! ## Placement
//!
//! A blob's on-disk footprint is its 32-byte header plus the payload,
//! rounded up to 8 bytes. Footprints that fit one page's slab area go
//! through the in-page freelist, preferring partially filled pages from
//! the space hint; everything else gets a dedicated contiguous page run
//! sized `ceil((footprint + page overhead) / page_size)`, where the
//! overhead is the persistent page header plus the blob page header of the
//! run's first page.
//!
//! ## Space Hint
//!
//! A bounded map of blob page -> free bytes, maintained on every
//! allocate/erase and rebuilt by the environment's open scan. It is a
//! hint, not a promise: the live page header is re-checked before any
//! placement, so a stale entry costs one probe and nothing else.
//!
//! ## Failure Ordering
//!
//! Within one operation every fallible step (page fetch, file grow) runs
//! before the first durable mutation, and the freelist commit runs last.
//! An operation that fails leaves no new blob id behind and every page
//! header consistent.

use bumpalo::Bump;
use eyre::{ensure, Result};
use hashbrown::HashMap;
use tracing::trace;
use zerocopy::IntoBytes;

use super::freelist;
use super::header::{BlobHeader, BlobPageHeader, BLOB_HEADER_SIZE, BLOB_PAGE_HEADER_SIZE};
use super::{align_up, DIRECT_ACCESS};
use crate::storage::{PageHeader, PageManager, PageType, PAGE_HEADER_SIZE};

/// Upper bound on tracked pages; about one hint entry per 8 MiB of blob
/// data at the default page size.
const SPACE_HINT_CAPACITY: usize = 512;

/// Bounded map of blob pages with reusable slab space.
#[derive(Debug, Default)]
struct SpaceHint {
    pages: HashMap<u32, u32>,
}

impl SpaceHint {
    fn update(&mut self, page_no: u32, free_bytes: u32) {
        if free_bytes == 0 {
            self.pages.remove(&page_no);
            return;
        }
        if self.pages.len() >= SPACE_HINT_CAPACITY && !self.pages.contains_key(&page_no) {
            // keep the most useful entries: evict the smallest only when
            // the newcomer beats it
            let victim = self
                .pages
                .iter()
                .min_by_key(|(_, &free)| free)
                .map(|(&p, &free)| (p, free));
            match victim {
                Some((victim_page, victim_free)) if victim_free < free_bytes => {
                    self.pages.remove(&victim_page);
                }
                _ => return,
            }
        }
        self.pages.insert(page_no, free_bytes);
    }

    fn remove(&mut self, page_no: u32) {
        self.pages.remove(&page_no);
    }

    /// Pages that claim at least `min_free` bytes, lowest page number
    /// first so placement is deterministic.
    fn candidates(&self, min_free: u32) -> Vec<u32> {
        let mut pages: Vec<u32> = self
            .pages
            .iter()
            .filter(|(_, &free)| free >= min_free)
            .map(|(&p, _)| p)
            .collect();
        pages.sort_unstable();
        pages
    }

    fn clear(&mut self) {
        self.pages.clear();
    }
}

#[derive(Debug)]
pub struct DiskBlobManager {
    page_size: usize,
    space_hint: SpaceHint,
}

impl DiskBlobManager {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            space_hint: SpaceHint::default(),
        }
    }

    /// Payload bytes per structured page.
    #[inline]
    fn payload_size(&self) -> usize {
        self.page_size - PAGE_HEADER_SIZE
    }

    /// Slab bytes per blob page (payload minus the blob page header).
    #[inline]
    pub fn slab_capacity(&self) -> usize {
        self.payload_size() - BLOB_PAGE_HEADER_SIZE
    }

    /// Registers a partially filled blob page, used by the environment's
    /// open scan to rebuild the hint.
    pub fn register_blob_page(&mut self, page_no: u32, free_bytes: u32) {
        self.space_hint.update(page_no, free_bytes);
    }

    /// Drops all hint state, used when the environment closes.
    pub fn reset(&mut self) {
        self.space_hint.clear();
    }

    /// Allocates a blob holding `payload` and returns its id: the absolute
    /// file offset of the blob header.
    pub fn allocate(&mut self, pager: &mut PageManager, payload: &[u8], flags: u32) -> Result<u64> {
        ensure!(!payload.is_empty(), "invalid argument: zero-length blob");

        let total = align_up(BLOB_HEADER_SIZE as u64 + payload.len() as u64);

        if total <= self.slab_capacity() as u64 {
            self.allocate_small(pager, payload, flags, total as u32)
        } else {
            self.allocate_large(pager, payload, flags, total)
        }
    }

    fn allocate_small(
        &mut self,
        pager: &mut PageManager,
        payload: &[u8],
        flags: u32,
        total: u32,
    ) -> Result<u64> {
        for page_no in self.space_hint.candidates(total) {
            let probe = {
                let page = pager.page(page_no)?;
                let page_header = PageHeader::from_bytes(page)?;
                if page_header.page_type() != PageType::Blob {
                    None
                } else {
                    let header = BlobPageHeader::from_payload(&page[PAGE_HEADER_SIZE..])?;
                    if header.num_pages() != 1 {
                        None
                    } else {
                        freelist::find_first_fit(header, total)
                    }
                }
            };
            match probe {
                Some(payload_off) => {
                    trace!(page_no, total, "placing blob in hinted page");
                    return self.place_small(pager, page_no, payload_off, payload, flags, total);
                }
                None => self.space_hint.remove(page_no),
            }
        }

        let page_no = pager.allocate_pages(1)?;
        {
            let page = pager.page_mut(page_no)?;
            PageHeader::new(PageType::Blob).write_to(page)?;
            let header = BlobPageHeader::from_payload_mut(&mut page[PAGE_HEADER_SIZE..])?;
            header.initialize();
            header.set_num_pages(1);
            freelist::add_to_freelist(
                header,
                BLOB_PAGE_HEADER_SIZE as u32,
                (self.payload_size() - BLOB_PAGE_HEADER_SIZE) as u32,
            );
        }
        trace!(page_no, total, "placing blob in fresh page");
        self.place_small(pager, page_no, BLOB_PAGE_HEADER_SIZE as u32, payload, flags, total)
    }

    /// Writes the blob at a probed slab offset, then commits the freelist
    /// carve as the final step.
    fn place_small(
        &mut self,
        pager: &mut PageManager,
        page_no: u32,
        payload_off: u32,
        payload: &[u8],
        flags: u32,
        total: u32,
    ) -> Result<u64> {
        let addr =
            page_no as u64 * self.page_size as u64 + PAGE_HEADER_SIZE as u64 + payload_off as u64;
        let header = BlobHeader::new(
            addr,
            total as u64 - BLOB_HEADER_SIZE as u64,
            payload.len() as u64,
            flags,
        );
        self.write_chunks(pager, addr, &[header.as_bytes(), payload])?;

        let free_bytes = {
            let page = pager.page_mut(page_no)?;
            let page_header = BlobPageHeader::from_payload_mut(&mut page[PAGE_HEADER_SIZE..])?;
            let carved = freelist::alloc_from_freelist(page_header, total);
            debug_assert_eq!(carved, Some(payload_off));
            page_header.free_bytes()
        };
        self.space_hint.update(page_no, free_bytes);
        Ok(addr)
    }

    fn allocate_large(
        &mut self,
        pager: &mut PageManager,
        payload: &[u8],
        flags: u32,
        total: u64,
    ) -> Result<u64> {
        let overhead = (PAGE_HEADER_SIZE + BLOB_PAGE_HEADER_SIZE) as u64;
        let num_pages = (total + overhead).div_ceil(self.page_size as u64);
        ensure!(
            num_pages <= u32::MAX as u64,
            "blob of {} bytes exceeds the addressable file size",
            payload.len()
        );

        let start = pager.allocate_pages(num_pages as u32)?;
        {
            let page = pager.page_mut(start)?;
            PageHeader::new(PageType::Blob).write_to(page)?;
            let header = BlobPageHeader::from_payload_mut(&mut page[PAGE_HEADER_SIZE..])?;
            header.initialize();
            header.set_num_pages(num_pages as u32);
        }

        let addr = start as u64 * self.page_size as u64 + overhead;
        let header = BlobHeader::new(
            addr,
            total - BLOB_HEADER_SIZE as u64,
            payload.len() as u64,
            flags,
        );
        trace!(start, num_pages, total, "placing multi-page blob");
        self.write_chunks(pager, addr, &[header.as_bytes(), payload])?;
        Ok(addr)
    }

    /// Reads the blob's payload. The bytes are copied into `arena` unless
    /// `DIRECT_ACCESS` is set and the blob lies within a single mapped
    /// page, in which case a borrowed view is returned.
    pub fn read<'a>(
        &self,
        pager: &'a PageManager,
        arena: &'a Bump,
        blob_id: u64,
        flags: u32,
    ) -> Result<&'a [u8]> {
        let header = self.load_blob_header(pager, blob_id)?;
        let size = header.blob_size() as usize;
        let payload_addr = blob_id + BLOB_HEADER_SIZE as u64;
        let start = (payload_addr % self.page_size as u64) as usize;

        if flags & DIRECT_ACCESS != 0 && start + size <= self.page_size {
            let page_no = (payload_addr / self.page_size as u64) as u32;
            let page = pager.page(page_no)?;
            return Ok(&page[start..start + size]);
        }

        let first_page = (payload_addr / self.page_size as u64) as u32;
        let last_page = ((payload_addr + size as u64 - 1) / self.page_size as u64) as u32;
        if last_page > first_page {
            pager.prefetch_pages(first_page, last_page - first_page + 1);
        }

        let dest = arena.alloc_slice_fill_copy(size, 0u8);
        self.read_chunks(pager, payload_addr, dest)?;
        Ok(dest)
    }

    /// Returns the payload length without touching the payload itself.
    pub fn blob_size(&self, pager: &PageManager, blob_id: u64) -> Result<u64> {
        Ok(self.load_blob_header(pager, blob_id)?.blob_size())
    }

    /// Overwrites a blob. Rewrites in place and returns `blob_id` when the
    /// new payload fits the existing slab; otherwise erases and
    /// reallocates, returning the new id.
    pub fn overwrite(
        &mut self,
        pager: &mut PageManager,
        blob_id: u64,
        payload: &[u8],
        flags: u32,
    ) -> Result<u64> {
        ensure!(!payload.is_empty(), "invalid argument: zero-length blob");

        let old = self.load_blob_header(pager, blob_id)?;
        let new_total = align_up(BLOB_HEADER_SIZE as u64 + payload.len() as u64);

        if new_total <= BLOB_HEADER_SIZE as u64 + old.allocated_size() {
            let header =
                BlobHeader::new(blob_id, old.allocated_size(), payload.len() as u64, flags);
            self.write_chunks(
                pager,
                blob_id,
                &[header.as_bytes(), payload],
            )?;
            trace!(blob_id, new_size = payload.len(), "overwrote blob in place");
            return Ok(blob_id);
        }

        self.erase(pager, blob_id, flags)?;
        self.allocate(pager, payload, flags)
    }

    /// Erases a blob, returning its slab to the page's freelist or, for a
    /// multi-page blob, the whole run to the page pool. A single-page blob
    /// page that becomes wholly empty is returned to the pool as well.
    pub fn erase(&mut self, pager: &mut PageManager, blob_id: u64, _flags: u32) -> Result<()> {
        let header = self.load_blob_header(pager, blob_id)?;
        let page_no = (blob_id / self.page_size as u64) as u32;

        let num_pages = {
            let page = pager.page(page_no)?;
            BlobPageHeader::from_payload(&page[PAGE_HEADER_SIZE..])?.num_pages()
        };

        if num_pages >= 2 {
            self.space_hint.remove(page_no);
            trace!(blob_id, page_no, num_pages, "erased multi-page blob");
            return pager.free_pages(page_no, num_pages);
        }

        let payload_off = (blob_id % self.page_size as u64) as u32 - PAGE_HEADER_SIZE as u32;
        let chunk = BLOB_HEADER_SIZE as u32 + header.allocated_size() as u32;
        let free_bytes = {
            let payload_size = self.payload_size() as u32;
            let page = pager.page_mut(page_no)?;
            // scrub the header so the dead id can no longer resolve
            let header_off = (blob_id % self.page_size as u64) as usize;
            page[header_off..header_off + BLOB_HEADER_SIZE].fill(0);
            let page_header = BlobPageHeader::from_payload_mut(&mut page[PAGE_HEADER_SIZE..])?;
            freelist::add_to_freelist(page_header, payload_off, chunk);
            debug_assert!(freelist::check_integrity(page_header, payload_size).is_ok());
            page_header.free_bytes()
        };

        if free_bytes as usize == self.slab_capacity() {
            self.space_hint.remove(page_no);
            trace!(blob_id, page_no, "blob page empty, returning to pool");
            pager.free_pages(page_no, 1)
        } else {
            self.space_hint.update(page_no, free_bytes);
            trace!(blob_id, page_no, free_bytes, "erased blob");
            Ok(())
        }
    }

    /// Verifies the freelist invariants of one blob page.
    pub fn check_page_integrity(&self, pager: &PageManager, page_no: u32) -> Result<()> {
        let page = pager.page(page_no)?;
        let page_header = PageHeader::from_bytes(page)?;
        ensure!(
            page_header.page_type() == PageType::Blob,
            "page {} is not a blob page",
            page_no
        );
        let header = BlobPageHeader::from_payload(&page[PAGE_HEADER_SIZE..])?;
        freelist::check_integrity(header, self.payload_size() as u32)
    }

    /// Loads and validates the blob header addressed by `blob_id`.
    fn load_blob_header(&self, pager: &PageManager, blob_id: u64) -> Result<BlobHeader> {
        let page_size = self.page_size as u64;
        ensure!(
            blob_id >= page_size && blob_id % super::BLOB_ALIGNMENT == 0,
            "blob {:#x} not found: not a valid blob address",
            blob_id
        );

        let page_no = (blob_id / page_size) as u32;
        let offset = (blob_id % page_size) as usize;
        ensure!(
            offset >= PAGE_HEADER_SIZE + BLOB_PAGE_HEADER_SIZE
                && offset + BLOB_HEADER_SIZE <= self.page_size,
            "blob {:#x} not found: address outside any slab area",
            blob_id
        );

        let page = pager.page(page_no)?;
        let page_header = PageHeader::from_bytes(page)?;
        ensure!(
            page_header.page_type() == PageType::Blob,
            "blob {:#x} not found: page {} is not a blob page",
            blob_id,
            page_no
        );

        let header = BlobHeader::from_bytes(&page[offset..offset + BLOB_HEADER_SIZE])?;
        ensure!(
            header.blob_id() == blob_id,
            "blob {:#x} not found: header records id {:#x}",
            blob_id,
            header.blob_id()
        );
        ensure!(
            header.blob_size() <= header.allocated_size(),
            "corrupt blob {:#x}: size {} exceeds allocation {}",
            blob_id,
            header.blob_size(),
            header.allocated_size()
        );
        Ok(*header)
    }

    /// Writes `chunks` as one contiguous strip starting at file offset
    /// `addr`, crossing page boundaries as needed. Continuation pages of a
    /// multi-page run are written edge to edge.
    fn write_chunks(&self, pager: &mut PageManager, addr: u64, chunks: &[&[u8]]) -> Result<()> {
        let page_size = self.page_size as u64;
        let mut addr = addr;
        for chunk in chunks {
            let mut data = *chunk;
            while !data.is_empty() {
                let page_no = (addr / page_size) as u32;
                let offset = (addr % page_size) as usize;
                let len = data.len().min(self.page_size - offset);
                let page = pager.page_mut(page_no)?;
                page[offset..offset + len].copy_from_slice(&data[..len]);
                addr += len as u64;
                data = &data[len..];
            }
        }
        Ok(())
    }

    /// Counterpart of `write_chunks` for reads.
    fn read_chunks(&self, pager: &PageManager, addr: u64, dest: &mut [u8]) -> Result<()> {
        let page_size = self.page_size as u64;
        let mut addr = addr;
        let mut dest = dest;
        while !dest.is_empty() {
            let page_no = (addr / page_size) as u32;
            let offset = (addr % page_size) as usize;
            let len = dest.len().min(self.page_size - offset);
            let page = pager.page(page_no)?;
            dest[..len].copy_from_slice(&page[offset..offset + len]);
            addr += len as u64;
            dest = &mut dest[len..];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MmapStorage;

    fn scratch(page_size: usize) -> (PageManager, DiskBlobManager) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.keep().join("blobs.bdb");
        let pager = PageManager::new(MmapStorage::create(&path, page_size, 1).unwrap());
        (pager, DiskBlobManager::new(page_size))
    }

    #[test]
    fn small_blob_roundtrip() {
        let (mut pager, mut blobs) = scratch(4096);
        let arena = Bump::new();

        let id = blobs.allocate(&mut pager, b"hello", 0).unwrap();
        let data = blobs.read(&pager, &arena, id, 0).unwrap();

        assert_eq!(data, b"hello");
        assert_eq!(blobs.blob_size(&pager, id).unwrap(), 5);
    }

    #[test]
    fn zero_length_blob_rejected() {
        let (mut pager, mut blobs) = scratch(4096);
        assert!(blobs.allocate(&mut pager, b"", 0).is_err());
    }

    #[test]
    fn two_blobs_share_a_page() {
        let (mut pager, mut blobs) = scratch(4096);

        let a = blobs.allocate(&mut pager, &[1u8; 100], 0).unwrap();
        let b = blobs.allocate(&mut pager, &[2u8; 100], 0).unwrap();

        assert_eq!(a / 4096, b / 4096);
        assert_eq!(pager.page_count(), 2);
    }

    #[test]
    fn stale_hint_entry_is_reprobed() {
        let (mut pager, mut blobs) = scratch(4096);

        let id = blobs.allocate(&mut pager, &[7u8; 16], 0).unwrap();
        let page_no = (id / 4096) as u32;
        // poison the hint with a claim the live header cannot honor
        blobs.space_hint.update(page_no, u32::MAX);

        // footprint 3816 <= slab capacity, but the live page only has
        // 3816 - 48 bytes left, so the probe must miss
        let big = vec![1u8; 3784];
        let id2 = blobs.allocate(&mut pager, &big, 0).unwrap();

        assert_ne!(id / 4096, id2 / 4096);
    }

    #[test]
    fn direct_access_returns_mapped_view() {
        let (mut pager, mut blobs) = scratch(4096);
        let arena = Bump::new();

        let id = blobs.allocate(&mut pager, b"direct", 0).unwrap();
        let data = blobs.read(&pager, &arena, id, DIRECT_ACCESS).unwrap();

        assert_eq!(data, b"direct");
        // the view must not come from the arena
        assert_eq!(arena.allocated_bytes(), 0);
    }

    #[test]
    fn unknown_blob_id_is_rejected() {
        let (mut pager, mut blobs) = scratch(4096);
        let arena = Bump::new();
        blobs.allocate(&mut pager, b"x", 0).unwrap();

        let err = blobs.read(&pager, &arena, 0x1000, 0).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn misaligned_blob_id_is_rejected() {
        let (mut pager, mut blobs) = scratch(4096);
        let arena = Bump::new();
        let id = blobs.allocate(&mut pager, b"x", 0).unwrap();

        assert!(blobs.read(&pager, &arena, id + 3, 0).is_err());
    }
}
