//! # In-Page Freelist
//!
//! Allocation, free, and coalescing over the fixed 32-entry freelist in a
//! blob page header. The bounded array keeps the header packed and every
//! operation O(32).
//!
//! ## Selection Policy
//!
//! `alloc_from_freelist` is first-fit: the first non-empty entry at least
//! as large as the request wins. An exact hit empties the slot; a larger
//! hit is shrunk in place by advancing its offset.
//!
//! ## Overflow Policy
//!
//! `add_to_freelist` first tries to coalesce with an adjacent entry, then
//! to occupy an empty slot. With all 32 slots taken, the smallest entry
//! strictly smaller than the incoming chunk is dropped and its bytes leak
//! inside the page; if no entry qualifies, the incoming chunk itself
//! leaks. `free_bytes` grows unconditionally either way, so leaked bytes
//! stay counted and become recoverable when the page empties out and
//! returns to the page pool.

use eyre::{ensure, Result};
use smallvec::SmallVec;

use super::header::{BlobPageHeader, BLOB_PAGE_HEADER_SIZE, FREELIST_ENTRY_COUNT};

/// Read-only first-fit probe. Returns the offset the next
/// `alloc_from_freelist` call with the same size would hand out.
pub fn find_first_fit(header: &BlobPageHeader, size: u32) -> Option<u32> {
    (0..FREELIST_ENTRY_COUNT)
        .map(|i| header.entry(i))
        .find(|e| !e.is_empty() && e.size() >= size)
        .map(|e| e.offset())
}

/// First-fit allocation of `size` bytes out of the freelist. Returns the
/// payload-relative offset of the carved chunk, or `None` when nothing
/// fits.
pub fn alloc_from_freelist(header: &mut BlobPageHeader, size: u32) -> Option<u32> {
    for i in 0..FREELIST_ENTRY_COUNT {
        let (entry_offset, entry_size) = {
            let e = header.entry(i);
            (e.offset(), e.size())
        };
        if entry_size == 0 || entry_size < size {
            continue;
        }

        if entry_size == size {
            header.entry_mut(i).clear();
        } else {
            let e = header.entry_mut(i);
            e.set_offset(entry_offset + size);
            e.set_size(entry_size - size);
        }

        let free = header.free_bytes();
        header.set_free_bytes(free - size);
        return Some(entry_offset);
    }
    None
}

/// Returns a chunk to the freelist, coalescing with an adjacent entry when
/// possible.
pub fn add_to_freelist(header: &mut BlobPageHeader, offset: u32, size: u32) {
    let free = header.free_bytes();
    header.set_free_bytes(free + size);

    for i in 0..FREELIST_ENTRY_COUNT {
        let (entry_offset, entry_size) = {
            let e = header.entry(i);
            (e.offset(), e.size())
        };
        if entry_size == 0 {
            continue;
        }
        if entry_offset + entry_size == offset {
            header.entry_mut(i).set_size(entry_size + size);
            return;
        }
        if offset + size == entry_offset {
            let e = header.entry_mut(i);
            e.set_offset(offset);
            e.set_size(entry_size + size);
            return;
        }
    }

    for i in 0..FREELIST_ENTRY_COUNT {
        if header.entry(i).is_empty() {
            let e = header.entry_mut(i);
            e.set_offset(offset);
            e.set_size(size);
            return;
        }
    }

    // All slots taken: evict the smallest entry strictly smaller than the
    // incoming chunk. Its bytes (or, if none qualifies, the incoming
    // chunk's bytes) leak within the page.
    let mut victim: Option<(usize, u32)> = None;
    for i in 0..FREELIST_ENTRY_COUNT {
        let entry_size = header.entry(i).size();
        if entry_size < size && victim.is_none_or(|(_, best)| entry_size < best) {
            victim = Some((i, entry_size));
        }
    }
    if let Some((i, _)) = victim {
        let e = header.entry_mut(i);
        e.set_offset(offset);
        e.set_size(size);
    }
}

/// Verifies the freelist invariants for one page: entries inside the slab
/// area, no overlap, and `free_bytes` covering at least the slot total
/// (leaked bytes keep `free_bytes` above the slot sum).
pub fn check_integrity(header: &BlobPageHeader, payload_size: u32) -> Result<()> {
    let slab_capacity = payload_size - BLOB_PAGE_HEADER_SIZE as u32;

    if header.num_pages() >= 2 {
        ensure!(
            header.free_bytes() == 0,
            "multi-page blob header has free_bytes {}",
            header.free_bytes()
        );
        for i in 0..FREELIST_ENTRY_COUNT {
            ensure!(
                header.entry(i).is_empty(),
                "multi-page blob header has freelist entry {}",
                i
            );
        }
        return Ok(());
    }

    let mut entries: SmallVec<[(u32, u32); FREELIST_ENTRY_COUNT]> = (0..FREELIST_ENTRY_COUNT)
        .map(|i| header.entry(i))
        .filter(|e| !e.is_empty())
        .map(|e| (e.offset(), e.size()))
        .collect();
    entries.sort_unstable();

    let mut total: u64 = 0;
    let mut prev_end: u32 = BLOB_PAGE_HEADER_SIZE as u32;
    for &(offset, size) in &entries {
        ensure!(
            offset >= BLOB_PAGE_HEADER_SIZE as u32,
            "freelist entry at {} reaches into the page header",
            offset
        );
        ensure!(
            offset as u64 + size as u64 <= payload_size as u64,
            "freelist entry {}+{} exceeds payload size {}",
            offset,
            size,
            payload_size
        );
        ensure!(
            offset >= prev_end,
            "freelist entries overlap at offset {}",
            offset
        );
        prev_end = offset + size;
        total += size as u64;
    }

    ensure!(
        total <= header.free_bytes() as u64,
        "freelist total {} exceeds free_bytes {}",
        total,
        header.free_bytes()
    );
    ensure!(
        header.free_bytes() <= slab_capacity,
        "free_bytes {} exceeds slab capacity {}",
        header.free_bytes(),
        slab_capacity
    );

    Ok(())
}
