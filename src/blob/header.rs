//! # Blob Header Codecs
//!
//! Packed on-disk layouts for the blob layer, all little-endian.
//!
//! ## BlobPageHeader (264 bytes, at payload offset 0 of a blob page)
//!
//! ```text
//! offset 0    u32 num_pages        pages governed by this header; 1 for a
//!                                  single-page blob page, >= 2 for the
//!                                  first page of a multi-page run
//! offset 4    u32 free_bytes       unallocated bytes in this page's slab
//! offset 8    FreelistEntry[32]    (u32 offset, u32 size) pairs;
//!                                  size == 0 marks an empty slot
//! ```
//!
//! Freelist offsets are relative to the start of the payload region, so
//! live entries are always >= 264.
//!
//! ## BlobHeader (32 bytes, immediately preceding every payload)
//!
//! ```text
//! offset 0    u64 blob_id          this header's own file offset
//! offset 8    u64 allocated_size   physical slab size minus the header
//! offset 16   u64 blob_size        current payload length
//! offset 24   u32 flags
//! offset 28   u32 reserved
//! ```
//!
//! `blob_id` doubles as the validity check: a lookup whose id does not
//! match the stored field is rejected as not-found. `allocated_size >=
//! blob_size` always; the slack is what makes in-place overwrite legal.

use eyre::Result;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::storage::{parse_zerocopy, parse_zerocopy_mut};

pub const FREELIST_ENTRY_COUNT: usize = 32;
pub const BLOB_PAGE_HEADER_SIZE: usize = 264;
pub const BLOB_HEADER_SIZE: usize = 32;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct FreelistEntry {
    offset: U32,
    size: U32,
}

impl FreelistEntry {
    zerocopy_accessors! {
        offset: u32,
        size: u32,
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size.get() == 0
    }

    pub fn clear(&mut self) {
        self.offset = U32::new(0);
        self.size = U32::new(0);
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct BlobPageHeader {
    num_pages: U32,
    free_bytes: U32,
    freelist: [FreelistEntry; FREELIST_ENTRY_COUNT],
}

const _: () = assert!(std::mem::size_of::<BlobPageHeader>() == BLOB_PAGE_HEADER_SIZE);

impl BlobPageHeader {
    /// Resets the header to the all-zero state. A page recycled from the
    /// free pool still carries stale bytes, so this runs before any field
    /// is set.
    pub fn initialize(&mut self) {
        self.as_mut_bytes().fill(0);
    }

    zerocopy_accessors! {
        num_pages: u32,
        free_bytes: u32,
    }

    /// Parses the header at the start of a page's payload region.
    pub fn from_payload(payload: &[u8]) -> Result<&Self> {
        parse_zerocopy(payload, "BlobPageHeader")
    }

    pub fn from_payload_mut(payload: &mut [u8]) -> Result<&mut Self> {
        parse_zerocopy_mut(payload, "BlobPageHeader")
    }

    #[inline]
    pub fn entry(&self, i: usize) -> &FreelistEntry {
        &self.freelist[i]
    }

    #[inline]
    pub fn entry_mut(&mut self, i: usize) -> &mut FreelistEntry {
        &mut self.freelist[i]
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct BlobHeader {
    blob_id: U64,
    allocated_size: U64,
    blob_size: U64,
    flags: U32,
    reserved: U32,
}

const _: () = assert!(std::mem::size_of::<BlobHeader>() == BLOB_HEADER_SIZE);

impl BlobHeader {
    pub fn new(blob_id: u64, allocated_size: u64, blob_size: u64, flags: u32) -> Self {
        Self {
            blob_id: U64::new(blob_id),
            allocated_size: U64::new(allocated_size),
            blob_size: U64::new(blob_size),
            flags: U32::new(flags),
            reserved: U32::new(0),
        }
    }

    zerocopy_accessors! {
        blob_id: u64,
        allocated_size: u64,
        blob_size: u64,
        flags: u32,
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        parse_zerocopy(bytes, "BlobHeader")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_page_header_size_is_264_bytes() {
        assert_eq!(size_of::<BlobPageHeader>(), 264);
    }

    #[test]
    fn blob_header_size_is_32_bytes() {
        assert_eq!(size_of::<BlobHeader>(), 32);
    }

    #[test]
    fn initialize_clears_stale_bytes() {
        let mut buf = [0xFFu8; BLOB_PAGE_HEADER_SIZE];
        let header = BlobPageHeader::from_payload_mut(&mut buf).unwrap();

        header.initialize();

        assert_eq!(header.num_pages(), 0);
        assert_eq!(header.free_bytes(), 0);
        assert!((0..FREELIST_ENTRY_COUNT).all(|i| header.entry(i).is_empty()));
    }

    #[test]
    fn freelist_entry_layout_is_little_endian() {
        let mut buf = [0u8; BLOB_PAGE_HEADER_SIZE];
        let header = BlobPageHeader::from_payload_mut(&mut buf).unwrap();
        header.entry_mut(0).set_offset(0x11223344);
        header.entry_mut(0).set_size(0x55667788);

        assert_eq!(&buf[8..12], &0x11223344u32.to_le_bytes());
        assert_eq!(&buf[12..16], &0x55667788u32.to_le_bytes());
    }

    #[test]
    fn blob_header_roundtrip() {
        let header = BlobHeader::new(0x4000, 48, 37, 0x2);
        let bytes = header.as_bytes();

        let parsed = BlobHeader::from_bytes(bytes).unwrap();
        assert_eq!(parsed.blob_id(), 0x4000);
        assert_eq!(parsed.allocated_size(), 48);
        assert_eq!(parsed.blob_size(), 37);
        assert_eq!(parsed.flags(), 0x2);
    }
}
