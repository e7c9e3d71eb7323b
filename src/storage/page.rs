//! # Page Types and Header Layout
//!
//! Every structured page begins with a 16-byte persistent header. The
//! header records what kind of page this is and leaves room for the
//! type-specific metadata that follows it in the payload region.
//!
//! ## Page Header Layout (16 bytes)
//!
//! ```text
//! Offset  Size  Field        Description
//! ------  ----  -----------  ----------------------------------------
//! 0       1     page_type    Type of page (Blob, Free, ...)
//! 1       1     flags        Page flags (reserved)
//! 2       2     reserved0    Reserved for future use
//! 4       4     reserved1    Reserved for future use
//! 8       8     lsn          Log sequence number slot (unused here)
//! ```
//!
//! ## Page Types
//!
//! - **Blob** (0x20): the payload begins with a `BlobPageHeader` and holds
//!   one or more blobs
//! - **Free** (0x30): the page is in the free-page pool
//!
//! A zeroed header (type 0x00) marks a page that was allocated by a file
//! grow but never initialized; the environment treats it as free when it
//! rebuilds its in-memory state on open.
//!
//! Continuation pages of a multi-page blob run carry **no** header at all;
//! their full extent is raw blob payload. They are never inspected
//! directly - the run's first page knows how many pages it governs.
//!
//! ## Zero-Copy Access
//!
//! `PageHeader` uses `zerocopy` for safe transmutation from raw bytes, so
//! headers are read directly from mmap'd pages without copying.

use eyre::{ensure, Result};
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::PAGE_HEADER_SIZE;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Unknown = 0x00,
    Blob = 0x20,
    Free = 0x30,
}

impl PageType {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x20 => PageType::Blob,
            0x30 => PageType::Free,
            _ => PageType::Unknown,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct PageHeader {
    page_type: u8,
    flags: u8,
    reserved0: [u8; 2],
    reserved1: U32,
    lsn: U64,
}

const _: () = assert!(std::mem::size_of::<PageHeader>() == PAGE_HEADER_SIZE);

impl PageHeader {
    pub fn new(page_type: PageType) -> Self {
        Self {
            page_type: page_type as u8,
            flags: 0,
            reserved0: [0; 2],
            reserved1: U32::new(0),
            lsn: U64::new(0),
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        ensure!(
            data.len() >= size_of::<Self>(),
            "buffer too small for PageHeader: {} < {}",
            data.len(),
            size_of::<Self>()
        );

        Self::ref_from_bytes(&data[..size_of::<Self>()])
            .map_err(|e| eyre::eyre!("failed to read PageHeader: {:?}", e))
    }

    pub fn write_to(&self, data: &mut [u8]) -> Result<()> {
        ensure!(
            data.len() >= size_of::<Self>(),
            "buffer too small for PageHeader: {} < {}",
            data.len(),
            size_of::<Self>()
        );

        data[..size_of::<Self>()].copy_from_slice(self.as_bytes());
        Ok(())
    }

    pub fn page_type(&self) -> PageType {
        PageType::from_byte(self.page_type)
    }

    pub fn set_page_type(&mut self, page_type: PageType) {
        self.page_type = page_type as u8;
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn set_flags(&mut self, flags: u8) {
        self.flags = flags;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_header_size_is_16_bytes() {
        assert_eq!(size_of::<PageHeader>(), 16);
    }

    #[test]
    fn page_type_from_byte() {
        assert_eq!(PageType::from_byte(0x00), PageType::Unknown);
        assert_eq!(PageType::from_byte(0x20), PageType::Blob);
        assert_eq!(PageType::from_byte(0x30), PageType::Free);
        assert_eq!(PageType::from_byte(0xFF), PageType::Unknown);
    }

    #[test]
    fn header_roundtrip_through_bytes() {
        let header = PageHeader::new(PageType::Blob);
        let mut data = [0xFFu8; 32];

        header.write_to(&mut data).unwrap();

        let parsed = PageHeader::from_bytes(&data).unwrap();
        assert_eq!(parsed.page_type(), PageType::Blob);
        assert_eq!(parsed.flags(), 0);
    }

    #[test]
    fn from_bytes_too_small() {
        let data = [0u8; 8];
        assert!(PageHeader::from_bytes(&data).is_err());
    }
}
