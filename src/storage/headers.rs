//! # Environment File Header
//!
//! The first 128 bytes of page 0 identify an environment file: magic bytes,
//! format version, the page size the file was created with, and a CRC-64
//! checksum that detects torn or corrupted headers.
//!
//! ## Header Layout
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  --------------------------------------
//! 0       16    magic
//! 16      4     version
//! 20      4     page_size
//! 24      4     freelist_head   (reserved, 0)
//! 28      4     flags
//! 32      8     checksum        (CRC-64/ECMA-182 over bytes 0..32 ++ 40..128
//!                                with this field zeroed)
//! 40      88    reserved
//! ```
//!
//! The header is read before the file is mapped (the page size must be known
//! to map pages), so it exposes a plain-bytes parse path in addition to the
//! zerocopy accessors.
//!
//! ## Endianness
//!
//! All multi-byte fields use little-endian encoding. The zerocopy
//! `U32<LittleEndian>`/`U64<LittleEndian>` types handle conversion, so the
//! on-disk format is stable across endiannesses.

use crc::{Crc, CRC_64_ECMA_182};
use eyre::{ensure, Result};
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::FILE_HEADER_SIZE;

pub const ENV_MAGIC: &[u8; 16] = b"burrowdb env\x00\x00\x00\x00";
pub const CURRENT_VERSION: u32 = 1;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct EnvFileHeader {
    magic: [u8; 16],
    version: U32,
    page_size: U32,
    freelist_head: U32,
    flags: U32,
    checksum: U64,
    reserved: [u8; 88],
}

const _: () = assert!(std::mem::size_of::<EnvFileHeader>() == FILE_HEADER_SIZE);

impl EnvFileHeader {
    pub fn new(page_size: u32) -> Self {
        let mut header = Self {
            magic: *ENV_MAGIC,
            version: U32::new(CURRENT_VERSION),
            page_size: U32::new(page_size),
            freelist_head: U32::new(0),
            flags: U32::new(0),
            checksum: U64::new(0),
            reserved: [0u8; 88],
        };
        header.checksum = U64::new(header.compute_checksum());
        header
    }

    zerocopy_accessors! {
        version: u32,
        page_size: u32,
        freelist_head: u32,
        flags: u32,
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= FILE_HEADER_SIZE,
            "buffer too small for EnvFileHeader: {} < {}",
            bytes.len(),
            FILE_HEADER_SIZE
        );

        let header = Self::ref_from_bytes(&bytes[..FILE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read EnvFileHeader: {:?}", e))?;
        header.validate()?;
        Ok(header)
    }

    pub fn write_to(&self, data: &mut [u8]) -> Result<()> {
        ensure!(
            data.len() >= FILE_HEADER_SIZE,
            "buffer too small for EnvFileHeader: {} < {}",
            data.len(),
            FILE_HEADER_SIZE
        );

        data[..FILE_HEADER_SIZE].copy_from_slice(self.as_bytes());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.magic == *ENV_MAGIC,
            "not an environment file: bad magic {:02x?}",
            &self.magic[..8]
        );
        ensure!(
            self.version() == CURRENT_VERSION,
            "unsupported environment version {} (expected {})",
            self.version(),
            CURRENT_VERSION
        );
        ensure!(
            self.checksum.get() == self.compute_checksum(),
            "environment header checksum mismatch"
        );
        Ok(())
    }

    fn compute_checksum(&self) -> u64 {
        let mut copy = *self;
        copy.checksum = U64::new(0);

        let mut digest = CRC64.digest();
        digest.update(copy.as_bytes());
        digest.finalize()
    }
}
