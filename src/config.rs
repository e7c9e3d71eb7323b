//! # Environment and Database Configuration
//!
//! Configuration surfaces consumed by the blob store and the scan visitor
//! core. `EnvConfig` fixes the physical parameters of a paged file at create
//! time; `DbConfig` describes the key/record scalar types of one database,
//! which the scan visitor factory uses to pick a monomorphized visitor.
//!
//! ## Page Size
//!
//! The page size is chosen once, when the environment file is created, and
//! persisted in the file header. It must be a power of two between 4 KiB and
//! 64 KiB. The default is 16 KiB: larger than SQLite's 4 KiB default for
//! better sequential throughput, aligned to common OS page sizes, and small
//! enough that partially filled blob pages do not waste much space.

use eyre::{ensure, Result};

pub const MIN_PAGE_SIZE: usize = 4 * 1024;
pub const MAX_PAGE_SIZE: usize = 64 * 1024;
pub const DEFAULT_PAGE_SIZE: usize = 16 * 1024;

/// Physical parameters of an environment, fixed at create time.
#[derive(Debug, Clone, Copy)]
pub struct EnvConfig {
    pub page_size: usize,
}

impl EnvConfig {
    pub fn new(page_size: usize) -> Self {
        Self { page_size }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.page_size.is_power_of_two(),
            "page size {} is not a power of two",
            self.page_size
        );
        ensure!(
            (MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size),
            "page size {} out of range [{}, {}]",
            self.page_size,
            MIN_PAGE_SIZE,
            MAX_PAGE_SIZE
        );
        Ok(())
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// The fixed-width scalar types a database can use for keys and records.
///
/// Scan visitors are monomorphized over pairs of these; the discriminant
/// values are part of the result format handed to the external result
/// builder.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    UInt8 = 1,
    UInt16 = 2,
    UInt32 = 3,
    UInt64 = 4,
    Real32 = 5,
    Real64 = 6,
}

impl KeyType {
    /// Width in bytes of one value of this type on the scan stream.
    pub fn width(self) -> usize {
        match self {
            KeyType::UInt8 => 1,
            KeyType::UInt16 => 2,
            KeyType::UInt32 => 4,
            KeyType::UInt64 => 8,
            KeyType::Real32 => 4,
            KeyType::Real64 => 8,
        }
    }
}

/// Per-database configuration consumed by the scan visitor factory.
#[derive(Debug, Clone, Copy)]
pub struct DbConfig {
    pub key_type: KeyType,
    pub record_type: KeyType,
}

impl DbConfig {
    pub fn new(key_type: KeyType, record_type: KeyType) -> Self {
        Self {
            key_type,
            record_type,
        }
    }
}
