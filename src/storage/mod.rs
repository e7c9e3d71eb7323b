//! # Storage Module
//!
//! The foundational storage layer for burrowdb: memory-mapped paged file
//! access with zero-copy semantics and compile-time pin safety through
//! Rust's borrow checker.
//!
//! ## Architecture Overview
//!
//! The layer is built around memory-mapped I/O. Instead of copying data
//! between kernel and user space, the environment file is mapped directly
//! into the process address space:
//!
//! - **Zero-copy reads**: `&[u8]` slices point directly into the mmap region
//! - **Minimal syscall overhead**: page faults are handled by the OS
//! - **Efficient caching**: the OS page cache is the page cache
//!
//! ## Pin Model
//!
//! Upper layers "pin" a page by borrowing it:
//!
//! ```text
//! PageManager::page(&self) -> &[u8]          // shared pin
//! PageManager::page_mut(&mut self) -> &mut [u8]  // exclusive pin + dirty mark
//! ```
//!
//! Growing the file requires `&mut self`, so the borrow checker proves no
//! page reference survives a remap, with zero runtime cost.
//!
//! ## Page Layout
//!
//! Every structured page begins with a 16-byte persistent header
//! ([`page::PageHeader`]); the rest is the payload region. Page 0 instead
//! carries the 128-byte environment file header and holds no user data.
//! Continuation pages of a multi-page blob run are raw: the full page is
//! payload and no header of any kind is present.
//!
//! ## Module Organization
//!
//! - `mmap`: low-level memory-mapped storage (`MmapStorage`)
//! - `page`: persistent page header and page types
//! - `headers`: the environment file header on page 0
//! - `pager`: page allocation, the free-run pool, dirty tracking

mod headers;
mod mmap;
mod page;
mod pager;

pub use headers::{EnvFileHeader, CURRENT_VERSION, ENV_MAGIC};
pub use mmap::MmapStorage;
pub use page::{PageHeader, PageType};
pub use pager::PageManager;

use eyre::{ensure, Result};
use zerocopy::{FromBytes, Immutable, KnownLayout};

pub const PAGE_HEADER_SIZE: usize = 16;
pub const FILE_HEADER_SIZE: usize = 128;

/// Parses a zerocopy struct from a byte slice with size validation.
#[inline]
pub fn parse_zerocopy<'a, T: FromBytes + KnownLayout + Immutable>(
    bytes: &'a [u8],
    type_name: &str,
) -> Result<&'a T> {
    let size = std::mem::size_of::<T>();
    ensure!(
        bytes.len() >= size,
        "buffer too small for {}: {} < {}",
        type_name,
        bytes.len(),
        size
    );
    T::ref_from_bytes(&bytes[..size])
        .map_err(|e| eyre::eyre!("failed to parse {}: {:?}", type_name, e))
}

/// Parses a mutable zerocopy struct from a byte slice with size validation.
#[inline]
pub fn parse_zerocopy_mut<'a, T: FromBytes + KnownLayout + zerocopy::IntoBytes>(
    bytes: &'a mut [u8],
    type_name: &str,
) -> Result<&'a mut T> {
    let size = std::mem::size_of::<T>();
    ensure!(
        bytes.len() >= size,
        "buffer too small for {}: {} < {}",
        type_name,
        bytes.len(),
        size
    );
    T::mut_from_bytes(&mut bytes[..size])
        .map_err(|e| eyre::eyre!("failed to parse {}: {:?}", type_name, e))
}
