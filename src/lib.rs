//! # burrowdb - Embedded Blob Store and Scan Core
//!
//! burrowdb implements the two storage-engine cores of an embedded
//! key/value database:
//!
//! - **Blob store**: variable-length record payloads that do not fit inside
//!   B-tree leaves are packed into pages, reclaimed through an in-page
//!   freelist, overwritten in place when the new payload fits the old slab,
//!   and read back into a caller-supplied arena.
//! - **Scan visitors**: streaming top-N / bottom-N selectors over a scan
//!   stream, keyed by record key or record value, optionally gated by a
//!   user-supplied predicate.
//!
//! ## Quick Start
//!
//! ```ignore
//! use burrowdb::{Environment, EnvConfig};
//! use bumpalo::Bump;
//!
//! let mut env = Environment::create("./data.bdb", EnvConfig::default())?;
//! let id = env.allocate_blob(b"hello", 0)?;
//!
//! let arena = Bump::new();
//! assert_eq!(env.read_blob(&arena, id, 0)?, b"hello");
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │        Environment (lifecycle)       │
//! ├──────────────────┬──────────────────┤
//! │   Blob Manager   │  Scan Visitors   │
//! ├──────────────────┴──────────────────┤
//! │     Page Manager (alloc/free)        │
//! ├─────────────────────────────────────┤
//! │     Memory-Mapped File I/O           │
//! └─────────────────────────────────────┘
//! ```
//!
//! The B-tree, cursor, transaction, and query-parser layers of the full
//! engine are external collaborators; burrowdb exposes the interfaces they
//! consume (blob ids, scan visitor callbacks) and nothing else.
//!
//! ## Module Overview
//!
//! - [`storage`]: memory-mapped paged file, page manager, on-disk headers
//! - [`blob`]: blob page layout, in-page freelist, blob manager
//! - [`scan`]: ordered windows, scan visitors, result materialization
//! - [`config`]: environment and database configuration
//! - [`env`]: environment lifecycle tying the pieces together

#[macro_use]
mod macros;

pub mod blob;
pub mod config;
pub mod env;
pub mod scan;
pub mod storage;

pub use blob::{DiskBlobManager, DIRECT_ACCESS};
pub use config::{DbConfig, EnvConfig, KeyType};
pub use env::Environment;
pub use scan::{
    create_scan_visitor, FunctionKind, ScanPredicate, ScanResult, ScanVisitor, SelectStatement,
    STREAM_KEY,
};
