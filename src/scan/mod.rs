//! # Scan Visitor Core
//!
//! Bounded order-statistic aggregation over a scan stream. The B-tree
//! layer drives rows (or batches of fixed-width rows) into a visitor; at
//! scan end the visitor materializes its result.
//!
//! ## Components
//!
//! - [`OrderedWindow`]: the shared primitive behind top-K and bottom-K - a
//!   bounded multimap of the K best `(order, other)` pairs seen so far,
//!   with a cached admission boundary.
//! - [`ScanVisitor`]: the per-row / per-batch callback surface plus result
//!   materialization.
//! - [`create_scan_visitor`]: dispatches `(key_type, record_type)` from
//!   the database config onto a monomorphized visitor, optionally wrapped
//!   with a predicate gate.
//!
//! ## Predicate Ordering
//!
//! When a predicate is attached it is evaluated before the window's
//! boundary check. Predicates are externally supplied and may observe
//! every offered row; evaluating the boundary first would change which
//! rows a side-effecting predicate sees.
//!
//! ## Thread Safety
//!
//! Visitors are single-threaded per query and share no state across
//! queries.

mod predicate;
mod result;
mod scalar;
mod statement;
mod visitor;
mod window;

pub use predicate::ScanPredicate;
pub use result::ScanResult;
pub use scalar::{OrderedF32, OrderedF64, ScanScalar, MAX_SCALAR_WIDTH};
pub use statement::{FunctionKind, SelectFunction, SelectStatement, STREAM_KEY};
pub use visitor::{create_scan_visitor, FilteredScanVisitor, ScanVisitor, WindowScanVisitor};
pub use window::{OrderedWindow, WindowMode};
