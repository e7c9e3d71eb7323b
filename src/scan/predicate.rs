//! # Scan Predicates
//!
//! A predicate is an externally supplied capability consulted before a row
//! is offered to the window. Plugins may carry state and side effects, so
//! the visitor core guarantees every scanned row reaches the predicate, in
//! stream order, before any boundary shortcut.

use eyre::Result;

/// Row admission gate. Receives the raw little-endian key and record
/// bytes of each scanned row.
pub trait ScanPredicate: Send + Sync {
    fn eval(&self, key: &[u8], record: &[u8]) -> Result<bool>;
}

/// Plain boolean closures are predicates.
impl<F> ScanPredicate for F
where
    F: Fn(&[u8], &[u8]) -> bool + Send + Sync,
{
    fn eval(&self, key: &[u8], record: &[u8]) -> Result<bool> {
        Ok(self(key, record))
    }
}
