//! # Select Statement Surface
//!
//! The subset of a parsed query statement the scan visitor core consumes.
//! The query parser that produces these lives outside this crate; tests
//! and embedders construct them directly.

use std::sync::Arc;

use super::predicate::ScanPredicate;

/// Order by record key when set; by record value otherwise.
pub const STREAM_KEY: u32 = 0x1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Top,
    Bottom,
}

/// The aggregate function of a statement plus its flag bits. Bits other
/// than `STREAM_KEY` are ignored by this core.
#[derive(Debug, Clone, Copy)]
pub struct SelectFunction {
    pub kind: FunctionKind,
    pub flags: u32,
}

#[derive(Clone)]
pub struct SelectStatement {
    pub function: SelectFunction,
    /// The query's K. Zero is interpreted as 1 at visitor construction.
    pub limit: usize,
    pub predicate: Option<Arc<dyn ScanPredicate>>,
}

impl SelectStatement {
    pub fn new(kind: FunctionKind, flags: u32, limit: usize) -> Self {
        Self {
            function: SelectFunction { kind, flags },
            limit,
            predicate: None,
        }
    }

    pub fn with_predicate(mut self, predicate: Arc<dyn ScanPredicate>) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn stream_key(&self) -> bool {
        self.function.flags & STREAM_KEY != 0
    }
}

impl std::fmt::Debug for SelectStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectStatement")
            .field("function", &self.function)
            .field("limit", &self.limit)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_key_flag() {
        let stmt = SelectStatement::new(FunctionKind::Top, STREAM_KEY, 3);
        assert!(stmt.stream_key());

        let stmt = SelectStatement::new(FunctionKind::Top, 0, 3);
        assert!(!stmt.stream_key());
    }

    #[test]
    fn unrelated_flag_bits_do_not_set_stream_key() {
        let stmt = SelectStatement::new(FunctionKind::Bottom, 0xFF00, 1);
        assert!(!stmt.stream_key());
    }
}
