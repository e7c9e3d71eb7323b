//! # Scan Visitors
//!
//! The callback surface the scan driver feeds and the monomorphized
//! top-K / bottom-K implementations behind it.
//!
//! ## Dispatch
//!
//! A statement names the function (top or bottom) and the database config
//! names the `(key_type, record_type)` scalar pair. [`create_scan_visitor`]
//! maps that onto a concrete `WindowScanVisitor<K, R>` so the per-row path
//! is fully monomorphized; attaching a predicate wraps it in a
//! [`FilteredScanVisitor`] that gates every row before it reaches the
//! window.
//!
//! ## Ordering Dimension
//!
//! With `STREAM_KEY` set the window orders by key and carries the record
//! as payload; otherwise the roles swap. Either way `assign_result` emits
//! `(key, record)` rows ascending in the selected dimension.

use std::sync::Arc;

use eyre::{ensure, Result};

use super::predicate::ScanPredicate;
use super::result::ScanResult;
use super::scalar::{ScanScalar, MAX_SCALAR_WIDTH};
use super::statement::{FunctionKind, SelectStatement};
use super::window::{OrderedWindow, WindowMode};
use crate::config::DbConfig;

/// Per-row and per-batch entry points of a scan aggregate, plus result
/// materialization. Batch input carries parallel fixed-width arrays and
/// is semantically identical to row-at-a-time delivery.
pub trait ScanVisitor {
    fn visit(&mut self, key: &[u8], record: &[u8], duplicate_count: usize) -> Result<()>;

    fn visit_batch(&mut self, keys: &[u8], records: &[u8], length: usize) -> Result<()>;

    fn assign_result(&mut self, result: &mut ScanResult) -> Result<()>;
}

/// Top-K / bottom-K over a typed scan stream.
///
/// Only one of the two windows is populated per query; which one depends
/// on the statement's `STREAM_KEY` flag. Keeping both keeps the ordering
/// dimension a runtime choice without boxing the hot path.
pub struct WindowScanVisitor<K: ScanScalar, R: ScanScalar> {
    stream_key: bool,
    keys: OrderedWindow<K, R>,
    records: OrderedWindow<R, K>,
}

impl<K: ScanScalar, R: ScanScalar> WindowScanVisitor<K, R> {
    pub fn new(mode: WindowMode, stmt: &SelectStatement) -> Self {
        Self {
            stream_key: stmt.stream_key(),
            keys: OrderedWindow::new(mode, stmt.limit),
            records: OrderedWindow::new(mode, stmt.limit),
        }
    }
}

impl<K: ScanScalar, R: ScanScalar> ScanVisitor for WindowScanVisitor<K, R> {
    fn visit(&mut self, key: &[u8], record: &[u8], _duplicate_count: usize) -> Result<()> {
        let key = K::from_bytes(key)?;
        let record = R::from_bytes(record)?;

        if self.stream_key {
            self.keys.offer(key, record);
        } else {
            self.records.offer(record, key);
        }
        Ok(())
    }

    fn visit_batch(&mut self, keys: &[u8], records: &[u8], length: usize) -> Result<()> {
        ensure!(
            keys.len() == length * K::WIDTH,
            "invalid argument: key batch holds {} bytes, expected {}",
            keys.len(),
            length * K::WIDTH
        );
        ensure!(
            records.len() == length * R::WIDTH,
            "invalid argument: record batch holds {} bytes, expected {}",
            records.len(),
            length * R::WIDTH
        );

        for (key, record) in keys
            .chunks_exact(K::WIDTH)
            .zip(records.chunks_exact(R::WIDTH))
        {
            self.visit(key, record, 1)?;
        }
        Ok(())
    }

    fn assign_result(&mut self, result: &mut ScanResult) -> Result<()> {
        result.initialize(K::TYPE, R::TYPE);

        let mut key_buf = [0u8; MAX_SCALAR_WIDTH];
        let mut record_buf = [0u8; MAX_SCALAR_WIDTH];

        if self.stream_key {
            for (&key, &record) in self.keys.iter_ascending() {
                let key_len = key.write_le(&mut key_buf);
                let record_len = record.write_le(&mut record_buf);
                result.add_row(&key_buf[..key_len], &record_buf[..record_len]);
            }
        } else {
            for (&record, &key) in self.records.iter_ascending() {
                let key_len = key.write_le(&mut key_buf);
                let record_len = record.write_le(&mut record_buf);
                result.add_row(&key_buf[..key_len], &record_buf[..record_len]);
            }
        }
        Ok(())
    }
}

/// A window visitor gated by a predicate.
///
/// The predicate runs before the window's boundary check on every row.
/// Predicates are external plugins and may have side effects, so the
/// cheaper boundary-first order would be observable; correctness wins
/// over the saved comparisons.
pub struct FilteredScanVisitor<K: ScanScalar, R: ScanScalar> {
    inner: WindowScanVisitor<K, R>,
    predicate: Arc<dyn ScanPredicate>,
}

impl<K: ScanScalar, R: ScanScalar> FilteredScanVisitor<K, R> {
    pub fn new(mode: WindowMode, stmt: &SelectStatement, predicate: Arc<dyn ScanPredicate>) -> Self {
        Self {
            inner: WindowScanVisitor::new(mode, stmt),
            predicate,
        }
    }
}

impl<K: ScanScalar, R: ScanScalar> ScanVisitor for FilteredScanVisitor<K, R> {
    fn visit(&mut self, key: &[u8], record: &[u8], duplicate_count: usize) -> Result<()> {
        if self.predicate.eval(key, record)? {
            self.inner.visit(key, record, duplicate_count)?;
        }
        Ok(())
    }

    fn visit_batch(&mut self, keys: &[u8], records: &[u8], length: usize) -> Result<()> {
        ensure!(
            keys.len() == length * K::WIDTH,
            "invalid argument: key batch holds {} bytes, expected {}",
            keys.len(),
            length * K::WIDTH
        );
        ensure!(
            records.len() == length * R::WIDTH,
            "invalid argument: record batch holds {} bytes, expected {}",
            records.len(),
            length * R::WIDTH
        );

        for (key, record) in keys
            .chunks_exact(K::WIDTH)
            .zip(records.chunks_exact(R::WIDTH))
        {
            self.visit(key, record, 1)?;
        }
        Ok(())
    }

    fn assign_result(&mut self, result: &mut ScanResult) -> Result<()> {
        self.inner.assign_result(result)
    }
}

fn build_visitor<K: ScanScalar, R: ScanScalar>(stmt: &SelectStatement) -> Box<dyn ScanVisitor> {
    let mode = match stmt.function.kind {
        FunctionKind::Top => WindowMode::Top,
        FunctionKind::Bottom => WindowMode::Bottom,
    };
    match &stmt.predicate {
        Some(predicate) => Box::new(FilteredScanVisitor::<K, R>::new(
            mode,
            stmt,
            Arc::clone(predicate),
        )),
        None => Box::new(WindowScanVisitor::<K, R>::new(mode, stmt)),
    }
}

macro_rules! dispatch_record_type {
    ($key:ty, $cfg:expr, $stmt:expr) => {
        match $cfg.record_type {
            crate::config::KeyType::UInt8 => build_visitor::<$key, u8>($stmt),
            crate::config::KeyType::UInt16 => build_visitor::<$key, u16>($stmt),
            crate::config::KeyType::UInt32 => build_visitor::<$key, u32>($stmt),
            crate::config::KeyType::UInt64 => build_visitor::<$key, u64>($stmt),
            crate::config::KeyType::Real32 => build_visitor::<$key, f32>($stmt),
            crate::config::KeyType::Real64 => build_visitor::<$key, f64>($stmt),
        }
    };
}

/// Creates the visitor for `stmt`, monomorphized over the database's
/// `(key_type, record_type)` pair.
pub fn create_scan_visitor(cfg: &DbConfig, stmt: &SelectStatement) -> Box<dyn ScanVisitor> {
    match cfg.key_type {
        crate::config::KeyType::UInt8 => dispatch_record_type!(u8, cfg, stmt),
        crate::config::KeyType::UInt16 => dispatch_record_type!(u16, cfg, stmt),
        crate::config::KeyType::UInt32 => dispatch_record_type!(u32, cfg, stmt),
        crate::config::KeyType::UInt64 => dispatch_record_type!(u64, cfg, stmt),
        crate::config::KeyType::Real32 => dispatch_record_type!(f32, cfg, stmt),
        crate::config::KeyType::Real64 => dispatch_record_type!(f64, cfg, stmt),
    }
}
