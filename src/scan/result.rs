//! # Scan Result
//!
//! Flat row storage for materialized scan output. Keys and records are
//! fixed-width scalars, so each side is one contiguous buffer and a row
//! is a pair of offsets - no per-row allocation.

use crate::config::KeyType;

#[derive(Debug, Default)]
pub struct ScanResult {
    key_type: Option<KeyType>,
    record_type: Option<KeyType>,
    row_count: usize,
    keys: Vec<u8>,
    records: Vec<u8>,
}

impl ScanResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamps the result with its scalar types and clears any prior rows.
    /// Visitors call this once at the start of `assign_result`.
    pub fn initialize(&mut self, key_type: KeyType, record_type: KeyType) {
        self.key_type = Some(key_type);
        self.record_type = Some(record_type);
        self.row_count = 0;
        self.keys.clear();
        self.records.clear();
    }

    pub fn add_row(&mut self, key: &[u8], record: &[u8]) {
        self.keys.extend_from_slice(key);
        self.records.extend_from_slice(record);
        self.row_count += 1;
    }

    pub fn key_type(&self) -> Option<KeyType> {
        self.key_type
    }

    pub fn record_type(&self) -> Option<KeyType> {
        self.record_type
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// The key bytes of row `row`.
    pub fn key(&self, row: usize) -> &[u8] {
        let width = self.key_type.map_or(0, KeyType::width);
        &self.keys[row * width..(row + 1) * width]
    }

    /// The record bytes of row `row`.
    pub fn record(&self, row: usize) -> &[u8] {
        let width = self.record_type.map_or(0, KeyType::width);
        &self.records[row * width..(row + 1) * width]
    }

    /// Iterates `(key, record)` rows in materialization order.
    pub fn rows(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        (0..self.row_count).map(|row| (self.key(row), self.record(row)))
    }
}
