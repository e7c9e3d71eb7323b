//! # Ordered Window
//!
//! The bounded multimap behind both top-K and bottom-K: the K pairs with
//! the best ordering keys seen so far, plus a cached admission boundary.
//!
//! ## Admission
//!
//! While the window is below capacity every offer is admitted. At
//! capacity an offer is admitted only when its ordering key is strictly
//! better than the boundary - greater for `Top`, smaller for `Bottom` -
//! and the entry sitting at the boundary is evicted to make room.
//!
//! Duplicate ordering keys are allowed; a monotone sequence number keeps
//! ties in insertion order and makes eviction deterministic (the
//! earliest-inserted entry among boundary ties goes first for `Top`, the
//! latest for `Bottom`).
//!
//! ## Invariant
//!
//! After any prefix of the stream the window holds exactly the
//! `min(K, offered)` entries with the best ordering keys among those
//! offered.

use std::collections::BTreeMap;

use super::scalar::ScanScalar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    Top,
    Bottom,
}

pub struct OrderedWindow<T: ScanScalar, U: ScanScalar> {
    entries: BTreeMap<(T::SortKey, u64), (T, U)>,
    /// Admission boundary: the window minimum for `Top`, the maximum for
    /// `Bottom`. `None` only while the window is empty.
    boundary: Option<T::SortKey>,
    seq: u64,
    limit: usize,
    mode: WindowMode,
}

impl<T: ScanScalar, U: ScanScalar> OrderedWindow<T, U> {
    /// Creates a window holding at most `limit` entries; a limit of zero
    /// is coerced to one.
    pub fn new(mode: WindowMode, limit: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            boundary: None,
            seq: 0,
            limit: limit.max(1),
            mode,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Offers one `(order, other)` pair to the window.
    pub fn offer(&mut self, order: T, other: U) {
        let key = order.sort_key();

        if self.entries.len() < self.limit {
            self.insert(key, order, other);
            self.boundary = Some(match (self.boundary, self.mode) {
                (None, _) => key,
                (Some(boundary), WindowMode::Top) => key.min(boundary),
                (Some(boundary), WindowMode::Bottom) => key.max(boundary),
            });
            return;
        }

        let Some(boundary) = self.boundary else {
            // limit >= 1, so a full window always has a boundary
            debug_assert!(false, "full window without boundary");
            return;
        };

        let admitted = match self.mode {
            WindowMode::Top => key > boundary,
            WindowMode::Bottom => key < boundary,
        };
        if !admitted {
            return;
        }

        // evict the entry found at the boundary by ordered lookup
        match self.mode {
            WindowMode::Top => self.entries.pop_first(),
            WindowMode::Bottom => self.entries.pop_last(),
        };
        self.insert(key, order, other);

        self.boundary = match self.mode {
            WindowMode::Top => self.entries.first_key_value(),
            WindowMode::Bottom => self.entries.last_key_value(),
        }
        .map(|((key, _), _)| *key);
    }

    fn insert(&mut self, key: T::SortKey, order: T, other: U) {
        let seq = self.seq;
        self.seq += 1;
        self.entries.insert((key, seq), (order, other));
    }

    /// Entries in ascending ordering-key order, ties in insertion order.
    pub fn iter_ascending(&self) -> impl Iterator<Item = (&T, &U)> {
        self.entries.values().map(|(order, other)| (order, other))
    }
}
