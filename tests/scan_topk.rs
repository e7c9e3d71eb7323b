use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use burrowdb::{
    create_scan_visitor, DbConfig, FunctionKind, KeyType, ScanResult, ScanVisitor,
    SelectStatement, STREAM_KEY,
};

fn feed(visitor: &mut dyn ScanVisitor, rows: &[(u32, u32)]) {
    for &(key, record) in rows {
        visitor
            .visit(&key.to_le_bytes(), &record.to_le_bytes(), 1)
            .unwrap();
    }
}

fn rows_u32(result: &ScanResult) -> Vec<(u32, u32)> {
    result
        .rows()
        .map(|(key, record)| {
            (
                u32::from_le_bytes(key.try_into().unwrap()),
                u32::from_le_bytes(record.try_into().unwrap()),
            )
        })
        .collect()
}

fn u32_cfg() -> DbConfig {
    DbConfig::new(KeyType::UInt32, KeyType::UInt32)
}

const STREAM: &[(u32, u32)] = &[(1, 5), (2, 9), (3, 2), (4, 9), (5, 1), (6, 7)];

#[test]
fn top_three_by_value() {
    let stmt = SelectStatement::new(FunctionKind::Top, 0, 3);
    let mut visitor = create_scan_visitor(&u32_cfg(), &stmt);
    feed(visitor.as_mut(), STREAM);

    let mut result = ScanResult::new();
    visitor.assign_result(&mut result).unwrap();

    // sorted ascending by value; keys ride along
    assert_eq!(rows_u32(&result), vec![(6, 7), (2, 9), (4, 9)]);
}

#[test]
fn bottom_two_by_key_with_value_predicate() {
    let predicate =
        Arc::new(|_key: &[u8], record: &[u8]| u32::from_le_bytes(record.try_into().unwrap()) > 3);
    let stmt =
        SelectStatement::new(FunctionKind::Bottom, STREAM_KEY, 2).with_predicate(predicate);
    let mut visitor = create_scan_visitor(&u32_cfg(), &stmt);
    feed(visitor.as_mut(), STREAM);

    let mut result = ScanResult::new();
    visitor.assign_result(&mut result).unwrap();

    assert_eq!(rows_u32(&result), vec![(1, 5), (2, 9)]);
}

#[test]
fn zero_limit_behaves_as_one() {
    let stmt = SelectStatement::new(FunctionKind::Top, 0, 0);
    let mut visitor = create_scan_visitor(&u32_cfg(), &stmt);
    feed(visitor.as_mut(), STREAM);

    let mut result = ScanResult::new();
    visitor.assign_result(&mut result).unwrap();

    assert_eq!(rows_u32(&result), vec![(2, 9)]);
}

fn pseudo_random_rows(count: usize, seed: u64) -> Vec<(u32, u32)> {
    let mut state = seed;
    (0..count)
        .map(|i| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (i as u32, (state >> 33) as u32 % 1000)
        })
        .collect()
}

#[test]
fn top_k_matches_sorted_reference() {
    for k in [1usize, 3, 10, 50, 500] {
        let rows = pseudo_random_rows(300, 42);
        let stmt = SelectStatement::new(FunctionKind::Top, 0, k);
        let mut visitor = create_scan_visitor(&u32_cfg(), &stmt);
        feed(visitor.as_mut(), &rows);

        let mut result = ScanResult::new();
        visitor.assign_result(&mut result).unwrap();

        let mut expected: Vec<u32> = rows.iter().map(|&(_, v)| v).collect();
        expected.sort_unstable_by(|a, b| b.cmp(a));
        expected.truncate(k);
        expected.sort_unstable();

        let got: Vec<u32> = rows_u32(&result).iter().map(|&(_, v)| v).collect();
        assert_eq!(got, expected, "k={}", k);
    }
}

#[test]
fn bottom_k_matches_sorted_reference() {
    for k in [1usize, 7, 25] {
        let rows = pseudo_random_rows(300, 7);
        let stmt = SelectStatement::new(FunctionKind::Bottom, STREAM_KEY, k);
        let mut visitor = create_scan_visitor(&u32_cfg(), &stmt);
        feed(visitor.as_mut(), &rows);

        let mut result = ScanResult::new();
        visitor.assign_result(&mut result).unwrap();

        let mut expected: Vec<u32> = rows.iter().map(|&(key, _)| key).collect();
        expected.sort_unstable();
        expected.truncate(k);

        let got: Vec<u32> = rows_u32(&result).iter().map(|&(key, _)| key).collect();
        assert_eq!(got, expected, "k={}", k);
    }
}

#[test]
fn output_is_sorted_ascending_in_selected_dimension() {
    let rows = pseudo_random_rows(200, 99);

    for (flags, by_key) in [(STREAM_KEY, true), (0, false)] {
        let stmt = SelectStatement::new(FunctionKind::Top, flags, 20);
        let mut visitor = create_scan_visitor(&u32_cfg(), &stmt);
        feed(visitor.as_mut(), &rows);

        let mut result = ScanResult::new();
        visitor.assign_result(&mut result).unwrap();

        let dimension: Vec<u32> = rows_u32(&result)
            .iter()
            .map(|&(key, value)| if by_key { key } else { value })
            .collect();
        assert!(dimension.windows(2).all(|w| w[0] <= w[1]));
    }
}

#[test]
fn predicate_gate_equals_prefilter() {
    let rows = pseudo_random_rows(400, 123);
    let cutoff = 500u32;

    let predicate = Arc::new(move |_key: &[u8], record: &[u8]| {
        u32::from_le_bytes(record.try_into().unwrap()) < cutoff
    });
    let stmt = SelectStatement::new(FunctionKind::Top, 0, 15).with_predicate(predicate);
    let mut gated = create_scan_visitor(&u32_cfg(), &stmt);
    feed(gated.as_mut(), &rows);

    let prefiltered: Vec<(u32, u32)> = rows.iter().copied().filter(|&(_, v)| v < cutoff).collect();
    let plain_stmt = SelectStatement::new(FunctionKind::Top, 0, 15);
    let mut plain = create_scan_visitor(&u32_cfg(), &plain_stmt);
    feed(plain.as_mut(), &prefiltered);

    let mut gated_result = ScanResult::new();
    gated.assign_result(&mut gated_result).unwrap();
    let mut plain_result = ScanResult::new();
    plain.assign_result(&mut plain_result).unwrap();

    assert_eq!(rows_u32(&gated_result), rows_u32(&plain_result));
}

#[test]
fn predicate_sees_every_row_in_order() {
    struct Counting {
        calls: AtomicUsize,
    }
    impl burrowdb::ScanPredicate for Counting {
        fn eval(&self, key: &[u8], _record: &[u8]) -> eyre::Result<bool> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            // rows arrive in stream order
            assert_eq!(u32::from_le_bytes(key.try_into().unwrap()) as usize, call);
            Ok(true)
        }
    }

    let predicate = Arc::new(Counting {
        calls: AtomicUsize::new(0),
    });
    let stmt = SelectStatement::new(FunctionKind::Top, 0, 1).with_predicate(predicate.clone());
    let mut visitor = create_scan_visitor(&u32_cfg(), &stmt);

    let rows: Vec<(u32, u32)> = (0..100).map(|i| (i, i % 5)).collect();
    feed(visitor.as_mut(), &rows);

    // the boundary check must not short-circuit the predicate
    assert_eq!(predicate.calls.load(Ordering::SeqCst), rows.len());
}

#[test]
fn batch_delivery_is_observationally_equivalent() {
    let rows = pseudo_random_rows(257, 5);

    let stmt = SelectStatement::new(FunctionKind::Bottom, 0, 12);
    let mut single = create_scan_visitor(&u32_cfg(), &stmt);
    feed(single.as_mut(), &rows);

    let mut keys = Vec::new();
    let mut records = Vec::new();
    for &(key, record) in &rows {
        keys.extend_from_slice(&key.to_le_bytes());
        records.extend_from_slice(&record.to_le_bytes());
    }
    let mut batched = create_scan_visitor(&u32_cfg(), &stmt);
    // split the stream into uneven batches
    let splits = [0usize, 1, 100, 101, 256, 257];
    for pair in splits.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        batched
            .visit_batch(&keys[lo * 4..hi * 4], &records[lo * 4..hi * 4], hi - lo)
            .unwrap();
    }

    let mut single_result = ScanResult::new();
    single.assign_result(&mut single_result).unwrap();
    let mut batched_result = ScanResult::new();
    batched.assign_result(&mut batched_result).unwrap();

    assert_eq!(rows_u32(&single_result), rows_u32(&batched_result));
}

#[test]
fn batched_predicate_variant_equals_single_rows() {
    let rows = pseudo_random_rows(64, 77);
    let predicate =
        Arc::new(|key: &[u8], _record: &[u8]| u32::from_le_bytes(key.try_into().unwrap()) % 2 == 0);

    let stmt = SelectStatement::new(FunctionKind::Top, STREAM_KEY, 8).with_predicate(predicate);
    let mut single = create_scan_visitor(&u32_cfg(), &stmt);
    feed(single.as_mut(), &rows);

    let mut keys = Vec::new();
    let mut records = Vec::new();
    for &(key, record) in &rows {
        keys.extend_from_slice(&key.to_le_bytes());
        records.extend_from_slice(&record.to_le_bytes());
    }
    let mut batched = create_scan_visitor(&u32_cfg(), &stmt);
    batched.visit_batch(&keys, &records, rows.len()).unwrap();

    let mut single_result = ScanResult::new();
    single.assign_result(&mut single_result).unwrap();
    let mut batched_result = ScanResult::new();
    batched.assign_result(&mut batched_result).unwrap();

    assert_eq!(rows_u32(&single_result), rows_u32(&batched_result));
}

#[test]
fn mixed_scalar_types_dispatch() {
    // u64 keys ordered by f64 records
    let cfg = DbConfig::new(KeyType::UInt64, KeyType::Real64);
    let stmt = SelectStatement::new(FunctionKind::Top, 0, 2);
    let mut visitor = create_scan_visitor(&cfg, &stmt);

    for (key, record) in [(10u64, 1.5f64), (20, -3.25), (30, 8.0), (40, 2.5)] {
        visitor
            .visit(&key.to_le_bytes(), &record.to_le_bytes(), 1)
            .unwrap();
    }

    let mut result = ScanResult::new();
    visitor.assign_result(&mut result).unwrap();

    let rows: Vec<(u64, f64)> = result
        .rows()
        .map(|(key, record)| {
            (
                u64::from_le_bytes(key.try_into().unwrap()),
                f64::from_le_bytes(record.try_into().unwrap()),
            )
        })
        .collect();
    assert_eq!(rows, vec![(40, 2.5), (30, 8.0)]);
    assert_eq!(result.key_type(), Some(KeyType::UInt64));
    assert_eq!(result.record_type(), Some(KeyType::Real64));
}
