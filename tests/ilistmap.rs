//! Writer -> reader round trips for the interval list store.
//!
//! Randomized payload-tagged entries are compared against a naive filtered
//! truth; the payload mask admission and windowed containment get dense
//! sweeps.

use intervalset::{
    Interval, IntervalListMapping, IntervalListWriter, PayloadEntry, PayloadFilter, StoreError,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use tempfile::TempDir;

const PAYLOAD_LEN: usize = 2;
const DISTINCT_PAYLOADS: u64 = 16;
const N_IDS: u32 = 60;
const ENTRIES_PER_ID: usize = 300;
const MAX_T: u32 = 10_000;
const MAX_SPAN: u32 = 2_000;

type Truth = HashMap<u32, Vec<PayloadEntry>>;

fn iv(start: u32, end: u32) -> Interval {
    Interval::new(start, end)
}

fn payload_eq(value: u64) -> PayloadFilter {
    PayloadFilter::new(0xFFFF, value)
}

fn build_store(dir: &TempDir, seed: u64) -> (IntervalListMapping, Truth) {
    let path = dir.path().join("ilistmap.bin");
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut writer = IntervalListWriter::create(&path, PAYLOAD_LEN).unwrap();
    let mut truth = Truth::new();
    for id in 0..N_IDS {
        let mut entries: Vec<PayloadEntry> = (0..ENTRIES_PER_ID)
            .map(|_| {
                let start = rng.gen_range(0..MAX_T);
                let end = MAX_T.min(start + rng.gen_range(1..=MAX_SPAN));
                let payload = rng.gen_range(0..DISTINCT_PAYLOADS);
                PayloadEntry::new(start, end, payload)
            })
            .collect();
        entries.sort_by_key(|e| (e.interval.start, e.interval.end, e.payload));
        writer.write(id, &entries).unwrap();
        truth.insert(id, entries);
    }
    writer.finish().unwrap();
    (IntervalListMapping::open(&path, PAYLOAD_LEN).unwrap(), truth)
}

fn filtered(entries: &[PayloadEntry], filter: PayloadFilter) -> Vec<Interval> {
    entries
        .iter()
        .filter(|e| filter.admits(e.payload))
        .map(|e| e.interval)
        .collect()
}

/// Strict-overlap merge, the engine's fuzz-0 coalescing rule.
fn naive_coalesce(intervals: &[Interval]) -> Vec<Interval> {
    let mut result: Vec<Interval> = Vec::new();
    for &next in intervals {
        match result.last_mut() {
            Some(last) if last.end.min(next.end) > last.start.max(next.start) => {
                last.start = last.start.min(next.start);
                last.end = last.end.max(next.end);
            }
            _ => result.push(next),
        }
    }
    result
}

#[test]
fn index_integrity() {
    let dir = TempDir::new().unwrap();
    let (map, truth) = build_store(&dir, 1);

    assert_eq!(map.len(), truth.len());
    let mut expected_ids: Vec<u32> = truth.keys().copied().collect();
    expected_ids.sort_unstable();
    assert_eq!(map.get_ids(), expected_ids.as_slice());

    for (&id, entries) in &truth {
        assert!(map.has_id(id));
        assert_eq!(
            map.get_interval_count(id, PayloadFilter::ANY).unwrap(),
            entries.len()
        );
        assert_eq!(&map.get_intervals_with_payload(id, false).unwrap(), entries);

        for payload in 0..DISTINCT_PAYLOADS {
            let expected = filtered(entries, payload_eq(payload));
            assert_eq!(
                map.get_interval_count(id, payload_eq(payload)).unwrap(),
                expected.len()
            );
            assert_eq!(
                map.get_intervals(id, payload_eq(payload), false).unwrap(),
                expected
            );
        }
    }
}

#[test]
fn contains_matches_dense_sweep() {
    let dir = TempDir::new().unwrap();
    let (map, truth) = build_store(&dir, 2);
    let mut rng = SmallRng::seed_from_u64(20);

    let id = 17;
    let entries = &truth[&id];
    for v in 0..MAX_T {
        let payload = rng.gen_range(0..DISTINCT_PAYLOADS);
        let expected = entries
            .iter()
            .any(|e| e.payload == payload && e.interval.contains(v));
        assert_eq!(
            map.is_contained(id, v, payload_eq(payload), false, MAX_SPAN)
                .unwrap(),
            expected,
            "point {} payload {}",
            v,
            payload
        );
    }
}

#[test]
fn sum_round_trip() {
    let dir = TempDir::new().unwrap();
    let (map, truth) = build_store(&dir, 3);

    let expected: u64 = truth
        .values()
        .flat_map(|entries| entries.iter().map(|e| u64::from(e.interval.len())))
        .sum();
    assert_eq!(map.sum(PayloadFilter::ANY), expected);

    for payload in 0..DISTINCT_PAYLOADS {
        let expected: u64 = truth
            .values()
            .flat_map(|entries| {
                filtered(entries, payload_eq(payload))
                    .into_iter()
                    .map(|iv| u64::from(iv.len()))
            })
            .sum();
        assert_eq!(map.sum(payload_eq(payload)), expected);
    }
}

#[test]
fn intersect_sum_is_raw_filtered_length() {
    let dir = TempDir::new().unwrap();
    let (map, truth) = build_store(&dir, 4);
    let mut rng = SmallRng::seed_from_u64(40);

    for _ in 0..10 {
        let id = rng.gen_range(0..N_IDS);
        for payload in 0..DISTINCT_PAYLOADS {
            let expected: u64 = filtered(&truth[&id], payload_eq(payload))
                .iter()
                .map(|iv| u64::from(iv.len()))
                .sum();
            assert_eq!(
                map.intersect_sum(id, &[iv(0, MAX_T)], payload_eq(payload), false)
                    .unwrap(),
                expected
            );
        }
    }
}

#[test]
fn intersect_coalesces_strict_overlap() {
    let dir = TempDir::new().unwrap();
    let (map, truth) = build_store(&dir, 5);
    let mut rng = SmallRng::seed_from_u64(50);

    for _ in 0..10 {
        let id = rng.gen_range(0..N_IDS);
        for payload in 0..DISTINCT_PAYLOADS {
            let expected = naive_coalesce(&filtered(&truth[&id], payload_eq(payload)));
            assert_eq!(
                map.intersect(id, &[iv(0, MAX_T)], payload_eq(payload), false)
                    .unwrap(),
                expected
            );
        }
    }
}

#[test]
fn missing_id_policy() {
    let dir = TempDir::new().unwrap();
    let (map, _) = build_store(&dir, 6);
    let absent = N_IDS + 9;

    assert!(!map.has_id(absent));
    assert!(map
        .get_intervals(absent, PayloadFilter::ANY, true)
        .unwrap()
        .is_empty());
    assert!(map.get_intervals_with_payload(absent, true).unwrap().is_empty());
    assert!(!map
        .is_contained(absent, 5, PayloadFilter::ANY, true, MAX_SPAN)
        .unwrap());

    assert!(matches!(
        map.get_intervals(absent, PayloadFilter::ANY, false),
        Err(StoreError::IdNotFound(_))
    ));
    assert!(matches!(
        map.get_interval_count(absent, PayloadFilter::ANY),
        Err(StoreError::IdNotFound(_))
    ));
}

#[test]
fn zero_payload_width_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plain.bin");

    let mut writer = IntervalListWriter::create(&path, 0).unwrap();
    writer
        .write(4, &[PayloadEntry::new(0, 10, 0), PayloadEntry::new(5, 8, 0)])
        .unwrap();
    writer.finish().unwrap();

    let map = IntervalListMapping::open(&path, 0).unwrap();
    assert_eq!(map.payload_len(), 0);
    assert_eq!(map.get_interval_count(4, PayloadFilter::ANY).unwrap(), 2);
    assert_eq!(
        map.get_intervals(4, PayloadFilter::ANY, false).unwrap(),
        vec![iv(0, 10), iv(5, 8)]
    );
    assert_eq!(map.sum(PayloadFilter::ANY), 13);
}

#[test]
fn append_duplicate_id_last_wins() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dup.bin");

    let mut writer = IntervalListWriter::create(&path, PAYLOAD_LEN).unwrap();
    writer.write(1, &[PayloadEntry::new(0, 10, 7)]).unwrap();
    writer.finish().unwrap();

    let mut writer = IntervalListWriter::append(&path, PAYLOAD_LEN).unwrap();
    writer
        .write(1, &[PayloadEntry::new(2, 4, 1), PayloadEntry::new(3, 9, 2)])
        .unwrap();
    writer.finish().unwrap();

    let map = IntervalListMapping::open(&path, PAYLOAD_LEN).unwrap();
    assert_eq!(map.len(), 1);
    assert_eq!(map.get_interval_count(1, PayloadFilter::ANY).unwrap(), 2);
    assert_eq!(
        map.get_intervals_with_payload(1, false).unwrap(),
        vec![PayloadEntry::new(2, 4, 1), PayloadEntry::new(3, 9, 2)]
    );
}

#[test]
fn malformed_file_fails_at_open() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.bin");
    // Header promises two 10-byte entries, body holds half of one
    let mut data = Vec::new();
    data.extend_from_slice(&1u32.to_le_bytes());
    data.extend_from_slice(&2u32.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    std::fs::write(&path, data).unwrap();

    assert!(matches!(
        IntervalListMapping::open(&path, PAYLOAD_LEN),
        Err(StoreError::MalformedFile(_))
    ));
}

#[test]
fn seed_scenario() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("s3.bin");
    let mut writer = IntervalListWriter::create(&path, 1).unwrap();
    writer
        .write(
            1,
            &[
                PayloadEntry::new(0, 10, 0x01),
                PayloadEntry::new(5, 15, 0x02),
                PayloadEntry::new(12, 20, 0x01),
            ],
        )
        .unwrap();
    writer.finish().unwrap();

    let map = IntervalListMapping::open(&path, 1).unwrap();
    let ones = PayloadFilter::new(0xFF, 0x01);
    assert_eq!(
        map.intersect(1, &[iv(0, 100)], ones, false).unwrap(),
        vec![iv(0, 10), iv(12, 20)]
    );
    assert_eq!(map.intersect_sum(1, &[iv(0, 100)], ones, false).unwrap(), 18);
    assert!(!map.is_contained(1, 11, ones, false, 15).unwrap());
    assert!(map
        .is_contained(1, 11, PayloadFilter::new(0xFF, 0x02), false, 15)
        .unwrap());
}
