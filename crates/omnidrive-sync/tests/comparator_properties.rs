//! Comparator properties over generated catalogs
//!
//! Catalogs are drawn from a small name/size pool so that duplicate keys and
//! same-name-different-size collisions are frequent.

use std::collections::HashMap;

use omnidrive_core::domain::{BackendName, Catalog, FileRecord, KeyPolicy, RecordKey, SyncPlan};
use omnidrive_sync::Comparator;

const NAMES: &[&str] = &["README", "a.txt", "b.txt", "photos", "report.pdf"];

/// Deterministic linear congruential generator
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: usize) -> usize {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 33) as usize) % bound
    }
}

fn generate(backend: &str, seed: u64, len: usize) -> Catalog {
    let mut rng = Lcg(seed);
    let records = (0..len)
        .map(|i| {
            let name = NAMES[rng.next(NAMES.len())];
            let id = format!("{backend}-{i}");
            if rng.next(6) == 0 {
                FileRecord::folder(id, name)
            } else {
                FileRecord::file(id, name, rng.next(3) as u64)
            }
        })
        .collect();
    Catalog::new(BackendName::new(backend).unwrap(), None, records)
}

fn key_counts<'a>(
    policy: KeyPolicy,
    records: impl Iterator<Item = &'a FileRecord>,
) -> HashMap<RecordKey, usize> {
    let mut counts = HashMap::new();
    for record in records {
        *counts.entry(policy.key_for(record)).or_insert(0) += 1;
    }
    counts
}

fn ids(records: &[FileRecord]) -> Vec<&str> {
    records.iter().map(FileRecord::id).collect()
}

fn assert_partition(a: &Catalog, b: &Catalog, plan: &SyncPlan, policy: KeyPolicy) {
    // Every source record appears exactly once, on the source side of the plan
    let mut source_ids: Vec<&str> = ids(plan.only_in_source());
    source_ids.extend(plan.common().iter().map(|p| p.source.id()));
    source_ids.sort_unstable();
    let mut expected: Vec<&str> = ids(a.records());
    expected.sort_unstable();
    assert_eq!(source_ids, expected);

    let mut target_ids: Vec<&str> = ids(plan.only_in_target());
    target_ids.extend(plan.common().iter().map(|p| p.target.id()));
    target_ids.sort_unstable();
    let mut expected: Vec<&str> = ids(b.records());
    expected.sort_unstable();
    assert_eq!(target_ids, expected);

    // Matched pairs share a key; unmatched keys never appear on both sides
    for pair in plan.common() {
        assert_eq!(policy.key_for(&pair.source), policy.key_for(&pair.target));
    }
    let only_source = key_counts(policy, plan.only_in_source().iter());
    let only_target = key_counts(policy, plan.only_in_target().iter());
    for key in only_source.keys() {
        assert!(!only_target.contains_key(key), "key {key} on both only-in sides");
    }

    // Per key, the number of pairs is the smaller multiplicity
    let a_counts = key_counts(policy, a.records().iter());
    let b_counts = key_counts(policy, b.records().iter());
    let pairs = key_counts(policy, plan.common().iter().map(|p| &p.source));
    for (key, &count) in &a_counts {
        let expected = count.min(b_counts.get(key).copied().unwrap_or(0));
        assert_eq!(pairs.get(key).copied().unwrap_or(0), expected, "pairs for {key}");
    }
}

#[test]
fn test_plan_partitions_both_catalogs() {
    for seed in 1..40u64 {
        for policy in [KeyPolicy::NameAndSize, KeyPolicy::NameOnly] {
            let a = generate("drive-a", seed, (seed % 13) as usize);
            let b = generate("drive-b", seed * 7919, (seed % 11) as usize);
            let plan = Comparator::new(policy).compare(&a, &b).unwrap();
            assert_partition(&a, &b, &plan, policy);
        }
    }
}

#[test]
fn test_compare_is_symmetric() {
    for seed in 1..40u64 {
        let a = generate("drive-a", seed, 10);
        let b = generate("drive-b", seed + 1000, 10);
        let comparator = Comparator::default();

        let forward = comparator.compare(&a, &b).unwrap();
        let backward = comparator.compare(&b, &a).unwrap();

        assert_eq!(forward.only_in_source(), backward.only_in_target());
        assert_eq!(forward.only_in_target(), backward.only_in_source());
        assert_eq!(forward.common().len(), backward.common().len());
    }
}

#[test]
fn test_compare_with_itself_is_all_common() {
    for seed in 1..20u64 {
        let a = generate("drive-a", seed, 12);
        let plan = Comparator::default().compare(&a, &a).unwrap();

        assert!(plan.only_in_source().is_empty());
        assert!(plan.only_in_target().is_empty());
        let common: Vec<&FileRecord> = plan.common_source_records().collect();
        let expected: Vec<&FileRecord> = a.records().iter().collect();
        assert_eq!(common, expected);
    }
}

#[test]
fn test_compare_is_deterministic() {
    let a = generate("drive-a", 42, 30);
    let b = generate("drive-b", 43, 30);
    let first = Comparator::default().compare(&a, &b).unwrap();
    let second = Comparator::default().compare(&a, &b).unwrap();
    assert_eq!(first.only_in_source(), second.only_in_source());
    assert_eq!(first.only_in_target(), second.only_in_target());
    assert_eq!(first.common(), second.common());
}
