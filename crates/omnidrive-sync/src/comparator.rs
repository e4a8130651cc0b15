//! Catalog comparator
//!
//! `compare(source, target)` partitions the two catalogs into
//! `only_in_source`, `only_in_target` and matched pairs:
//!
//! 1. index the target by key, each key mapping to the queue of target
//!    records carrying it, in catalog order;
//! 2. scan the source once; a source record whose key still has a queued
//!    target record is matched with the front of that queue, otherwise it is
//!    only in the source;
//! 3. every target record left in a queue is only in the target, reported
//!    in target catalog order.
//!
//! Duplicated keys therefore pair up in catalog order and the surplus lands
//! on the corresponding "only in" side. The pass is O(|source| + |target|)
//! and deterministic for a given input order. See
//! [`omnidrive_core::domain::sync_plan`] for the weaknesses of the key.

use std::collections::{HashMap, HashSet, VecDeque};

use omnidrive_core::domain::{Catalog, KeyPolicy, MatchedPair, RecordKey, SyncPlan};
use tracing::debug;

use crate::error::ComparisonError;

/// Computes sync plans under a fixed key policy
#[derive(Debug, Clone, Copy, Default)]
pub struct Comparator {
    policy: KeyPolicy,
}

impl Comparator {
    pub fn new(policy: KeyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> KeyPolicy {
        self.policy
    }

    /// Compares `source` against `target`
    ///
    /// Incomplete catalogs still produce a plan, flagged incomplete.
    pub fn compare(&self, source: &Catalog, target: &Catalog) -> Result<SyncPlan, ComparisonError> {
        validate(source)?;
        validate(target)?;

        let mut index: HashMap<RecordKey, VecDeque<usize>> = HashMap::with_capacity(target.len());
        for (i, record) in target.records().iter().enumerate() {
            index.entry(self.policy.key_for(record)).or_default().push_back(i);
        }

        let mut matched_targets = vec![false; target.len()];
        let mut only_in_source = Vec::new();
        let mut common = Vec::new();

        for record in source.records() {
            let key = self.policy.key_for(record);
            match index.get_mut(&key).and_then(VecDeque::pop_front) {
                Some(t) => {
                    matched_targets[t] = true;
                    common.push(MatchedPair {
                        source: record.clone(),
                        target: target.records()[t].clone(),
                    });
                }
                None => only_in_source.push(record.clone()),
            }
        }

        let only_in_target: Vec<_> = target
            .records()
            .iter()
            .zip(&matched_targets)
            .filter(|(_, matched)| !**matched)
            .map(|(record, _)| record.clone())
            .collect();

        debug!(
            source = %source.backend(),
            target = %target.backend(),
            only_in_source = only_in_source.len(),
            only_in_target = only_in_target.len(),
            common = common.len(),
            "Catalogs compared"
        );

        let listing_errors = [source, target]
            .iter()
            .filter(|c| !c.is_complete())
            .map(|c| {
                format!("{} listing is incomplete ({} records captured)", c.backend(), c.len())
            })
            .collect();

        Ok(SyncPlan::new(
            source.backend().clone(),
            target.backend().clone(),
            self.policy,
            only_in_source,
            only_in_target,
            common,
        )
        .with_listing_errors(listing_errors)
        .with_truncation(source.is_truncated(), target.is_truncated()))
    }
}

/// Rejects catalogs that would make the partition meaningless
fn validate(catalog: &Catalog) -> Result<(), ComparisonError> {
    let mut seen = HashSet::with_capacity(catalog.len());
    for record in catalog.records() {
        if record.name().is_empty() {
            return Err(ComparisonError::EmptyName {
                backend: catalog.backend().clone(),
                id: record.id().to_string(),
            });
        }
        if !seen.insert(record.id()) {
            return Err(ComparisonError::DuplicateId {
                backend: catalog.backend().clone(),
                id: record.id().to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use omnidrive_core::domain::{BackendName, FileRecord, SyncDirection};

    use super::*;

    fn catalog(backend: &str, records: Vec<FileRecord>) -> Catalog {
        Catalog::new(BackendName::new(backend).unwrap(), None, records)
    }

    fn names(records: &[FileRecord]) -> Vec<&str> {
        records.iter().map(FileRecord::name).collect()
    }

    #[test]
    fn splits_into_three_sets() {
        let a = catalog(
            "a",
            vec![
                FileRecord::file("a1", "file1.txt", 10),
                FileRecord::file("a2", "file2.txt", 20),
            ],
        );
        let b = catalog(
            "b",
            vec![
                FileRecord::file("b1", "file1.txt", 10),
                FileRecord::file("b2", "file3.txt", 30),
            ],
        );

        let plan = Comparator::default().compare(&a, &b).unwrap();
        assert_eq!(names(plan.only_in_source()), ["file2.txt"]);
        assert_eq!(names(plan.only_in_target()), ["file3.txt"]);
        assert_eq!(plan.common().len(), 1);
        assert_eq!(plan.common()[0].source.id(), "a1");
        assert_eq!(plan.common()[0].target.id(), "b1");
        assert_eq!(plan.source().as_str(), "a");
        assert_eq!(plan.key_policy(), KeyPolicy::NameAndSize);
    }

    #[test]
    fn same_name_different_size_is_not_common() {
        let a = catalog("a", vec![FileRecord::file("1", "README", 0)]);
        let b = catalog("b", vec![FileRecord::file("2", "README", 12)]);

        let plan = Comparator::default().compare(&a, &b).unwrap();
        assert_eq!(plan.only_in_source().len(), 1);
        assert_eq!(plan.only_in_target().len(), 1);
        assert!(plan.common().is_empty());

        let plan = Comparator::new(KeyPolicy::NameOnly).compare(&a, &b).unwrap();
        assert_eq!(plan.common().len(), 1);
    }

    #[test]
    fn name_match_is_case_sensitive() {
        let a = catalog("a", vec![FileRecord::file("1", "Notes.md", 5)]);
        let b = catalog("b", vec![FileRecord::file("2", "notes.md", 5)]);
        let plan = Comparator::default().compare(&a, &b).unwrap();
        assert!(plan.common().is_empty());
    }

    #[test]
    fn folders_match_by_name_only() {
        let a = catalog("a", vec![FileRecord::folder("1", "Photos")]);
        let b = catalog(
            "b",
            vec![FileRecord::file("2", "Photos", 99).with_mime_type("folder")],
        );
        let plan = Comparator::default().compare(&a, &b).unwrap();
        assert_eq!(plan.common().len(), 1);
    }

    #[test]
    fn duplicates_pair_in_order_and_surplus_goes_to_only_side() {
        let a = catalog(
            "a",
            vec![
                FileRecord::file("a1", "dup", 1),
                FileRecord::file("a2", "dup", 1),
                FileRecord::file("a3", "dup", 1),
            ],
        );
        let b = catalog(
            "b",
            vec![FileRecord::file("b1", "dup", 1), FileRecord::file("b2", "dup", 1)],
        );

        let plan = Comparator::default().compare(&a, &b).unwrap();
        let pairs: Vec<(&str, &str)> = plan
            .common()
            .iter()
            .map(|p| (p.source.id(), p.target.id()))
            .collect();
        assert_eq!(pairs, [("a1", "b1"), ("a2", "b2")]);
        assert_eq!(plan.only_in_source().len(), 1);
        assert_eq!(plan.only_in_source()[0].id(), "a3");
        assert!(plan.only_in_target().is_empty());
    }

    #[test]
    fn only_in_target_keeps_target_order() {
        let a = catalog("a", vec![FileRecord::file("a1", "m", 1)]);
        let b = catalog(
            "b",
            vec![
                FileRecord::file("b1", "z", 1),
                FileRecord::file("b2", "m", 1),
                FileRecord::file("b3", "a", 1),
            ],
        );
        let plan = Comparator::default().compare(&a, &b).unwrap();
        assert_eq!(names(plan.only_in_target()), ["z", "a"]);
    }

    #[test]
    fn identical_catalogs_are_all_common() {
        let a = catalog(
            "a",
            vec![
                FileRecord::file("1", "x", 1),
                FileRecord::folder("2", "dir"),
                FileRecord::file("3", "y", 2),
            ],
        );
        let plan = Comparator::default().compare(&a, &a).unwrap();
        assert!(plan.only_in_source().is_empty());
        assert!(plan.only_in_target().is_empty());
        let common: Vec<_> = plan.common_source_records().cloned().collect();
        assert_eq!(common, a.records());
        assert!(plan.is_in_sync());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let a = catalog(
            "a",
            vec![FileRecord::file("1", "x", 1), FileRecord::file("1", "y", 2)],
        );
        let b = catalog("b", vec![]);
        let err = Comparator::default().compare(&a, &b).unwrap_err();
        assert!(matches!(err, ComparisonError::DuplicateId { ref id, .. } if id == "1"));
    }

    #[test]
    fn empty_names_are_rejected() {
        let a = catalog("a", vec![]);
        let b = catalog("b", vec![FileRecord::file("9", "", 1)]);
        let err = Comparator::default().compare(&a, &b).unwrap_err();
        assert!(matches!(err, ComparisonError::EmptyName { .. }));
    }

    #[test]
    fn incomplete_catalog_marks_plan() {
        let a = Catalog::partial(
            BackendName::new("a").unwrap(),
            None,
            vec![FileRecord::file("1", "x", 1)],
        );
        let b = catalog("b", vec![]);
        let plan = Comparator::default().compare(&a, &b).unwrap();
        assert!(plan.is_incomplete());
        assert_eq!(plan.listing_errors().len(), 1);
        assert_eq!(plan.only_in_source().len(), 1);
    }

    #[test]
    fn truncated_catalog_marks_plan() {
        let a = catalog("a", vec![FileRecord::file("1", "x", 1)]);
        let b = catalog("b", vec![FileRecord::file("2", "y", 1)]).with_truncated(true);
        let plan = Comparator::default().compare(&a, &b).unwrap();
        assert!(plan.is_truncated());
        assert!(!plan.is_incomplete());
        assert!(plan.is_destination_truncated(SyncDirection::SourceToTarget));
        assert!(!plan.is_destination_truncated(SyncDirection::TargetToSource));
    }
}
