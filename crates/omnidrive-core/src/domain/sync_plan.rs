//! SyncPlan: the result of comparing two catalogs
//!
//! ## Identity key
//!
//! Backends do not expose content checksums uniformly, so two records are
//! treated as the same file when their `name` matches exactly
//! (case-sensitive) and their `size` matches exactly. This is a weak
//! heuristic:
//!
//! - a renamed but byte-identical file is reported on both "only in" sides;
//! - two unrelated files that share a name and size (e.g. two empty
//!   `README`s) are reported as common.
//!
//! Folders are keyed by name only. [`KeyPolicy::NameOnly`] keys files by
//! name as well, which reproduces the older CLI behaviour.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::file_record::FileRecord;
use super::newtypes::BackendName;

// ============================================================================
// Keys
// ============================================================================

/// Key function used to match records across two catalogs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    /// Files match on `(name, size)`, folders on `name`
    #[default]
    NameAndSize,
    /// Every record matches on `name` only
    NameOnly,
}

impl KeyPolicy {
    /// Computes the matching key of `record` under this policy
    pub fn key_for(&self, record: &FileRecord) -> RecordKey {
        let size = match self {
            KeyPolicy::NameAndSize if !record.is_folder() => Some(record.size()),
            _ => None,
        };
        RecordKey {
            name: record.name().to_string(),
            size,
        }
    }

    /// Parses the configuration spelling (`name_and_size` / `name_only`)
    pub fn from_config_str(s: &str) -> Option<Self> {
        match s {
            "name_and_size" => Some(KeyPolicy::NameAndSize),
            "name_only" => Some(KeyPolicy::NameOnly),
            _ => None,
        }
    }
}

impl fmt::Display for KeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPolicy::NameAndSize => write!(f, "name_and_size"),
            KeyPolicy::NameOnly => write!(f, "name_only"),
        }
    }
}

/// Cross-backend matching key; `size` is absent for folders and under `NameOnly`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub name: String,
    pub size: Option<u64>,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.size {
            Some(size) => write!(f, "{} ({} bytes)", self.name, size),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A source record and the target record it was matched with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub source: FileRecord,
    pub target: FileRecord,
}

// ============================================================================
// Direction / mode
// ============================================================================

/// Which "only in" set a sync acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Copy `only_in_source` records into the target backend
    #[default]
    SourceToTarget,
    /// Copy `only_in_target` records into the source backend
    TargetToSource,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::SourceToTarget => write!(f, "source_to_target"),
            SyncDirection::TargetToSource => write!(f, "target_to_source"),
        }
    }
}

/// Whether a sync performs transfers or only previews them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    DryRun,
    Live,
}

impl SyncMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            SyncMode::DryRun
        } else {
            SyncMode::Live
        }
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, SyncMode::DryRun)
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::DryRun => write!(f, "dry_run"),
            SyncMode::Live => write!(f, "live"),
        }
    }
}

// ============================================================================
// SyncPlan
// ============================================================================

/// Three disjoint record sets computed from a pair of catalogs
///
/// Plans are created per comparison and never persisted. A plan computed
/// from an incomplete catalog carries the listing errors and is refused by
/// the executor. A catalog cut short by a listing limit is recorded as
/// truncated; the executor refuses to write into a backend whose catalog
/// was truncated, since records past the limit would look missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPlan {
    source: BackendName,
    target: BackendName,
    key_policy: KeyPolicy,
    only_in_source: Vec<FileRecord>,
    only_in_target: Vec<FileRecord>,
    common: Vec<MatchedPair>,
    #[serde(default)]
    incomplete: bool,
    #[serde(default)]
    listing_errors: Vec<String>,
    #[serde(default)]
    source_truncated: bool,
    #[serde(default)]
    target_truncated: bool,
}

impl SyncPlan {
    pub fn new(
        source: BackendName,
        target: BackendName,
        key_policy: KeyPolicy,
        only_in_source: Vec<FileRecord>,
        only_in_target: Vec<FileRecord>,
        common: Vec<MatchedPair>,
    ) -> Self {
        Self {
            source,
            target,
            key_policy,
            only_in_source,
            only_in_target,
            common,
            incomplete: false,
            listing_errors: Vec::new(),
            source_truncated: false,
            target_truncated: false,
        }
    }

    /// Records which catalogs stopped at a listing limit
    #[must_use]
    pub fn with_truncation(mut self, source: bool, target: bool) -> Self {
        self.source_truncated = source;
        self.target_truncated = target;
        self
    }

    /// Marks the plan as computed from partial listings
    #[must_use]
    pub fn with_listing_errors(mut self, errors: Vec<String>) -> Self {
        if !errors.is_empty() {
            self.incomplete = true;
            self.listing_errors.extend(errors);
        }
        self
    }

    pub fn source(&self) -> &BackendName {
        &self.source
    }

    pub fn target(&self) -> &BackendName {
        &self.target
    }

    pub fn key_policy(&self) -> KeyPolicy {
        self.key_policy
    }

    pub fn only_in_source(&self) -> &[FileRecord] {
        &self.only_in_source
    }

    pub fn only_in_target(&self) -> &[FileRecord] {
        &self.only_in_target
    }

    pub fn common(&self) -> &[MatchedPair] {
        &self.common
    }

    /// Source-side records of the matched pairs, in source order
    pub fn common_source_records(&self) -> impl Iterator<Item = &FileRecord> {
        self.common.iter().map(|pair| &pair.source)
    }

    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    pub fn listing_errors(&self) -> &[String] {
        &self.listing_errors
    }

    /// Returns true if either catalog stopped at a listing limit
    pub fn is_truncated(&self) -> bool {
        self.source_truncated || self.target_truncated
    }

    /// Backends whose catalogs stopped at a listing limit
    pub fn truncated_backends(&self) -> Vec<&BackendName> {
        let mut backends = Vec::new();
        if self.source_truncated {
            backends.push(&self.source);
        }
        if self.target_truncated {
            backends.push(&self.target);
        }
        backends
    }

    /// Returns true if the backend written to in `direction` was listed only in part
    pub fn is_destination_truncated(&self, direction: SyncDirection) -> bool {
        match direction {
            SyncDirection::SourceToTarget => self.target_truncated,
            SyncDirection::TargetToSource => self.source_truncated,
        }
    }

    /// Returns `(from, to, records)` for a sync in `direction`
    pub fn transfer_set(
        &self,
        direction: SyncDirection,
    ) -> (&BackendName, &BackendName, &[FileRecord]) {
        match direction {
            SyncDirection::SourceToTarget => (&self.source, &self.target, &self.only_in_source),
            SyncDirection::TargetToSource => (&self.target, &self.source, &self.only_in_target),
        }
    }

    /// Returns true if both sides already hold the same key set
    pub fn is_in_sync(&self) -> bool {
        self.only_in_source.is_empty() && self.only_in_target.is_empty()
    }
}
