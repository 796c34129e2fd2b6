//! Verification issue types and the result of one verifier run.
//!
//! An `Issue` is a pure value: two issues with the same fields are the same
//! issue.  Every persisted issue list is sorted by
//! `(path, code, details, expected, actual)` so reports are reproducible
//! byte for byte.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed set of deviations the verifier can report.
///
/// Variants are declared in name order so the derived `Ord` sorts codes the
/// same way their serialized names sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    ChainPrevMismatch,
    GenesisMarkerMismatch,
    HashMismatch,
    MalformedJson,
    MissingField,
    NotAnObject,
    TimestampOrderViolation,
}

impl IssueCode {
    /// Codes a `rebuild_chain` repair can fix without human judgment.
    pub const AUTO_REPAIRABLE: [IssueCode; 3] = [
        IssueCode::HashMismatch,
        IssueCode::ChainPrevMismatch,
        IssueCode::GenesisMarkerMismatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::HashMismatch => "hash_mismatch",
            IssueCode::ChainPrevMismatch => "chain_prev_mismatch",
            IssueCode::GenesisMarkerMismatch => "genesis_marker_mismatch",
            IssueCode::MalformedJson => "malformed_json",
            IssueCode::MissingField => "missing_field",
            IssueCode::TimestampOrderViolation => "timestamp_order_violation",
            IssueCode::NotAnObject => "not_an_object",
        }
    }

    pub fn is_auto_repairable(&self) -> bool {
        Self::AUTO_REPAIRABLE.contains(self)
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One deviation found in one log file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Issue {
    pub code: IssueCode,
    pub path: String,
    /// Location and short description, e.g. `"line 2: prev hash mismatch"`.
    pub details: String,
    pub expected: String,
    pub actual: String,
}

impl Issue {
    /// The canonical ordering key.
    pub fn sort_key(&self) -> (&str, &str, &str, &str, &str) {
        (
            self.path.as_str(),
            self.code.as_str(),
            self.details.as_str(),
            self.expected.as_str(),
            self.actual.as_str(),
        )
    }

    /// Return a copy whose text fields are cut to `max_len` characters.
    pub fn bounded(&self, max_len: usize) -> Issue {
        Issue {
            code: self.code,
            path: bounded_text(&self.path, max_len),
            details: bounded_text(&self.details, max_len),
            expected: bounded_text(&self.expected, max_len),
            actual: bounded_text(&self.actual, max_len),
        }
    }
}

/// Sort issues into canonical order in place.
pub fn sort_issues(issues: &mut [Issue]) {
    issues.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

/// Truncate `value` to at most `max_len` characters (not bytes).
pub fn bounded_text(value: &str, max_len: usize) -> String {
    value.chars().take(max_len).collect()
}

/// Flags controlling side effects of a verifier run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Copy unrecoverable raw lines into a sibling `*.bad` file.
    pub quarantine: bool,
    /// Attempt the narrow single-line salvage on malformed lines.
    pub repair: bool,
}

/// Line-level counters accumulated across all files of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyStats {
    pub files: usize,
    pub valid_files: usize,
    pub lines: usize,
    pub void_entries: usize,
    /// Malformed lines recovered by salvage.
    pub fixed: usize,
    /// Unrecoverable lines copied (or, without quarantine, eligible to be
    /// copied) to `*.bad`.
    pub quarantined: usize,
    /// Malformed lines salvage could not recover.
    pub unrecoverable: usize,
}

/// The complete outcome of verifying a set of files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifyRun {
    /// Issues per file, keyed by path.  Every verified file has an entry,
    /// clean files map to an empty list.
    pub issues_by_path: BTreeMap<String, Vec<Issue>>,
    /// Files that could not be read at all, with the reason.
    pub errors: BTreeMap<String, String>,
    pub percent_valid: f64,
    pub stats: VerifyStats,
}

impl VerifyRun {
    /// True when no file produced an issue and none failed to read.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.issues_by_path.values().all(Vec::is_empty)
    }

    /// Every issue of the run in canonical order.
    pub fn sorted_issues(&self) -> Vec<Issue> {
        let mut all: Vec<Issue> = self.issues_by_path.values().flatten().cloned().collect();
        sort_issues(&mut all);
        all
    }

    pub fn issues_total(&self) -> usize {
        self.issues_by_path.values().map(Vec::len).sum()
    }

    /// Issue counts keyed by code name, in code-name order.
    pub fn issues_per_code(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for issue in self.issues_by_path.values().flatten() {
            *counts.entry(issue.code.as_str().to_string()).or_insert(0) += 1;
        }
        counts
    }
}
