//! Baseline snapshot and drift report types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::convergence::ManualIssue;
use crate::issue::Issue;

/// One audited file as it was at capture time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub size: u64,
    /// Whole-file SHA-256.
    pub hash: String,
}

/// An issue reduced to the fields that are stable across line renumbering.
///
/// Field order makes the derived `Ord` sort by `(code, path, expected, actual)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IssueTuple {
    pub code: String,
    pub path: String,
    pub expected: String,
    pub actual: String,
}

impl IssueTuple {
    pub fn from_issue(issue: &Issue, max_len: usize) -> Self {
        let bounded = issue.bounded(max_len);
        Self {
            code: bounded.code.as_str().to_string(),
            path: bounded.path,
            expected: bounded.expected,
            actual: bounded.actual,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub schema_version: u32,
    pub captured_at: String,
    pub captured_by: String,
    pub tool_version: String,
    pub target: String,
    pub ok: bool,
    pub manual_issues_accepted: bool,
    pub issues_by_code: BTreeMap<String, usize>,
    /// SHA-256 of the canonical JSON of `manifest`.
    pub baseline_fingerprint: String,
    pub manifest: Vec<ManifestEntry>,
    pub issue_tuples: Vec<IssueTuple>,
    pub manual_issues: Vec<ManualIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub schema_version: u32,
    pub baseline_fingerprint: String,
    pub current_fingerprint: String,
    pub fingerprint_changed: bool,
    /// True iff the issue tuple sets differ.
    pub drifted: bool,
    pub new_issues: Vec<IssueTuple>,
    pub resolved_issues: Vec<IssueTuple>,
    pub new_manual_required_count: usize,
    pub notes: Vec<String>,
}
