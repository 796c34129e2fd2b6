//! Repair plan and apply-result documents.
//!
//! A `RepairPlan` is produced by the planner from one verifier run and never
//! mutates anything.  An `ApplyResult` is what the executor records after
//! acting on the safe part of a plan.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::issue::{Issue, IssueCode};

/// Version stamped into every plan, result, and report document.
pub const SCHEMA_VERSION: u32 = 1;

/// What a repair proposes to do with its files.
///
/// Declared in name order so the derived `Ord` matches the wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairAction {
    /// A human has to decide; the executor never touches these files.
    ManualRequired,
    /// Recompute every `prev_hash` and `rolling_hash` in file order.
    RebuildChain,
}

impl RepairAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairAction::RebuildChain => "rebuild_chain",
            RepairAction::ManualRequired => "manual_required",
        }
    }
}

impl fmt::Display for RepairAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One proposed repair, covering one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repair {
    pub repair_id: String,
    pub action: RepairAction,
    pub paths: Vec<String>,
    /// Distinct issue codes found in the file, sorted by name.
    pub reason_codes: Vec<IssueCode>,
    /// True iff every reason code is auto-repairable.
    pub safe: bool,
}

/// The planner's output for one target directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairPlan {
    pub schema_version: u32,
    /// The only field allowed to differ between two plans of unchanged input.
    pub generated_at: String,
    pub target: String,
    pub ok_to_apply: bool,
    /// The full issue list of the verifier run, in canonical order.
    pub issues: Vec<Issue>,
    pub repairs: Vec<Repair>,
}

impl RepairPlan {
    pub fn safe_repairs(&self) -> impl Iterator<Item = &Repair> {
        self.repairs.iter().filter(|r| r.safe)
    }

    pub fn manual_repairs(&self) -> impl Iterator<Item = &Repair> {
        self.repairs.iter().filter(|r| !r.safe)
    }
}

/// A file the executor rewrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRepair {
    pub path: String,
    pub action: RepairAction,
    pub repair_id: String,
    /// Number of entries whose chain fields were rewritten.
    pub fixed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyClean,
    UnsafeManualRequired,
    /// The file changed since planning and now carries issues a rebuild
    /// must not touch.
    StalePlan,
}

/// A file or repair the executor deliberately left alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRepair {
    pub repair_id: String,
    pub paths: Vec<String>,
    pub reason: SkipReason,
}

/// A per-file failure caught by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyFailure {
    pub path: String,
    pub error: String,
}

/// Where the pre-repair bytes of a rewritten file were preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub original_path: String,
    pub quarantine_path: String,
    pub reason_codes: Vec<IssueCode>,
    pub hash_before: String,
    pub hash_after: String,
    pub repair_id: String,
}

/// Everything the executor did for one plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub schema_version: u32,
    pub applied: Vec<AppliedRepair>,
    pub skipped: Vec<SkippedRepair>,
    pub errors: Vec<ApplyFailure>,
    /// Whole-file SHA-256 per path before the repair.
    pub before_hashes: BTreeMap<String, String>,
    /// Whole-file SHA-256 per path after the repair.
    pub after_hashes: BTreeMap<String, String>,
    #[serde(default)]
    pub quarantine_paths: Vec<QuarantineRecord>,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            ..Self::default()
        }
    }
}
