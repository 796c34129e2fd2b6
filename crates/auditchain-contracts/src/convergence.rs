//! Convergence report types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::issue::IssueCode;
use crate::plan::{QuarantineRecord, RepairAction};

/// Why the orchestrator stopped iterating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Verification reported zero issues.
    Clean,
    /// An apply step changed nothing.
    NoChangesApplied,
    /// The caller asked for planning only.
    NoApplyMode,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Clean => "clean",
            StopReason::NoChangesApplied => "no_changes_applied",
            StopReason::NoApplyMode => "no_apply_mode",
        };
        f.write_str(s)
    }
}

/// One Plan → Apply → Verify pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// `iter_01`, `iter_02`, …
    pub iteration: String,
    pub plan_path: String,
    pub result_path: Option<String>,
    pub applied_count: usize,
    pub stopped_reason: Option<StopReason>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueCounts {
    pub issues_total: usize,
    pub issues_per_code: BTreeMap<String, usize>,
}

/// A repair still waiting for human judgment after convergence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManualIssue {
    pub repair_id: String,
    pub paths: Vec<String>,
    pub reason_codes: Vec<IssueCode>,
    pub action: RepairAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub schema_version: u32,
    pub generated_at: String,
    pub target: String,
    pub max_iterations: usize,
    pub iterations: Vec<IterationRecord>,
    pub counts_before: IssueCounts,
    pub counts_after: IssueCounts,
    pub applied_repairs: usize,
    pub remaining_manual_issues: Vec<ManualIssue>,
    pub quarantine_paths: Vec<QuarantineRecord>,
    pub ok: bool,
    pub no_safe_repairs_remaining: bool,
}
