//! The verify result document persisted after every verifier run.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use auditchain_chain::{fsio::write_json, utc_now};
use auditchain_contracts::{
    AuditConfig, AuditResult, Issue, VerifyRun, VerifyStats, SCHEMA_VERSION,
};

/// Name recorded in the `tool` field.
pub const VERIFY_TOOL: &str = "verify_audits";

/// `verify_audits_result.json`.
///
/// `structured_issues` holds at most `max_issues` entries in canonical
/// order; `issues_total` always counts all of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResultDoc {
    pub schema_version: u32,
    pub timestamp: String,
    pub tool: String,
    pub ok: bool,
    pub percent_valid: f64,
    pub issues_total: usize,
    pub issues_per_code: BTreeMap<String, usize>,
    pub structured_issues: Vec<Issue>,
    pub stats: VerifyStats,
    /// Files that could not be read, with the reason.
    pub file_errors: BTreeMap<String, String>,
    /// Set when the run itself failed (for example a missing target).
    pub error: Option<String>,
}

impl VerifyResultDoc {
    /// Summarise a completed run.
    pub fn from_run(run: &VerifyRun, config: &AuditConfig) -> Self {
        let structured_issues = run
            .sorted_issues()
            .into_iter()
            .take(config.max_issues)
            .map(|issue| issue.bounded(config.max_issue_length))
            .collect();
        Self {
            schema_version: SCHEMA_VERSION,
            timestamp: utc_now(),
            tool: VERIFY_TOOL.to_string(),
            ok: run.is_clean(),
            percent_valid: run.percent_valid,
            issues_total: run.issues_total(),
            issues_per_code: run.issues_per_code(),
            structured_issues,
            stats: run.stats.clone(),
            file_errors: run.errors.clone(),
            error: None,
        }
    }

    /// A document for a run that could not complete.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            timestamp: utc_now(),
            tool: VERIFY_TOOL.to_string(),
            ok: false,
            percent_valid: 0.0,
            issues_total: 0,
            issues_per_code: BTreeMap::new(),
            structured_issues: Vec::new(),
            stats: VerifyStats::default(),
            file_errors: BTreeMap::new(),
            error: Some(reason.into()),
        }
    }

    /// Write the document atomically to `path`.
    pub fn persist(&self, path: &Path) -> AuditResult<()> {
        write_json(path, self)?;
        info!(path = %path.display(), ok = self.ok, issues = self.issues_total, "verify result written");
        Ok(())
    }
}
