//! Toolkit configuration.
//!
//! An `AuditConfig` is deserialized from TOML and threaded explicitly into
//! every operation; nothing in the toolkit reads a process-wide path.
//! Every key has a default, so an empty document is a valid configuration.
//!
//! Example:
//! ```toml
//! state_dir = "glow/audits"
//! max_issues = 20
//! max_manual_issues = 50
//! default_max_iterations = 5
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AuditError, AuditResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Root directory for plans, results, receipts, reports and baselines.
    pub state_dir: PathBuf,

    /// Extensions eligible for log discovery.  Files without an extension
    /// are always eligible.
    pub log_extensions: Vec<String>,

    /// Maximum number of issues serialized into the verify result document.
    pub max_issues: usize,

    /// Issue text fields are truncated to this many characters when persisted.
    pub max_issue_length: usize,

    /// Cap on `remaining_manual_issues` in a convergence report.
    pub max_manual_issues: usize,

    /// Convergence iteration budget when the caller does not pass one.
    pub default_max_iterations: usize,

    /// Copy the original bytes of every file the executor rewrites into
    /// `quarantine_dir()`.
    pub preserve_originals: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("glow/audits"),
            log_extensions: vec!["jsonl".to_string(), "json".to_string(), "log".to_string()],
            max_issues: 20,
            max_issue_length: 200,
            max_manual_issues: 50,
            default_max_iterations: 5,
            preserve_originals: true,
        }
    }
}

impl AuditConfig {
    /// Parse `s` as TOML.
    ///
    /// Returns `AuditError::ConfigError` if the document is malformed,
    /// carries unknown keys, or sets `max_issues`, `max_issue_length` or
    /// `max_manual_issues` to zero.
    pub fn from_toml_str(s: &str) -> AuditResult<Self> {
        let config: AuditConfig = toml::from_str(s).map_err(|e| AuditError::ConfigError {
            reason: format!("failed to parse config TOML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the file at `path` and parse it as TOML configuration.
    pub fn from_file(path: &Path) -> AuditResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| AuditError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// A default configuration rooted at `state_dir`.
    pub fn with_state_dir(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            ..Self::default()
        }
    }

    fn validate(&self) -> AuditResult<()> {
        for (key, value) in [
            ("max_issues", self.max_issues),
            ("max_issue_length", self.max_issue_length),
            ("max_manual_issues", self.max_manual_issues),
        ] {
            if value == 0 {
                return Err(AuditError::ConfigError {
                    reason: format!("{key} must be greater than zero"),
                });
            }
        }
        if self.state_dir.as_os_str().is_empty() {
            return Err(AuditError::ConfigError {
                reason: "state_dir must not be empty".to_string(),
            });
        }
        Ok(())
    }

    // ── Well-known artifact paths ─────────────────────────────────────────────

    pub fn verify_result_path(&self) -> PathBuf {
        self.state_dir.join("verify_audits_result.json")
    }

    pub fn plan_path(&self) -> PathBuf {
        self.state_dir.join("audit_repair_plan.json")
    }

    pub fn apply_result_path(&self) -> PathBuf {
        self.state_dir.join("audit_repair_result.json")
    }

    pub fn receipts_path(&self) -> PathBuf {
        self.state_dir.join("repairs").join("repair_receipts.jsonl")
    }

    pub fn iterations_dir(&self) -> PathBuf {
        self.state_dir.join("convergence")
    }

    pub fn convergence_report_path(&self) -> PathBuf {
        self.state_dir.join("audit_convergence_report.json")
    }

    pub fn baseline_path(&self) -> PathBuf {
        self.state_dir.join("baseline").join("audit_baseline.json")
    }

    pub fn drift_report_path(&self) -> PathBuf {
        self.state_dir.join("audit_drift_report.json")
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.state_dir.join("quarantine")
    }
}
