//! # auditchain-converge
//!
//! Fixpoint-driven repair and long-term drift tracking.
//!
//! - [`Orchestrator`] repeats Plan → Apply → Verify until the target is
//!   clean, nothing more can be applied, or the iteration budget runs out,
//!   then reports the repairs that still need a human.
//! - [`capture_baseline`] snapshots an accepted state; [`detect_drift`]
//!   reports issues that appeared or disappeared since.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use auditchain_converge::{capture_baseline, detect_drift, Orchestrator};
//! use auditchain_repair::Authorization;
//!
//! let report = Orchestrator::new(&config).run("logs".as_ref(), 5, Authorization::Granted)?;
//! capture_baseline(&config, "logs".as_ref(), true, &config.baseline_path())?;
//! let drift = detect_drift(
//!     &config,
//!     "logs".as_ref(),
//!     &config.baseline_path(),
//!     &config.drift_report_path(),
//!     1,
//! )?;
//! ```

pub mod baseline;
pub mod orchestrator;

pub use baseline::{build_manifest, capture_baseline, detect_drift, fingerprint, issue_tuples};
pub use orchestrator::{manual_issues, write_report, Orchestrator};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use serde_json::{json, Map, Value};
    use tempfile::TempDir;

    use auditchain_chain::{file_sha256, FileChainWriter, ReceiptLedger};
    use auditchain_contracts::{
        convergence::{ConvergenceReport, StopReason},
        AuditConfig, AuditError, IssueCode,
    };
    use auditchain_repair::Authorization;

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    struct Fixture {
        _dir: TempDir,
        logs: PathBuf,
        config: AuditConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let logs = dir.path().join("logs");
            fs::create_dir_all(&logs).unwrap();
            let config = AuditConfig::with_state_dir(dir.path().join("state"));
            Self {
                _dir: dir,
                logs,
                config,
            }
        }

        fn converge(&self, max_iterations: usize, apply: Authorization) -> ConvergenceReport {
            Orchestrator::new(&self.config)
                .run(&self.logs, max_iterations, apply)
                .unwrap()
        }
    }

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    fn write_log(dir: &Path, name: &str, timestamps: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut writer = FileChainWriter::open(&path).unwrap();
        for (n, ts) in timestamps.iter().enumerate() {
            writer.append_entry(ts, obj(json!({"n": n}))).unwrap();
        }
        path
    }

    fn clean_log(dir: &Path, name: &str) -> PathBuf {
        write_log(
            dir,
            name,
            &["2025-01-01T00:00:01Z", "2025-01-01T00:00:02Z", "2025-01-01T00:00:03Z"],
        )
    }

    /// Internally consistent chain whose last entry moves back in time.
    fn out_of_order_log(dir: &Path, name: &str) -> PathBuf {
        write_log(
            dir,
            name,
            &["2025-01-01T00:00:01Z", "2025-01-01T00:00:03Z", "2025-01-01T00:00:02Z"],
        )
    }

    fn corrupt_prev(path: &Path) {
        let text = fs::read_to_string(path).unwrap();
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        let mut entry: Map<String, Value> = serde_json::from_str(&lines[1]).unwrap();
        entry.insert("prev_hash".to_string(), json!("f".repeat(64)));
        lines[1] = serde_json::to_string(&entry).unwrap();
        fs::write(path, format!("{}\n", lines.join("\n"))).unwrap();
    }

    fn drop_last_line(path: &Path) {
        let text = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        fs::write(path, format!("{}\n", lines[..lines.len() - 1].join("\n"))).unwrap();
    }

    // ── Convergence ───────────────────────────────────────────────────────────

    #[test]
    fn clean_target_stops_clean_on_first_iteration() {
        let fx = Fixture::new();
        clean_log(&fx.logs, "a.jsonl");

        let report = fx.converge(5, Authorization::Granted);

        assert_eq!(report.iterations.len(), 1);
        assert_eq!(report.iterations[0].stopped_reason, Some(StopReason::Clean));
        assert_eq!(report.applied_repairs, 0);
        assert!(report.ok);
        assert!(report.no_safe_repairs_remaining);
    }

    #[test]
    fn safe_corruption_converges_and_is_recorded() {
        let fx = Fixture::new();
        corrupt_prev(&clean_log(&fx.logs, "a.jsonl"));

        let report = fx.converge(5, Authorization::Granted);

        assert_eq!(report.iterations.len(), 1);
        assert_eq!(report.iterations[0].iteration, "iter_01");
        assert_eq!(report.iterations[0].applied_count, 1);
        assert_eq!(report.iterations[0].stopped_reason, Some(StopReason::Clean));
        assert_eq!(report.counts_before.issues_total, 2);
        assert_eq!(report.counts_after.issues_total, 0);
        assert_eq!(report.applied_repairs, 1);
        assert_eq!(report.quarantine_paths.len(), 1);
        assert!(report.ok);

        let iter_dir = fx.config.iterations_dir();
        assert!(iter_dir.join("iter_01_plan.json").exists());
        assert!(iter_dir.join("iter_01_result.json").exists());
        let ledger = ReceiptLedger::new(fx.config.receipts_path());
        // One plan and one result receipt; the closing plan is not receipted.
        assert_eq!(ledger.read_all().unwrap().len(), 2);
        assert_eq!(ledger.verify().unwrap(), None);
    }

    #[test]
    fn manual_only_target_stops_when_nothing_applies() {
        let fx = Fixture::new();
        out_of_order_log(&fx.logs, "a.jsonl");

        let report = fx.converge(5, Authorization::Granted);

        assert_eq!(report.iterations.len(), 1);
        assert_eq!(
            report.iterations[0].stopped_reason,
            Some(StopReason::NoChangesApplied)
        );
        assert!(!report.ok);
        assert_eq!(report.remaining_manual_issues.len(), 1);
        assert_eq!(
            report.remaining_manual_issues[0].reason_codes,
            vec![IssueCode::TimestampOrderViolation]
        );
        assert!(report.no_safe_repairs_remaining);
    }

    #[test]
    fn mixed_target_repairs_safe_files_then_stops() {
        let fx = Fixture::new();
        corrupt_prev(&clean_log(&fx.logs, "a.jsonl"));
        let manual = out_of_order_log(&fx.logs, "b.jsonl");
        let manual_before = file_sha256(&manual).unwrap();

        let report = fx.converge(5, Authorization::Granted);

        assert_eq!(report.iterations.len(), 2);
        assert_eq!(report.iterations[0].applied_count, 1);
        assert_eq!(report.iterations[0].stopped_reason, None);
        assert_eq!(
            report.iterations[1].stopped_reason,
            Some(StopReason::NoChangesApplied)
        );
        assert_eq!(file_sha256(&manual).unwrap(), manual_before);
        assert!(!report.ok);
        assert_eq!(report.remaining_manual_issues.len(), 1);
    }

    /// Termination: never more iterations than the budget, and never `ok`
    /// with manual issues outstanding.
    #[test]
    fn budget_bounds_iterations() {
        for budget in 0..3 {
            let fx = Fixture::new();
            corrupt_prev(&clean_log(&fx.logs, "a.jsonl"));
            out_of_order_log(&fx.logs, "b.jsonl");

            let report = fx.converge(budget, Authorization::Granted);

            assert!(report.iterations.len() <= budget);
            assert_eq!(report.max_iterations, budget);
            assert!(!(report.ok && !report.remaining_manual_issues.is_empty()));
        }
    }

    #[test]
    fn exhausted_budget_leaves_no_stop_reason() {
        let fx = Fixture::new();
        corrupt_prev(&clean_log(&fx.logs, "a.jsonl"));
        out_of_order_log(&fx.logs, "b.jsonl");

        let report = fx.converge(1, Authorization::Granted);

        assert_eq!(report.iterations.len(), 1);
        assert_eq!(report.iterations[0].stopped_reason, None);
    }

    #[test]
    fn plan_only_mode_never_mutates() {
        let fx = Fixture::new();
        let path = clean_log(&fx.logs, "a.jsonl");
        corrupt_prev(&path);
        let before = file_sha256(&path).unwrap();

        let report = fx.converge(5, Authorization::Denied);

        assert_eq!(report.iterations.len(), 1);
        assert_eq!(
            report.iterations[0].stopped_reason,
            Some(StopReason::NoApplyMode)
        );
        assert_eq!(report.iterations[0].result_path, None);
        assert_eq!(file_sha256(&path).unwrap(), before);
        assert_eq!(report.counts_after, report.counts_before);
        assert!(!report.ok);
        assert!(!report.no_safe_repairs_remaining);
    }

    #[test]
    fn remaining_manual_issues_are_sorted_and_capped() {
        let mut fx = Fixture::new();
        fx.config.max_manual_issues = 2;
        for name in ["a.jsonl", "b.jsonl", "c.jsonl"] {
            out_of_order_log(&fx.logs, name);
        }

        let report = fx.converge(1, Authorization::Denied);

        assert_eq!(report.remaining_manual_issues.len(), 2);
        let ids: Vec<&str> = report
            .remaining_manual_issues
            .iter()
            .map(|m| m.repair_id.as_str())
            .collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn report_is_written_as_json() {
        let fx = Fixture::new();
        clean_log(&fx.logs, "a.jsonl");
        let report = fx.converge(1, Authorization::Granted);

        write_report(&report, &fx.config.convergence_report_path()).unwrap();

        let text = fs::read_to_string(fx.config.convergence_report_path()).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["ok"], json!(true));
        assert_eq!(value["iterations"][0]["stopped_reason"], json!("clean"));
    }

    // ── Baseline ──────────────────────────────────────────────────────────────

    #[test]
    fn clean_target_baseline_is_captured() {
        let fx = Fixture::new();
        clean_log(&fx.logs, "a.jsonl");
        clean_log(&fx.logs, "b.jsonl");
        let output = fx.config.baseline_path();

        let baseline = capture_baseline(&fx.config, &fx.logs, false, &output).unwrap();

        assert!(baseline.ok);
        assert!(!baseline.manual_issues_accepted);
        assert_eq!(baseline.manifest.len(), 2);
        assert!(baseline.manifest[0].path < baseline.manifest[1].path);
        assert_eq!(baseline.baseline_fingerprint.len(), 64);
        assert!(baseline.issue_tuples.is_empty());
        assert!(baseline.target.ends_with('/'));
        assert!(output.exists());
    }

    #[test]
    fn baseline_fingerprint_is_stable() {
        let fx = Fixture::new();
        clean_log(&fx.logs, "a.jsonl");
        let output = fx.config.baseline_path();

        let first = capture_baseline(&fx.config, &fx.logs, false, &output).unwrap();
        let second = capture_baseline(&fx.config, &fx.logs, false, &output).unwrap();

        assert_eq!(first.baseline_fingerprint, second.baseline_fingerprint);
        assert_eq!(first.manifest, second.manifest);
    }

    #[test]
    fn manual_only_baseline_needs_acceptance() {
        let fx = Fixture::new();
        out_of_order_log(&fx.logs, "a.jsonl");
        let output = fx.config.baseline_path();

        let err = capture_baseline(&fx.config, &fx.logs, false, &output).unwrap_err();
        assert!(matches!(err, AuditError::BaselineRefused { .. }));
        assert!(!output.exists());

        let baseline = capture_baseline(&fx.config, &fx.logs, true, &output).unwrap();
        assert!(!baseline.ok);
        assert!(baseline.manual_issues_accepted);
        assert_eq!(baseline.manual_issues.len(), 1);
        assert_eq!(baseline.issues_by_code.get("timestamp_order_violation"), Some(&1));
        assert_eq!(baseline.issue_tuples.len(), 1);
    }

    #[test]
    fn baseline_refused_while_safe_repairs_remain() {
        let fx = Fixture::new();
        corrupt_prev(&clean_log(&fx.logs, "a.jsonl"));
        out_of_order_log(&fx.logs, "b.jsonl");

        let err = capture_baseline(&fx.config, &fx.logs, true, &fx.config.baseline_path())
            .unwrap_err();

        assert!(matches!(err, AuditError::BaselineRefused { .. }));
    }

    // ── Drift ─────────────────────────────────────────────────────────────────

    #[test]
    fn unchanged_target_reports_no_drift() {
        let fx = Fixture::new();
        clean_log(&fx.logs, "a.jsonl");
        let baseline_path = fx.config.baseline_path();
        capture_baseline(&fx.config, &fx.logs, false, &baseline_path).unwrap();

        let report = detect_drift(
            &fx.config,
            &fx.logs,
            &baseline_path,
            &fx.config.drift_report_path(),
            1,
        )
        .unwrap();

        assert!(!report.drifted);
        assert!(!report.fingerprint_changed);
        assert_eq!(report.new_manual_required_count, 0);
        assert_eq!(report.notes.len(), 2);
        assert!(fx.config.convergence_report_path().exists());
        assert!(fx.config.drift_report_path().exists());
    }

    /// Deleting the offending last line of an accepted dirty file resolves
    /// its issue.
    #[test]
    fn deleting_offending_line_resolves_its_issue() {
        let fx = Fixture::new();
        let path = out_of_order_log(&fx.logs, "a.jsonl");
        let baseline_path = fx.config.baseline_path();
        let baseline = capture_baseline(&fx.config, &fx.logs, true, &baseline_path).unwrap();
        let accepted = baseline.issue_tuples[0].clone();

        drop_last_line(&path);
        let report = detect_drift(
            &fx.config,
            &fx.logs,
            &baseline_path,
            &fx.config.drift_report_path(),
            1,
        )
        .unwrap();

        assert!(report.drifted);
        assert!(report.fingerprint_changed);
        assert_eq!(report.resolved_issues, vec![accepted]);
        assert!(report.new_issues.is_empty());
    }

    #[test]
    fn new_manual_issue_counts_as_growth() {
        let fx = Fixture::new();
        clean_log(&fx.logs, "a.jsonl");
        let baseline_path = fx.config.baseline_path();
        capture_baseline(&fx.config, &fx.logs, false, &baseline_path).unwrap();

        out_of_order_log(&fx.logs, "b.jsonl");
        let report = detect_drift(
            &fx.config,
            &fx.logs,
            &baseline_path,
            &fx.config.drift_report_path(),
            1,
        )
        .unwrap();

        assert!(report.drifted);
        assert_eq!(report.new_issues.len(), 1);
        assert_eq!(report.new_issues[0].code, "timestamp_order_violation");
        assert_eq!(report.new_manual_required_count, 1);
    }

    #[test]
    fn drift_against_missing_baseline_fails() {
        let fx = Fixture::new();
        clean_log(&fx.logs, "a.jsonl");

        let err = detect_drift(
            &fx.config,
            &fx.logs,
            &fx.config.baseline_path(),
            &fx.config.drift_report_path(),
            1,
        )
        .unwrap_err();

        assert!(matches!(err, AuditError::Io { .. }));
    }
}
