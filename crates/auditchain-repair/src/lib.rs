//! # auditchain-repair
//!
//! Deterministic repair planning and gated repair execution.
//!
//! ## Overview
//!
//! [`RepairPlanner`] turns a verifier run into a [`RepairPlan`]: one repair
//! per file with issues, `rebuild_chain` when every code on the file is
//! auto-repairable and `manual_required` otherwise.  [`RepairExecutor`]
//! applies only the `rebuild_chain` repairs, atomically, and only when the
//! caller passes [`Authorization::Granted`].
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use auditchain_repair::{artifacts, Authorization, RepairExecutor, RepairPlanner};
//!
//! let planner = RepairPlanner::new(Box::new(ChainVerifier::new(&config)));
//! let plan = planner.build_plan("logs".as_ref())?;
//! let ledger = ReceiptLedger::new(config.receipts_path());
//! artifacts::write_plan(&plan, &config.plan_path(), &ledger)?;
//!
//! let executor = RepairExecutor::new(&config, Box::new(ChainVerifier::new(&config)));
//! let result = executor.apply(&plan, Authorization::Granted)?;
//! artifacts::write_result(&result, &config.apply_result_path(), &ledger)?;
//! ```
//!
//! [`RepairPlan`]: auditchain_contracts::plan::RepairPlan

pub mod artifacts;
pub mod executor;
pub mod planner;
pub mod rebuild;

pub use executor::{Authorization, RepairExecutor};
pub use planner::{plan_from_run, repair_id, RepairPlanner};
pub use rebuild::{rebuild_text, Rebuilt};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use serde_json::{json, Map, Value};
    use tempfile::TempDir;

    use auditchain_chain::{file_sha256, FileChainWriter, ReceiptLedger};
    use auditchain_contracts::{
        plan::{Repair, RepairAction, RepairPlan, SkipReason},
        traits::Verifier,
        AuditConfig, AuditError, IssueCode, VerifyOptions, SCHEMA_VERSION,
    };
    use auditchain_verify::ChainVerifier;

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

        fn planner(&self) -> RepairPlanner {
            RepairPlanner::new(Box::new(ChainVerifier::new(&self.config)))
        }

        fn executor(&self) -> RepairExecutor {
            RepairExecutor::new(&self.config, Box::new(ChainVerifier::new(&self.config)))
        }

        fn is_clean(&self) -> bool {
            ChainVerifier::new(&self.config)
                .verify_dir(&self.logs, VerifyOptions::default())
                .unwrap()
                .is_clean()
        }
    }

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    fn three_line_log(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let mut writer = FileChainWriter::open(&path).unwrap();
        writer
            .append_entry("2025-01-01T00:00:01Z", obj(json!({"a": 1})))
            .unwrap();
        writer
            .append_entry("2025-01-01T00:00:02Z", obj(json!({"b": 2})))
            .unwrap();
        writer
            .append_entry("2025-01-01T00:00:03Z", obj(json!({"c": 3})))
            .unwrap();
        path
    }

    fn edit_line(path: &Path, lineno: usize, edit: impl FnOnce(&mut Map<String, Value>)) {
        let text = fs::read_to_string(path).unwrap();
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        let mut entry: Map<String, Value> = serde_json::from_str(&lines[lineno - 1]).unwrap();
        edit(&mut entry);
        lines[lineno - 1] = serde_json::to_string(&entry).unwrap();
        fs::write(path, format!("{}\n", lines.join("\n"))).unwrap();
    }

    fn corrupt_prev(path: &Path) {
        edit_line(path, 2, |entry| {
            entry.insert("prev_hash".to_string(), json!("f".repeat(64)));
        });
    }

    fn reorder(path: &Path) {
        let text = fs::read_to_string(path).unwrap();
        let mut lines: Vec<&str> = text.lines().collect();
        lines.swap(0, 1);
        fs::write(path, format!("{}\n", lines.join("\n"))).unwrap();
    }

    fn safe_repair_for(path: &Path) -> Repair {
        let key = path.display().to_string();
        Repair {
            repair_id: repair_id(RepairAction::RebuildChain, &key),
            action: RepairAction::RebuildChain,
            paths: vec![key],
            reason_codes: vec![IssueCode::HashMismatch],
            safe: true,
        }
    }

    fn plan_with(repairs: Vec<Repair>) -> RepairPlan {
        RepairPlan {
            schema_version: SCHEMA_VERSION,
            generated_at: "2025-01-01T00:00:00Z".to_string(),
            target: "logs".to_string(),
            ok_to_apply: repairs.iter().any(|r| r.safe),
            issues: Vec::new(),
            repairs,
        }
    }

    // ── Planning ──────────────────────────────────────────────────────────────

    #[test]
    fn clean_target_plans_nothing() {
        let fx = Fixture::new();
        three_line_log(&fx.logs, "a.jsonl");

        let plan = fx.planner().build_plan(&fx.logs).unwrap();

        assert!(plan.repairs.is_empty());
        assert!(plan.issues.is_empty());
        assert!(!plan.ok_to_apply);
    }

    #[test]
    fn chain_only_issues_plan_a_safe_rebuild() {
        let fx = Fixture::new();
        let path = three_line_log(&fx.logs, "a.jsonl");
        corrupt_prev(&path);

        let plan = fx.planner().build_plan(&fx.logs).unwrap();

        assert_eq!(plan.repairs.len(), 1);
        let repair = &plan.repairs[0];
        assert_eq!(repair.action, RepairAction::RebuildChain);
        assert!(repair.safe);
        assert_eq!(
            repair.reason_codes,
            vec![IssueCode::ChainPrevMismatch, IssueCode::HashMismatch]
        );
        assert_eq!(repair.paths, vec![path.display().to_string()]);
        assert!(plan.ok_to_apply);
        assert_eq!(plan.issues.len(), 2);
    }

    #[test]
    fn reordered_file_plans_manual_required() {
        let fx = Fixture::new();
        let path = three_line_log(&fx.logs, "a.jsonl");
        reorder(&path);

        let plan = fx.planner().build_plan(&fx.logs).unwrap();

        assert_eq!(plan.repairs.len(), 1);
        assert_eq!(plan.repairs[0].action, RepairAction::ManualRequired);
        assert!(!plan.repairs[0].safe);
        assert!(plan.repairs[0]
            .reason_codes
            .contains(&IssueCode::TimestampOrderViolation));
        assert!(!plan.ok_to_apply);
    }

    #[test]
    fn planning_is_deterministic() {
        let fx = Fixture::new();
        corrupt_prev(&three_line_log(&fx.logs, "a.jsonl"));
        reorder(&three_line_log(&fx.logs, "b.jsonl"));

        let mut first = fx.planner().build_plan(&fx.logs).unwrap();
        let mut second = fx.planner().build_plan(&fx.logs).unwrap();
        first.generated_at.clear();
        second.generated_at.clear();

        assert_eq!(
            serde_json::to_string_pretty(&first).unwrap(),
            serde_json::to_string_pretty(&second).unwrap()
        );
    }

    #[test]
    fn planning_never_mutates_target() {
        let fx = Fixture::new();
        let path = three_line_log(&fx.logs, "a.jsonl");
        fs::write(
            &path,
            format!("{}{{broken\n", fs::read_to_string(&path).unwrap()),
        )
        .unwrap();
        let before = file_sha256(&path).unwrap();

        fx.planner().build_plan(&fx.logs).unwrap();

        assert_eq!(file_sha256(&path).unwrap(), before);
        assert!(!fx.logs.join("a.jsonl.bad").exists());
    }

    #[test]
    fn repair_id_is_action_and_path_digest() {
        let id = repair_id(RepairAction::ManualRequired, "logs/a.jsonl");
        assert!(id.starts_with("manual_required-"));
        assert_eq!(id.len(), "manual_required-".len() + 12);
        assert_eq!(id, repair_id(RepairAction::ManualRequired, "logs/a.jsonl"));
        assert_ne!(id, repair_id(RepairAction::ManualRequired, "logs/b.jsonl"));
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    #[test]
    fn apply_without_authorization_is_refused() {
        let fx = Fixture::new();
        let path = three_line_log(&fx.logs, "a.jsonl");
        corrupt_prev(&path);
        let before = file_sha256(&path).unwrap();
        let plan = fx.planner().build_plan(&fx.logs).unwrap();

        let err = fx.executor().apply(&plan, Authorization::Denied).unwrap_err();

        assert!(matches!(err, AuditError::ApplyNotAuthorized));
        assert_eq!(file_sha256(&path).unwrap(), before);
    }

    #[test]
    fn safe_repair_restores_a_clean_chain() {
        let fx = Fixture::new();
        let path = three_line_log(&fx.logs, "a.jsonl");
        corrupt_prev(&path);
        let key = path.display().to_string();
        let plan = fx.planner().build_plan(&fx.logs).unwrap();

        let result = fx.executor().apply(&plan, Authorization::Granted).unwrap();

        assert_eq!(result.applied.len(), 1);
        assert_eq!(result.applied[0].fixed, 1);
        assert!(result.errors.is_empty());
        assert_ne!(result.before_hashes[&key], result.after_hashes[&key]);
        assert_eq!(result.after_hashes[&key], file_sha256(&path).unwrap());
        assert!(fx.is_clean());
    }

    #[test]
    fn tampered_payload_relinks_every_later_entry() {
        let fx = Fixture::new();
        let path = three_line_log(&fx.logs, "a.jsonl");
        edit_line(&path, 2, |entry| {
            entry.insert("data".to_string(), json!({"b": 20}));
        });
        let plan = fx.planner().build_plan(&fx.logs).unwrap();

        let result = fx.executor().apply(&plan, Authorization::Granted).unwrap();

        assert_eq!(result.applied[0].fixed, 2);
        assert!(fx.is_clean());
    }

    #[test]
    fn original_bytes_are_preserved_before_rewrite() {
        let fx = Fixture::new();
        let path = three_line_log(&fx.logs, "a.jsonl");
        corrupt_prev(&path);
        let original = fs::read(&path).unwrap();
        let plan = fx.planner().build_plan(&fx.logs).unwrap();

        let result = fx.executor().apply(&plan, Authorization::Granted).unwrap();

        assert_eq!(result.quarantine_paths.len(), 1);
        let record = &result.quarantine_paths[0];
        assert_eq!(record.original_path, path.display().to_string());
        assert_eq!(record.repair_id, plan.repairs[0].repair_id);
        assert_eq!(record.reason_codes, plan.repairs[0].reason_codes);
        assert!(record.quarantine_path.ends_with(".orig"));
        assert_eq!(fs::read(&record.quarantine_path).unwrap(), original);
    }

    #[test]
    fn originals_are_not_kept_when_disabled() {
        let mut fx = Fixture::new();
        fx.config.preserve_originals = false;
        corrupt_prev(&three_line_log(&fx.logs, "a.jsonl"));
        let plan = fx.planner().build_plan(&fx.logs).unwrap();

        let result = fx.executor().apply(&plan, Authorization::Granted).unwrap();

        assert_eq!(result.applied.len(), 1);
        assert!(result.quarantine_paths.is_empty());
        assert!(!fx.config.quarantine_dir().exists());
    }

    /// Rebuilding an already-clean file changes nothing.
    #[test]
    fn rebuild_of_clean_file_is_skipped_already_clean() {
        let fx = Fixture::new();
        let path = three_line_log(&fx.logs, "a.jsonl");
        let before = file_sha256(&path).unwrap();
        let plan = plan_with(vec![safe_repair_for(&path)]);

        let result = fx.executor().apply(&plan, Authorization::Granted).unwrap();

        assert!(result.applied.is_empty());
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].reason, SkipReason::AlreadyClean);
        assert_eq!(file_sha256(&path).unwrap(), before);
        let key = path.display().to_string();
        assert_eq!(result.before_hashes[&key], result.after_hashes[&key]);
    }

    #[test]
    fn second_apply_is_idempotent() {
        let fx = Fixture::new();
        let path = three_line_log(&fx.logs, "a.jsonl");
        corrupt_prev(&path);
        let plan = fx.planner().build_plan(&fx.logs).unwrap();

        fx.executor().apply(&plan, Authorization::Granted).unwrap();
        let repaired = file_sha256(&path).unwrap();
        let again = fx.executor().apply(&plan, Authorization::Granted).unwrap();

        assert_eq!(again.skipped[0].reason, SkipReason::AlreadyClean);
        assert_eq!(file_sha256(&path).unwrap(), repaired);
    }

    /// Files behind a manual repair are never touched.
    #[test]
    fn manual_files_are_never_mutated() {
        let fx = Fixture::new();
        corrupt_prev(&three_line_log(&fx.logs, "a.jsonl"));
        let manual = three_line_log(&fx.logs, "b.jsonl");
        reorder(&manual);
        let manual_before = fs::read(&manual).unwrap();
        let plan = fx.planner().build_plan(&fx.logs).unwrap();

        let result = fx.executor().apply(&plan, Authorization::Granted).unwrap();

        assert_eq!(fs::read(&manual).unwrap(), manual_before);
        assert_eq!(result.applied.len(), 1);
        let skipped: Vec<_> = result
            .skipped
            .iter()
            .filter(|s| s.reason == SkipReason::UnsafeManualRequired)
            .collect();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].paths, vec![manual.display().to_string()]);
        assert!(!result
            .before_hashes
            .contains_key(&manual.display().to_string()));
    }

    #[test]
    fn per_file_failures_do_not_stop_the_rest() {
        let fx = Fixture::new();
        let good = three_line_log(&fx.logs, "b.jsonl");
        corrupt_prev(&good);
        let missing = fx.logs.join("a.jsonl");
        let plan = plan_with(vec![safe_repair_for(&missing), safe_repair_for(&good)]);

        let result = fx.executor().apply(&plan, Authorization::Granted).unwrap();

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].path, missing.display().to_string());
        assert_eq!(result.applied.len(), 1);
        assert!(fx.is_clean());
    }

    #[test]
    fn structurally_damaged_file_is_skipped_and_left_alone() {
        let fx = Fixture::new();
        let path = three_line_log(&fx.logs, "a.jsonl");
        edit_line(&path, 2, |entry| {
            entry.remove("data");
        });
        let before = fs::read(&path).unwrap();
        let plan = plan_with(vec![safe_repair_for(&path)]);

        let result = fx.executor().apply(&plan, Authorization::Granted).unwrap();

        assert!(result.applied.is_empty());
        assert!(result.errors.is_empty());
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].reason, SkipReason::StalePlan);
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    /// A plan built before the file was reordered must not relink it.
    #[test]
    fn file_reordered_after_planning_is_not_rebuilt() {
        let fx = Fixture::new();
        let path = three_line_log(&fx.logs, "a.jsonl");
        corrupt_prev(&path);
        let plan = fx.planner().build_plan(&fx.logs).unwrap();
        assert!(plan.repairs[0].safe);

        reorder(&path);
        let fresh = fx.planner().build_plan(&fx.logs).unwrap();
        assert!(!fresh.repairs[0].safe);
        let before = fs::read(&path).unwrap();

        let result = fx.executor().apply(&plan, Authorization::Granted).unwrap();

        assert!(result.applied.is_empty());
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].reason, SkipReason::StalePlan);
        assert_eq!(result.skipped[0].paths, vec![path.display().to_string()]);
        assert_eq!(fs::read(&path).unwrap(), before);
        assert!(result.quarantine_paths.is_empty());
    }

    #[test]
    fn safe_flag_with_manual_codes_is_treated_as_manual() {
        let fx = Fixture::new();
        let path = three_line_log(&fx.logs, "a.jsonl");
        corrupt_prev(&path);
        let before = fs::read(&path).unwrap();
        let mut repair = safe_repair_for(&path);
        repair.reason_codes = vec![IssueCode::ChainPrevMismatch, IssueCode::MissingField];
        let plan = plan_with(vec![repair]);

        let result = fx.executor().apply(&plan, Authorization::Granted).unwrap();

        assert!(result.applied.is_empty());
        assert_eq!(result.skipped[0].reason, SkipReason::UnsafeManualRequired);
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    // ── Rebuild ───────────────────────────────────────────────────────────────

    #[test]
    fn rebuild_drops_legacy_hash_and_keeps_tombstones() {
        let genesis = "0".repeat(64);
        let text = format!(
            "{}\n{}\n",
            json!({"timestamp": "2025-01-01T00:00:01Z", "data": {"a": 1},
                   "prev_hash": genesis, "hash": "stale"}),
            json!({"timestamp": "2025-01-01T00:00:02Z", "_void": true, "reason": "lost"}),
        );

        let rebuilt = rebuild_text("legacy.jsonl", &text).unwrap();

        assert_eq!(rebuilt.fixed, 1);
        let lines: Vec<&str> = rebuilt.contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Map<String, Value> = serde_json::from_str(lines[0]).unwrap();
        assert!(!first.contains_key("hash"));
        assert!(first.contains_key("rolling_hash"));
        assert_eq!(lines[1], text.lines().nth(1).unwrap());
    }

    #[test]
    fn rebuild_refuses_malformed_lines() {
        let err = rebuild_text("bad.jsonl", "{oops\n").unwrap_err();
        assert!(matches!(err, AuditError::NotRebuildable { .. }));
    }

    // ── Artifacts and receipts ────────────────────────────────────────────────

    #[test]
    fn plan_and_result_receipts_form_a_chain() {
        let fx = Fixture::new();
        corrupt_prev(&three_line_log(&fx.logs, "a.jsonl"));
        let ledger = ReceiptLedger::new(fx.config.receipts_path());

        let plan = fx.planner().build_plan(&fx.logs).unwrap();
        let plan_receipt = artifacts::write_plan(&plan, &fx.config.plan_path(), &ledger).unwrap();
        let result = fx.executor().apply(&plan, Authorization::Granted).unwrap();
        let result_receipt =
            artifacts::write_result(&result, &fx.config.apply_result_path(), &ledger).unwrap();

        assert_eq!(result_receipt.prev_receipt_hash, plan_receipt.receipt_hash);
        assert_eq!(plan_receipt.summary.repairs, 1);
        assert_eq!(result_receipt.summary.applied, 1);
        assert_eq!(ledger.read_all().unwrap().len(), 2);
        assert_eq!(ledger.verify().unwrap(), None);
        assert_eq!(artifacts::read_plan(&fx.config.plan_path()).unwrap(), plan);
    }

    #[test]
    fn missing_plan_file_is_an_error() {
        let fx = Fixture::new();
        let err = artifacts::read_plan(&fx.config.plan_path()).unwrap_err();
        assert!(matches!(err, AuditError::Io { .. }));
    }
}
