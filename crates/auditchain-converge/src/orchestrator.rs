//! The convergence orchestrator.
//!
//! Drives Plan → Apply → Verify until the target is clean, an apply step
//! changes nothing, or the iteration budget runs out:
//!
//! ```text
//!   iter_01: plan ─► apply ─► verify ─┬─ clean               → stop
//!                                     ├─ nothing applied     → stop
//!                                     └─ otherwise           → iter_02 …
//! ```
//!
//! In plan-only mode the first plan is written and the loop stops with
//! `no_apply_mode`.  Every plan and result is persisted under
//! `iterations_dir()` and receipted, so a run can be audited step by step.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, info};

use auditchain_chain::{fsio::write_json, utc_now, ReceiptLedger};
use auditchain_contracts::{
    convergence::{ConvergenceReport, IssueCounts, IterationRecord, ManualIssue, StopReason},
    plan::{QuarantineRecord, RepairPlan},
    traits::Verifier,
    AuditConfig, AuditResult, VerifyOptions, VerifyRun, SCHEMA_VERSION,
};
use auditchain_repair::{artifacts, Authorization, RepairExecutor, RepairPlanner};
use auditchain_verify::ChainVerifier;

/// Runs convergence passes against one configuration.
pub struct Orchestrator {
    config: AuditConfig,
    planner: RepairPlanner,
    executor: RepairExecutor,
    ledger: ReceiptLedger,
}

impl Orchestrator {
    /// An orchestrator backed by the standard `ChainVerifier`.
    pub fn new(config: &AuditConfig) -> Self {
        let planner = RepairPlanner::new(Box::new(ChainVerifier::new(config)));
        Self::with_planner(config, planner)
    }

    pub fn with_planner(config: &AuditConfig, planner: RepairPlanner) -> Self {
        Self {
            config: config.clone(),
            planner,
            executor: RepairExecutor::new(config, Box::new(ChainVerifier::new(config))),
            ledger: ReceiptLedger::new(config.receipts_path()),
        }
    }

    pub fn verifier(&self) -> &dyn Verifier {
        self.planner.verifier()
    }

    /// Run up to `max_iterations` passes over `target`.
    ///
    /// `Authorization::Denied` selects plan-only mode: one plan is written
    /// and nothing in `target` is mutated.
    pub fn run(
        &self,
        target: &Path,
        max_iterations: usize,
        apply: Authorization,
    ) -> AuditResult<ConvergenceReport> {
        let before = self.verify(target)?;
        let mut after_counts = counts(&before);
        let counts_before = after_counts.clone();
        let mut after_clean = before.is_clean();

        let iterations_dir = self.config.iterations_dir();
        let mut iterations = Vec::new();
        let mut applied_repairs = 0;
        let mut quarantined: BTreeSet<QuarantineRecord> = BTreeSet::new();

        for index in 1..=max_iterations {
            let name = format!("iter_{index:02}");
            let plan_path = iterations_dir.join(format!("{name}_plan.json"));
            let result_path = iterations_dir.join(format!("{name}_result.json"));

            let plan = self.planner.build_plan(target)?;
            artifacts::write_plan(&plan, &plan_path, &self.ledger)?;

            let mut record = IterationRecord {
                iteration: name,
                plan_path: plan_path.display().to_string(),
                result_path: None,
                applied_count: 0,
                stopped_reason: None,
            };

            if apply != Authorization::Granted {
                record.stopped_reason = Some(StopReason::NoApplyMode);
                iterations.push(record);
                break;
            }

            let result = self.executor.apply(&plan, apply)?;
            artifacts::write_result(&result, &result_path, &self.ledger)?;
            record.result_path = Some(result_path.display().to_string());
            record.applied_count = result.applied.len();
            applied_repairs += result.applied.len();
            quarantined.extend(result.quarantine_paths.iter().cloned());

            let current = self.verify(target)?;
            after_counts = counts(&current);
            after_clean = current.is_clean();

            if after_clean {
                record.stopped_reason = Some(StopReason::Clean);
            } else if result.applied.is_empty() {
                record.stopped_reason = Some(StopReason::NoChangesApplied);
            }
            debug!(
                iteration = %record.iteration,
                applied = record.applied_count,
                stopped = ?record.stopped_reason,
                "convergence iteration finished"
            );
            let stop = record.stopped_reason.is_some();
            iterations.push(record);
            if stop {
                break;
            }
        }

        let final_plan = self.planner.build_plan(target)?;
        let remaining_manual_issues = manual_issues(&final_plan, self.config.max_manual_issues);
        let ok = after_clean && remaining_manual_issues.is_empty();

        info!(
            dir = %target.display(),
            iterations = iterations.len(),
            applied_repairs,
            remaining_manual = remaining_manual_issues.len(),
            ok,
            "convergence finished"
        );

        Ok(ConvergenceReport {
            schema_version: SCHEMA_VERSION,
            generated_at: utc_now(),
            target: target.display().to_string(),
            max_iterations,
            iterations,
            counts_before,
            counts_after: after_counts,
            applied_repairs,
            remaining_manual_issues,
            quarantine_paths: quarantined.into_iter().collect(),
            ok,
            no_safe_repairs_remaining: !final_plan.ok_to_apply,
        })
    }

    fn verify(&self, target: &Path) -> AuditResult<VerifyRun> {
        self.planner
            .verifier()
            .verify_dir(target, VerifyOptions::default())
    }
}

/// Write a convergence report as a JSON document.
pub fn write_report(report: &ConvergenceReport, path: &Path) -> AuditResult<()> {
    write_json(path, report)?;
    info!(path = %path.display(), ok = report.ok, "convergence report written");
    Ok(())
}

fn counts(run: &VerifyRun) -> IssueCounts {
    IssueCounts {
        issues_total: run.issues_total(),
        issues_per_code: run.issues_per_code(),
    }
}

/// Every unsafe repair of `plan`, sorted by `(repair_id, paths, codes)` and
/// capped at `limit`.
pub fn manual_issues(plan: &RepairPlan, limit: usize) -> Vec<ManualIssue> {
    let mut manual: Vec<ManualIssue> = plan
        .manual_repairs()
        .map(|repair| {
            let mut paths = repair.paths.clone();
            paths.sort();
            let mut reason_codes = repair.reason_codes.clone();
            reason_codes.sort();
            ManualIssue {
                repair_id: repair.repair_id.clone(),
                paths,
                reason_codes,
                action: repair.action,
            }
        })
        .collect();
    manual.sort_by(|a, b| {
        (&a.repair_id, &a.paths, &a.reason_codes).cmp(&(&b.repair_id, &b.paths, &b.reason_codes))
    });
    manual.truncate(limit);
    manual
}
