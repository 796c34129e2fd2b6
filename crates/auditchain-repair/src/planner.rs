//! Repair planning.
//!
//! A plan is a pure function of one verifier run: issues are grouped per
//! file, each file's distinct codes decide between `rebuild_chain` (every
//! code auto-repairable) and `manual_required`.  Planning runs the verifier
//! with every side effect disabled, so it never touches the target.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, info, warn};

use auditchain_chain::{sha256_hex, utc_now};
use auditchain_contracts::{
    plan::{Repair, RepairAction, RepairPlan},
    traits::Verifier,
    AuditResult, IssueCode, VerifyOptions, VerifyRun, SCHEMA_VERSION,
};

/// Builds repair plans on top of a `Verifier`.
pub struct RepairPlanner {
    verifier: Box<dyn Verifier>,
}

impl RepairPlanner {
    pub fn new(verifier: Box<dyn Verifier>) -> Self {
        Self { verifier }
    }

    /// The verifier plans are built from.
    pub fn verifier(&self) -> &dyn Verifier {
        self.verifier.as_ref()
    }

    /// Verify every log in `target` and plan repairs for what was found.
    pub fn build_plan(&self, target: &Path) -> AuditResult<RepairPlan> {
        let options = VerifyOptions {
            quarantine: false,
            repair: false,
        };
        let run = self.verifier.verify_dir(target, options)?;
        Ok(plan_from_run(&target.display().to_string(), &run))
    }
}

/// Turn one verifier run into a plan.
///
/// Files are visited in path order, so two runs over the same bytes give
/// plans that differ only in `generated_at`.
pub fn plan_from_run(target: &str, run: &VerifyRun) -> RepairPlan {
    let mut repairs = Vec::new();

    for (path, issues) in &run.issues_by_path {
        if issues.is_empty() {
            continue;
        }
        let codes: BTreeSet<IssueCode> = issues.iter().map(|i| i.code).collect();
        let safe = codes.iter().all(IssueCode::is_auto_repairable);
        let action = if safe {
            RepairAction::RebuildChain
        } else {
            RepairAction::ManualRequired
        };
        debug!(path = %path, action = %action, codes = codes.len(), "planned repair");

        repairs.push(Repair {
            repair_id: repair_id(action, path),
            action,
            paths: vec![path.clone()],
            reason_codes: codes.into_iter().collect(),
            safe,
        });
    }

    for (path, reason) in &run.errors {
        warn!(path = %path, reason = %reason, "unreadable file left out of plan");
    }

    let ok_to_apply = repairs.iter().any(|r| r.safe);
    info!(
        dir = %target,
        repairs = repairs.len(),
        safe = repairs.iter().filter(|r| r.safe).count(),
        ok_to_apply,
        "repair plan built"
    );

    RepairPlan {
        schema_version: SCHEMA_VERSION,
        generated_at: utc_now(),
        target: target.to_string(),
        ok_to_apply,
        issues: run.sorted_issues(),
        repairs,
    }
}

/// `<action>-<first 12 hex chars of sha256(path)>`.
pub fn repair_id(action: RepairAction, path: &str) -> String {
    let digest = sha256_hex(path.as_bytes());
    format!("{}-{}", action, &digest[..12])
}
