//! The repair executor: applies the safe part of a plan.
//!
//! The executor enforces one rule above all others: a file is only ever
//! rewritten when it is referenced by a `safe` repair.  Files referenced by
//! `manual_required` repairs are recorded as skipped and never opened for
//! writing.
//!
//! A plan is not trusted on its own.  A repair whose `reason_codes` are not
//! all auto-repairable is treated as manual whatever its `safe` flag says,
//! and each file is verified again right before it is rebuilt: if it now
//! carries any code outside the auto-repairable set it is skipped as
//! `stale_plan`.
//!
//! Applying is gated.  Callers must pass an explicit authorization; without
//! it `apply` fails with `AuditError::ApplyNotAuthorized` before reading
//! anything.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use auditchain_chain::{fsio::atomic_write, sha256_hex};
use auditchain_contracts::{
    plan::{
        AppliedRepair, ApplyFailure, ApplyResult, QuarantineRecord, Repair, RepairAction,
        RepairPlan, SkipReason, SkippedRepair,
    },
    traits::Verifier,
    AuditConfig, AuditError, AuditResult, IssueCode, VerifyOptions,
};

use crate::rebuild::rebuild_text;

/// Whether the caller explicitly opted in to mutating the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Granted,
    Denied,
}

impl Authorization {
    pub fn from_flag(granted: bool) -> Self {
        if granted {
            Authorization::Granted
        } else {
            Authorization::Denied
        }
    }
}

/// Applies `rebuild_chain` repairs.
pub struct RepairExecutor {
    verifier: Box<dyn Verifier>,
    quarantine_dir: PathBuf,
    preserve_originals: bool,
}

impl RepairExecutor {
    /// `verifier` re-checks every file right before it is rewritten.
    pub fn new(config: &AuditConfig, verifier: Box<dyn Verifier>) -> Self {
        Self {
            verifier,
            quarantine_dir: config.quarantine_dir(),
            preserve_originals: config.preserve_originals,
        }
    }

    /// Apply every safe repair of `plan`.
    ///
    /// # Errors
    ///
    /// Only a missing authorization is an error.  Per-file failures are
    /// collected into `ApplyResult::errors` and the remaining files are
    /// still processed.
    pub fn apply(
        &self,
        plan: &RepairPlan,
        authorization: Authorization,
    ) -> AuditResult<ApplyResult> {
        if authorization != Authorization::Granted {
            warn!(dir = %plan.target, "apply refused: not authorized");
            return Err(AuditError::ApplyNotAuthorized);
        }

        let mut result = ApplyResult::new();
        for repair in &plan.repairs {
            let rebuildable = repair.safe
                && repair.action == RepairAction::RebuildChain
                && repair.reason_codes.iter().all(IssueCode::is_auto_repairable);
            if !rebuildable {
                info!(repair_id = %repair.repair_id, "skipping manual repair");
                result.skipped.push(SkippedRepair {
                    repair_id: repair.repair_id.clone(),
                    paths: repair.paths.clone(),
                    reason: SkipReason::UnsafeManualRequired,
                });
                continue;
            }
            for path in &repair.paths {
                if let Err(e) = self.apply_one(repair, Path::new(path), &mut result) {
                    warn!(path = %path, error = %e, "repair failed");
                    result.errors.push(ApplyFailure {
                        path: path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            dir = %plan.target,
            applied = result.applied.len(),
            skipped = result.skipped.len(),
            errors = result.errors.len(),
            "repairs applied"
        );
        Ok(result)
    }

    fn apply_one(
        &self,
        repair: &Repair,
        path: &Path,
        result: &mut ApplyResult,
    ) -> AuditResult<()> {
        let key = path.display().to_string();
        if !path.is_file() {
            return Err(AuditError::TargetNotFound { path: key });
        }

        let original = fs::read(path).map_err(|e| AuditError::io(path, e))?;
        let hash_before = sha256_hex(&original);
        result.before_hashes.insert(key.clone(), hash_before.clone());

        let blocking = self.blocking_codes(path)?;
        if !blocking.is_empty() {
            warn!(path = %key, codes = ?blocking, "file changed since planning; not rebuilt");
            result.after_hashes.insert(key.clone(), hash_before);
            result.skipped.push(SkippedRepair {
                repair_id: repair.repair_id.clone(),
                paths: vec![key],
                reason: SkipReason::StalePlan,
            });
            return Ok(());
        }

        let text = std::str::from_utf8(&original).map_err(|e| AuditError::NotRebuildable {
            path: key.clone(),
            reason: format!("not UTF-8: {e}"),
        })?;
        let rebuilt = rebuild_text(&key, text)?;

        if rebuilt.fixed == 0 {
            debug!(path = %key, "already clean");
            result.after_hashes.insert(key.clone(), hash_before);
            result.skipped.push(SkippedRepair {
                repair_id: repair.repair_id.clone(),
                paths: vec![key],
                reason: SkipReason::AlreadyClean,
            });
            return Ok(());
        }

        let preserved = if self.preserve_originals {
            let copy = self.original_copy_path(path, &hash_before);
            atomic_write(&copy, &original)?;
            Some(copy)
        } else {
            None
        };

        atomic_write(path, rebuilt.contents.as_bytes())?;
        let hash_after = sha256_hex(rebuilt.contents.as_bytes());
        info!(path = %key, fixed = rebuilt.fixed, "chain rebuilt");

        result.after_hashes.insert(key.clone(), hash_after.clone());
        if let Some(copy) = preserved {
            result.quarantine_paths.push(QuarantineRecord {
                original_path: key.clone(),
                quarantine_path: copy.display().to_string(),
                reason_codes: repair.reason_codes.clone(),
                hash_before,
                hash_after,
                repair_id: repair.repair_id.clone(),
            });
        }
        result.applied.push(AppliedRepair {
            path: key,
            action: repair.action,
            repair_id: repair.repair_id.clone(),
            fixed: rebuilt.fixed,
        });
        Ok(())
    }

    /// Codes currently on `path` that a chain rebuild must not paper over.
    fn blocking_codes(&self, path: &Path) -> AuditResult<Vec<IssueCode>> {
        let run = self
            .verifier
            .verify(&[path.to_path_buf()], VerifyOptions::default())?;
        if let Some((file, reason)) = run.errors.into_iter().next() {
            return Err(AuditError::Io { path: file, reason });
        }
        let mut codes: Vec<IssueCode> = run
            .issues_by_path
            .values()
            .flatten()
            .map(|issue| issue.code)
            .filter(|code| !code.is_auto_repairable())
            .collect();
        codes.sort();
        codes.dedup();
        Ok(codes)
    }

    /// `<quarantine_dir>/<file name>.<first 12 hex of hash_before>.orig`
    fn original_copy_path(&self, path: &Path, hash_before: &str) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.quarantine_dir
            .join(format!("{name}.{}.orig", &hash_before[..12]))
    }
}
