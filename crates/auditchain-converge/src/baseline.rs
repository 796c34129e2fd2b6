//! Baseline capture and drift detection.
//!
//! A baseline records what the target looked like at a moment someone
//! accepted it: a manifest of every audited file, the fingerprint of that
//! manifest, and the sorted issue tuples still present.  Drift detection
//! recomputes both and reports the set difference.
//!
//! Nothing fingerprinted depends on wall-clock time or directory iteration
//! order, so capturing twice over the same bytes gives the same fingerprint.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::process::Command;

use tracing::{debug, info, warn};

use auditchain_chain::{
    canonical_json, file_sha256,
    fsio::{read_json, write_json},
    sha256_hex, utc_now,
};
use auditchain_contracts::{
    baseline::{Baseline, DriftReport, IssueTuple, ManifestEntry},
    traits::Verifier,
    AuditConfig, AuditError, AuditResult, VerifyOptions, VerifyRun, SCHEMA_VERSION,
};
use auditchain_repair::Authorization;

use crate::orchestrator::{write_report, Orchestrator};

/// Snapshot `target` into a baseline written to `output`.
///
/// # Errors
///
/// `BaselineRefused` when the target has issues and either `accept_manual`
/// is false, a safe repair is still available, or no manual repair accounts
/// for the issues.
pub fn capture_baseline(
    config: &AuditConfig,
    target: &Path,
    accept_manual: bool,
    output: &Path,
) -> AuditResult<Baseline> {
    let orchestrator = Orchestrator::new(config);
    let run = orchestrator
        .verifier()
        .verify_dir(target, VerifyOptions::default())?;
    let convergence = orchestrator.run(target, 1, Authorization::Denied)?;

    let ok = run.is_clean();
    if !ok {
        let refusal = if !accept_manual {
            Some("audits are unclean; pass accept-manual to record explicit acceptance")
        } else if !convergence.no_safe_repairs_remaining {
            Some("auto-repairable issues remain; converge before capturing")
        } else if convergence.remaining_manual_issues.is_empty() {
            Some("audits are unclean but no manual-required issues were identified")
        } else {
            None
        };
        if let Some(reason) = refusal {
            warn!(dir = %target.display(), reason, "baseline capture refused");
            return Err(AuditError::BaselineRefused {
                reason: reason.to_string(),
            });
        }
    }

    let manifest = build_manifest(orchestrator.verifier(), target)?;
    let baseline = Baseline {
        schema_version: SCHEMA_VERSION,
        captured_at: utc_now(),
        captured_by: captured_by_commit(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        target: format!("{}/", target.display().to_string().trim_end_matches('/')),
        ok,
        manual_issues_accepted: accept_manual && !ok,
        issues_by_code: run.issues_per_code(),
        baseline_fingerprint: fingerprint(&manifest)?,
        manifest,
        issue_tuples: issue_tuples(&run, config.max_issue_length),
        manual_issues: convergence.remaining_manual_issues,
    };

    write_json(output, &baseline)?;
    info!(
        path = %output.display(),
        ok,
        files = baseline.manifest.len(),
        fingerprint = %baseline.baseline_fingerprint,
        "baseline captured"
    );
    Ok(baseline)
}

/// Compare `target` against the baseline at `baseline_path` and write the
/// drift report to `output`.
///
/// Runs one plan-only convergence pass (at most `max_iterations` plans) to
/// measure growth in manual-required repairs; its report is persisted to
/// `convergence_report_path()`.  Nothing in `target` is modified.
pub fn detect_drift(
    config: &AuditConfig,
    target: &Path,
    baseline_path: &Path,
    output: &Path,
    max_iterations: usize,
) -> AuditResult<DriftReport> {
    let baseline: Baseline = read_json(baseline_path)?;
    let orchestrator = Orchestrator::new(config);

    let run = orchestrator
        .verifier()
        .verify_dir(target, VerifyOptions::default())?;
    let current: BTreeSet<IssueTuple> = issue_tuples(&run, config.max_issue_length)
        .into_iter()
        .collect();
    let recorded: BTreeSet<IssueTuple> = baseline.issue_tuples.iter().cloned().collect();

    let new_issues: Vec<IssueTuple> = current.difference(&recorded).cloned().collect();
    let resolved_issues: Vec<IssueTuple> = recorded.difference(&current).cloned().collect();

    let convergence = orchestrator.run(target, max_iterations, Authorization::Denied)?;
    let convergence_path = config.convergence_report_path();
    write_report(&convergence, &convergence_path)?;

    let current_fingerprint = fingerprint(&build_manifest(orchestrator.verifier(), target)?)?;
    let report = DriftReport {
        schema_version: SCHEMA_VERSION,
        fingerprint_changed: current_fingerprint != baseline.baseline_fingerprint,
        baseline_fingerprint: baseline.baseline_fingerprint.clone(),
        current_fingerprint,
        drifted: !new_issues.is_empty() || !resolved_issues.is_empty(),
        new_issues,
        resolved_issues,
        new_manual_required_count: convergence
            .remaining_manual_issues
            .len()
            .saturating_sub(baseline.manual_issues.len()),
        notes: vec![
            format!("baseline={}", baseline_path.display()),
            format!("convergence_report={}", convergence_path.display()),
        ],
    };

    write_json(output, &report)?;
    info!(
        path = %output.display(),
        drifted = report.drifted,
        new = report.new_issues.len(),
        resolved = report.resolved_issues.len(),
        "drift report written"
    );
    Ok(report)
}

/// Path, size and whole-file hash of every audited file, sorted by path.
pub fn build_manifest(
    verifier: &dyn Verifier,
    target: &Path,
) -> AuditResult<Vec<ManifestEntry>> {
    let mut manifest = Vec::new();
    for path in verifier.discover(target)? {
        let size = fs::metadata(&path)
            .map_err(|e| AuditError::io(&path, e))?
            .len();
        manifest.push(ManifestEntry {
            path: path.display().to_string(),
            size,
            hash: file_sha256(&path)?,
        });
    }
    manifest.sort();
    Ok(manifest)
}

/// SHA-256 of the canonical JSON of `manifest`.
pub fn fingerprint(manifest: &[ManifestEntry]) -> AuditResult<String> {
    let value = serde_json::to_value(manifest).map_err(|e| AuditError::json("manifest", e))?;
    Ok(sha256_hex(canonical_json(&value).as_bytes()))
}

/// Every issue of `run` as a bounded tuple, sorted by
/// `(code, path, expected, actual)`.
pub fn issue_tuples(run: &VerifyRun, max_len: usize) -> Vec<IssueTuple> {
    let mut tuples: Vec<IssueTuple> = run
        .issues_by_path
        .values()
        .flatten()
        .map(|issue| IssueTuple::from_issue(issue, max_len))
        .collect();
    tuples.sort();
    tuples
}

/// The `HEAD` commit of the working directory, or empty outside a checkout.
fn captured_by_commit() -> String {
    match Command::new("git")
        .args(["rev-parse", "--verify", "HEAD"])
        .output()
    {
        Ok(out) if out.status.success() => {
            String::from_utf8_lossy(&out.stdout).trim().to_string()
        }
        Ok(_) | Err(_) => {
            debug!("no git HEAD available for captured_by");
            String::new()
        }
    }
}
