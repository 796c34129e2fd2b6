//! Persisting plans and apply results, each followed by a receipt.

use std::path::Path;

use auditchain_chain::{
    fsio::{read_json, write_json},
    ReceiptLedger,
};
use auditchain_contracts::{
    plan::{ApplyResult, RepairPlan},
    receipt::{Receipt, ReceiptKind, ReceiptSummary},
    AuditResult,
};

/// Write `plan` to `path` and append a plan receipt to `ledger`.
pub fn write_plan(plan: &RepairPlan, path: &Path, ledger: &ReceiptLedger) -> AuditResult<Receipt> {
    write_json(path, plan)?;
    let summary = ReceiptSummary {
        issues: plan.issues.len(),
        repairs: plan.repairs.len(),
        ..ReceiptSummary::default()
    };
    ledger.append(ReceiptKind::Plan, path, summary)
}

/// Write `result` to `path` and append a result receipt to `ledger`.
pub fn write_result(
    result: &ApplyResult,
    path: &Path,
    ledger: &ReceiptLedger,
) -> AuditResult<Receipt> {
    write_json(path, result)?;
    let summary = ReceiptSummary {
        applied: result.applied.len(),
        skipped: result.skipped.len(),
        errors: result.errors.len(),
        ..ReceiptSummary::default()
    };
    ledger.append(ReceiptKind::Result, path, summary)
}

/// Load a plan previously written by `write_plan`.
pub fn read_plan(path: &Path) -> AuditResult<RepairPlan> {
    read_json(path)
}
