//! Receipts: the append-only, hash-chained ledger of plan and apply runs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which kind of artifact a receipt covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptKind {
    Plan,
    Result,
}

impl fmt::Display for ReceiptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiptKind::Plan => f.write_str("plan"),
            ReceiptKind::Result => f.write_str("result"),
        }
    }
}

/// Counts describing the artifact a receipt covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptSummary {
    pub issues: usize,
    pub repairs: usize,
    pub applied: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// One immutable line of the receipt ledger.
///
/// `receipt_hash` is the SHA-256 of the canonical JSON of every other field,
/// including `prev_receipt_hash`, so the ledger is itself a hash chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub schema_version: u32,
    pub kind: ReceiptKind,
    pub created_at: String,
    pub artifact: String,
    pub artifact_sha256: String,
    pub prev_receipt_hash: String,
    pub summary: ReceiptSummary,
    pub receipt_hash: String,
}
