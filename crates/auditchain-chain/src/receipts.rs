//! The receipt ledger: an append-only, hash-chained record of every plan and
//! apply invocation.
//!
//! Each receipt commits to the artifact it describes (by whole-file SHA-256)
//! and to the previous receipt (by `receipt_hash`).  The first receipt links
//! to the same 64-zero genesis marker audit logs use.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use auditchain_contracts::{
    receipt::{Receipt, ReceiptKind, ReceiptSummary},
    AuditError, AuditResult, SCHEMA_VERSION,
};

use crate::{
    chain::{canonical_json, file_sha256, sha256_hex},
    entry::{utc_now, GENESIS_HASH},
    fsio::append_line,
};

/// Where the receipt chain first stopped verifying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptBreak {
    /// 1-based line number in the ledger file.
    pub line: usize,
    pub reason: String,
}

/// Handle on one receipt ledger file.
#[derive(Debug, Clone)]
pub struct ReceiptLedger {
    path: PathBuf,
}

impl ReceiptLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a receipt for `artifact` and return it.
    pub fn append(
        &self,
        kind: ReceiptKind,
        artifact: &Path,
        summary: ReceiptSummary,
    ) -> AuditResult<Receipt> {
        let artifact_sha256 = file_sha256(artifact)?;
        let prev_receipt_hash = self.last_hash()?;

        let mut receipt = Receipt {
            schema_version: SCHEMA_VERSION,
            kind,
            created_at: utc_now(),
            artifact: artifact.display().to_string(),
            artifact_sha256,
            prev_receipt_hash,
            summary,
            receipt_hash: String::new(),
        };
        receipt.receipt_hash = receipt_hash(&receipt)?;

        let line = serde_json::to_value(&receipt)
            .map(|v| canonical_json(&v))
            .map_err(|e| AuditError::json("receipt", e))?;
        append_line(&self.path, &line)?;

        info!(
            kind = %kind,
            artifact = %receipt.artifact,
            receipt_hash = %receipt.receipt_hash,
            "receipt appended"
        );
        Ok(receipt)
    }

    /// `receipt_hash` of the last receipt, or the genesis marker.
    pub fn last_hash(&self) -> AuditResult<String> {
        Ok(self
            .read_all()?
            .last()
            .map(|r| r.receipt_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string()))
    }

    /// Every receipt in ledger order.  A missing ledger is empty.
    pub fn read_all(&self) -> AuditResult<Vec<Receipt>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path).map_err(|e| AuditError::io(&self.path, e))?;
        contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| {
                serde_json::from_str::<Receipt>(line)
                    .map_err(|e| AuditError::json(self.path.display(), e))
            })
            .collect()
    }

    /// Replay the chain from genesis.
    ///
    /// Returns `Ok(None)` when every receipt links to its predecessor and its
    /// `receipt_hash` matches its content.
    pub fn verify(&self) -> AuditResult<Option<ReceiptBreak>> {
        let mut expected_prev = GENESIS_HASH.to_string();
        for (idx, receipt) in self.read_all()?.iter().enumerate() {
            let line = idx + 1;
            if receipt.prev_receipt_hash != expected_prev {
                warn!(line, "receipt chain link broken");
                return Ok(Some(ReceiptBreak {
                    line,
                    reason: format!(
                        "prev_receipt_hash {} does not match {}",
                        receipt.prev_receipt_hash, expected_prev
                    ),
                }));
            }
            let recomputed = receipt_hash(receipt)?;
            if recomputed != receipt.receipt_hash {
                warn!(line, "receipt hash mismatch");
                return Ok(Some(ReceiptBreak {
                    line,
                    reason: format!(
                        "receipt_hash {} does not match recomputed {}",
                        receipt.receipt_hash, recomputed
                    ),
                }));
            }
            expected_prev = receipt.receipt_hash.clone();
        }
        Ok(None)
    }
}

/// SHA-256 of the canonical JSON of every field except `receipt_hash`.
pub fn receipt_hash(receipt: &Receipt) -> AuditResult<String> {
    let mut value = serde_json::to_value(receipt).map_err(|e| AuditError::json("receipt", e))?;
    if let Value::Object(map) = &mut value {
        map.remove("receipt_hash");
    }
    Ok(sha256_hex(canonical_json(&value).as_bytes()))
}
