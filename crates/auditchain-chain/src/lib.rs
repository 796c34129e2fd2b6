//! # auditchain-chain
//!
//! Append-only, SHA-256 hash-chained audit logs: the line codec, the
//! producer-side writer, the filesystem helpers every other component uses,
//! and the receipt ledger.
//!
//! ## Overview
//!
//! Every line of a log is one `AuditEntry` whose `rolling_hash` commits to its
//! timestamp, its payload and the previous entry's digest.  Tampering with any
//! entry, even a single byte, breaks the chain from that point on.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use auditchain_chain::{FileChainWriter, read_entries, verify_chain};
//!
//! let mut writer = FileChainWriter::open("logs/rituals.jsonl")?;
//! writer.append_entry("2025-01-01T00:00:00Z", data)?;
//!
//! let entries = read_entries(writer.path())?;
//! assert!(verify_chain(&entries));
//! ```

pub mod chain;
pub mod entry;
pub mod fsio;
pub mod receipts;
pub mod writer;

pub use chain::{canonical_json, canonical_object, file_sha256, hash_entry, sha256_hex, verify_chain};
pub use entry::{
    decode, decode_object, encode, parse_timestamp, salvage_line, stored_digest, utc_now,
    AuditEntry, GENESIS_HASH,
};
pub use receipts::{ReceiptBreak, ReceiptLedger};
pub use writer::{read_entries, tail_hash_of, FileChainWriter};

// ── Tests ─────────────────────────────────────────────────────────────────────
