//! Hash-chain primitives: canonical JSON, entry hashing, chain replay.
//!
//! Hash input layout (bytes, in order):
//!   1. timestamp as UTF-8 bytes, exactly as stored
//!   2. canonical JSON of data (keys sorted, no whitespace)
//!   3. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!
//! Canonical JSON is produced here rather than by `serde_json::to_vec` so the
//! digest never depends on how the JSON map type orders its keys.

use std::fmt::Write as _;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use auditchain_contracts::{AuditError, AuditResult};

use crate::entry::{AuditEntry, GENESIS_HASH};

const READ_CHUNK: usize = 128 * 1024;

/// Serialize `value` with lexicographically sorted keys and no whitespace.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

/// Canonical JSON of a bare object.
pub fn canonical_object(map: &Map<String, Value>) -> String {
    let mut out = String::new();
    write_object(&mut out, map);
    out
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            let _ = write!(out, "{}", n);
        }
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => write_object(out, map),
    }
}

fn write_object(out: &mut String, map: &Map<String, Value>) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    out.push('{');
    for (idx, key) in keys.into_iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        write_string(out, key);
        out.push(':');
        if let Some(v) = map.get(key) {
            write_canonical(out, v);
        }
    }
    out.push('}');
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Compute the rolling hash for one entry.
///
/// Returns a lowercase 64-character hex string.
pub fn hash_entry(timestamp: &str, data: &Map<String, Value>, prev_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(timestamp.as_bytes());
    hasher.update(canonical_object(data).as_bytes());
    hasher.update(prev_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Whole-file SHA-256, read in fixed-size chunks.
pub fn file_sha256(path: &Path) -> AuditResult<String> {
    let mut file = File::open(path).map_err(|e| AuditError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf).map_err(|e| AuditError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Verify the integrity of an in-memory chain.
///
/// Returns `true` when every non-void entry links to its predecessor (or to
/// `GENESIS_HASH` for the first) and its `rolling_hash` matches the value
/// recomputed from its own fields.  Void tombstones are skipped.  An empty
/// chain is valid.
pub fn verify_chain(entries: &[AuditEntry]) -> bool {
    let mut expected_prev = GENESIS_HASH.to_string();

    for entry in entries.iter().filter(|e| !e.void) {
        if entry.prev_hash != expected_prev {
            return false;
        }
        if entry.rolling_hash != entry.expected_hash() {
            return false;
        }
        expected_prev = entry.rolling_hash.clone();
    }

    true
}
