//! The `rebuild_chain` transformation.
//!
//! Entries are walked in file order from the genesis marker.  Each entry's
//! `prev_hash` is set to the running digest and its `rolling_hash` is
//! recomputed; the legacy `hash` key is dropped from rewritten entries.
//! Tombstones, blank lines and entries that already carry the right fields
//! are kept byte for byte.

use serde_json::Value;

use auditchain_chain::{
    canonical_object, decode_object,
    entry::{LEGACY_HASH_KEY, ROLLING_HASH_KEY, VOID_KEY},
    hash_entry, GENESIS_HASH,
};
use auditchain_contracts::{AuditError, AuditResult};

/// The rebuilt file text and how many entries changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rebuilt {
    pub contents: String,
    pub fixed: usize,
}

/// Rebuild the chain of `text`, the contents of the file at `path`.
///
/// Fails with `NotRebuildable` on the first line that is not a JSON object
/// or lacks a string `timestamp` or an object `data`; nothing is partially
/// rebuilt.
pub fn rebuild_text(path: &str, text: &str) -> AuditResult<Rebuilt> {
    let mut running = GENESIS_HASH.to_string();
    let mut lines = Vec::new();
    let mut fixed = 0;

    for (idx, line) in text.lines().enumerate() {
        let lineno = idx + 1;
        if line.trim().is_empty() {
            lines.push(line.to_string());
            continue;
        }
        let mut obj =
            decode_object(line).map_err(|e| unrebuildable(path, lineno, &e.to_string()))?;
        if obj.get(VOID_KEY) == Some(&Value::Bool(true)) {
            lines.push(line.to_string());
            continue;
        }

        let timestamp = obj
            .get("timestamp")
            .and_then(Value::as_str)
            .ok_or_else(|| unrebuildable(path, lineno, "missing timestamp"))?;
        let data = match obj.get("data") {
            Some(Value::Object(map)) => map,
            _ => return Err(unrebuildable(path, lineno, "missing data")),
        };
        let digest = hash_entry(timestamp, data, &running);

        let linked = obj.get("prev_hash").and_then(Value::as_str) == Some(running.as_str());
        let sealed = obj.get(ROLLING_HASH_KEY).and_then(Value::as_str) == Some(digest.as_str());
        if linked && sealed && !obj.contains_key(LEGACY_HASH_KEY) {
            lines.push(line.to_string());
        } else {
            obj.insert("prev_hash".to_string(), Value::String(running.clone()));
            obj.insert(ROLLING_HASH_KEY.to_string(), Value::String(digest.clone()));
            obj.remove(LEGACY_HASH_KEY);
            lines.push(canonical_object(&obj));
            fixed += 1;
        }
        running = digest;
    }

    let mut contents = lines.join("\n");
    if !contents.is_empty() {
        contents.push('\n');
    }
    Ok(Rebuilt { contents, fixed })
}

fn unrebuildable(path: &str, lineno: usize, reason: &str) -> AuditError {
    AuditError::NotRebuildable {
        path: path.to_string(),
        reason: format!("line {lineno}: {reason}"),
    }
}
