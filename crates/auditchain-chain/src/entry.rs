//! Audit entry type and its line codec.
//!
//! One entry is one line of a log file: a JSON object carrying `timestamp`,
//! `data`, `prev_hash` and `rolling_hash` (older producers wrote `hash`
//! instead of `rolling_hash`).  Unknown keys are preserved through a
//! decode/encode round trip so a rewrite never silently drops evidence.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use auditchain_contracts::DecodeError;

use crate::chain::{canonical_object, hash_entry};

/// The sentinel `prev_hash` of the first entry in every chain.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Key of the current digest field.
pub const ROLLING_HASH_KEY: &str = "rolling_hash";
/// Key older producers used for the digest.
pub const LEGACY_HASH_KEY: &str = "hash";
/// Key marking a sealed tombstone.
pub const VOID_KEY: &str = "_void";

/// A single entry in a file's hash chain.
///
/// Modifying `timestamp`, `data` or `prev_hash` invalidates `rolling_hash`
/// and, through it, the `prev_hash` of every later entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    /// ISO-8601 timestamp, hashed exactly as stored.
    pub timestamp: String,

    /// The producer's payload.  Key order is irrelevant to the hash.
    pub data: Map<String, Value>,

    /// `rolling_hash` of the previous entry, or `GENESIS_HASH`.
    pub prev_hash: String,

    /// SHA-256 over (timestamp, canonical data, prev_hash).
    pub rolling_hash: String,

    /// Sealed tombstone: exempt from hash verification.
    pub void: bool,

    /// Any other keys found on the line.
    pub extra: Map<String, Value>,
}

impl AuditEntry {
    /// The sentinel `prev_hash` used for the first entry in every chain.
    pub const GENESIS_HASH: &'static str = GENESIS_HASH;

    /// Build a correctly chained entry.
    pub fn chained(timestamp: impl Into<String>, data: Map<String, Value>, prev_hash: &str) -> Self {
        let timestamp = timestamp.into();
        let rolling_hash = hash_entry(&timestamp, &data, prev_hash);
        Self {
            timestamp,
            data,
            prev_hash: prev_hash.to_string(),
            rolling_hash,
            void: false,
            extra: Map::new(),
        }
    }

    /// The digest this entry should carry given its stored fields.
    pub fn expected_hash(&self) -> String {
        hash_entry(&self.timestamp, &self.data, &self.prev_hash)
    }

    /// Convert a decoded JSON object into an entry.
    ///
    /// `rolling_hash` wins over the legacy `hash` key when both are present;
    /// the loser stays in `extra`.
    pub fn from_object(mut obj: Map<String, Value>) -> Result<Self, DecodeError> {
        let timestamp = take_string(&mut obj, "timestamp")?;
        let data = match obj.remove("data") {
            Some(Value::Object(map)) => map,
            _ => return Err(DecodeError::MissingField { field: "data" }),
        };
        let prev_hash = take_string(&mut obj, "prev_hash")?;
        let rolling_hash = match obj.get(ROLLING_HASH_KEY) {
            Some(Value::String(_)) => take_string(&mut obj, ROLLING_HASH_KEY)?,
            _ => take_string(&mut obj, LEGACY_HASH_KEY)
                .map_err(|_| DecodeError::MissingField { field: ROLLING_HASH_KEY })?,
        };
        let void = match obj.remove(VOID_KEY) {
            Some(Value::Bool(b)) => b,
            Some(other) => {
                obj.insert(VOID_KEY.to_string(), other);
                false
            }
            None => false,
        };

        Ok(Self {
            timestamp,
            data,
            prev_hash,
            rolling_hash,
            void,
            extra: obj,
        })
    }

    /// Convert the entry back into a JSON object.
    pub fn to_object(&self) -> Map<String, Value> {
        let mut obj = self.extra.clone();
        obj.insert("timestamp".to_string(), Value::String(self.timestamp.clone()));
        obj.insert("data".to_string(), Value::Object(self.data.clone()));
        obj.insert("prev_hash".to_string(), Value::String(self.prev_hash.clone()));
        obj.insert(
            ROLLING_HASH_KEY.to_string(),
            Value::String(self.rolling_hash.clone()),
        );
        if self.void {
            obj.insert(VOID_KEY.to_string(), Value::Bool(true));
        }
        obj
    }
}

fn take_string(obj: &mut Map<String, Value>, field: &'static str) -> Result<String, DecodeError> {
    match obj.remove(field) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => {
            obj.insert(field.to_string(), other);
            Err(DecodeError::MissingField { field })
        }
        None => Err(DecodeError::MissingField { field }),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Line codec ────────────────────────────────────────────────────────────────

/// Decode one line into a raw JSON object without checking any field.
pub fn decode_object(line: &str) -> Result<Map<String, Value>, DecodeError> {
    let value: Value = serde_json::from_str(line).map_err(|e| DecodeError::Malformed {
        reason: e.to_string(),
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DecodeError::NotAnObject {
            found: json_type_name(&other),
        }),
    }
}

/// The digest an entry commits to: `rolling_hash`, falling back to the
/// legacy `hash` key when `rolling_hash` is absent or not a string.
pub fn stored_digest(obj: &Map<String, Value>) -> Option<&str> {
    obj.get(ROLLING_HASH_KEY)
        .and_then(Value::as_str)
        .or_else(|| obj.get(LEGACY_HASH_KEY).and_then(Value::as_str))
}

/// Decode one line into an `AuditEntry`.
pub fn decode(line: &str) -> Result<AuditEntry, DecodeError> {
    AuditEntry::from_object(decode_object(line)?)
}

/// Encode an entry as one canonical line (no trailing newline).
pub fn encode(entry: &AuditEntry) -> String {
    canonical_object(&entry.to_object())
}

/// Best-effort recovery of a malformed line.
///
/// Exactly two shapes are handled: a trailing comma, and a missing closing
/// brace.  Returns the fixed text only if it then parses as JSON.
pub fn salvage_line(line: &str) -> Option<String> {
    let mut fixed = line.trim().to_string();
    if fixed.ends_with(',') {
        fixed.pop();
    }
    if !fixed.ends_with('}') {
        fixed.push('}');
    }
    serde_json::from_str::<Value>(&fixed).ok().map(|_| fixed)
}

// ── Timestamps ────────────────────────────────────────────────────────────────

/// Parse an ISO-8601 timestamp.  Values without an offset are taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// The current UTC time as RFC 3339 with a `Z` suffix.
pub fn utc_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
