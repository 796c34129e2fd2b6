//! Hash-chain verifier for audit log files.
//!
//! `ChainVerifier` implements the `Verifier` trait from `auditchain-contracts`.
//! Each file is replayed from the genesis marker, one line at a time:
//!
//! 1. **Decode**: the line must be a JSON object.  With `repair` set, a
//!    malformed line gets one salvage attempt before it is quarantined.
//! 2. **Structure**: tombstones are counted and skipped; `timestamp` and
//!    `data` must be present and well-typed.
//! 3. **Linkage**: the stored `prev_hash` must equal the running digest, the
//!    timestamp must not move backwards, and the stored digest must match the
//!    one recomputed from the stored fields.
//!
//! Every deviation becomes an `Issue`.  Nothing is thrown on the first
//! problem: operators see every issue of every file in one run.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use auditchain_chain::{
    decode_object,
    entry::VOID_KEY,
    fsio::{atomic_write, discover_logs, sibling_path},
    hash_entry, parse_timestamp, salvage_line, stored_digest, GENESIS_HASH,
};
use auditchain_contracts::{
    issue::{bounded_text, sort_issues},
    traits::Verifier,
    AuditConfig, AuditError, AuditResult, DecodeError, Issue, IssueCode, VerifyOptions, VerifyRun,
    VerifyStats,
};

/// Placeholder written into `actual` when a field is absent.
const MISSING: &str = "<missing>";

/// The audit chain verifier.
#[derive(Debug, Clone)]
pub struct ChainVerifier {
    /// Extensions eligible for discovery.
    extensions: Vec<String>,
    /// Issue text fields are cut to this many characters.
    max_issue_length: usize,
}

impl ChainVerifier {
    pub fn new(config: &AuditConfig) -> Self {
        Self {
            extensions: config.log_extensions.clone(),
            max_issue_length: config.max_issue_length,
        }
    }

    /// Replay one file's chain and return its issues in canonical order.
    ///
    /// Only an unreadable file (or a failed side-effect write) is an error;
    /// everything found inside the file is returned as an issue.
    pub fn check_file(
        &self,
        path: &Path,
        options: VerifyOptions,
        stats: &mut VerifyStats,
    ) -> AuditResult<Vec<Issue>> {
        let bytes = fs::read(path).map_err(|e| AuditError::io(path, e))?;
        let contents = String::from_utf8_lossy(&bytes);
        let mut walk = FileWalk::new(path.display().to_string(), self.max_issue_length);

        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            stats.lines += 1;
            walk.check_line(idx + 1, line, options, stats);
        }

        if options.quarantine && !walk.bad_lines.is_empty() {
            let bad = sibling_path(path, "bad");
            atomic_write(&bad, joined(&walk.bad_lines).as_bytes())?;
            info!(
                path = %bad.display(),
                lines = walk.bad_lines.len(),
                "quarantined unrecoverable lines"
            );
        }
        if options.repair && !walk.repaired_lines.is_empty() {
            let repairable = sibling_path(path, "repairable");
            atomic_write(&repairable, joined(&walk.repaired_lines).as_bytes())?;
            info!(
                path = %repairable.display(),
                lines = walk.repaired_lines.len(),
                "wrote salvaged lines"
            );
        }

        let mut issues = walk.issues;
        sort_issues(&mut issues);
        Ok(issues)
    }
}

impl Verifier for ChainVerifier {
    fn discover(&self, target: &Path) -> AuditResult<Vec<PathBuf>> {
        let logs = discover_logs(target, &self.extensions)?;
        debug!(dir = %target.display(), count = logs.len(), "discovered audit logs");
        Ok(logs)
    }

    /// Verify every file in `paths`.
    ///
    /// Files are processed in lexicographic order regardless of the order
    /// given, so side effects and logs are reproducible.
    fn verify(&self, paths: &[PathBuf], options: VerifyOptions) -> AuditResult<VerifyRun> {
        let mut ordered = paths.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut run = VerifyRun::default();
        run.stats.files = ordered.len();

        for path in &ordered {
            let key = path.display().to_string();
            match self.check_file(path, options, &mut run.stats) {
                Ok(issues) => {
                    if issues.is_empty() {
                        run.stats.valid_files += 1;
                        debug!(path = %key, "chain verified clean");
                    } else {
                        warn!(path = %key, issues = issues.len(), "chain has issues");
                    }
                    run.issues_by_path.insert(key, issues);
                }
                Err(e) => {
                    warn!(path = %key, error = %e, "could not verify file");
                    run.errors.insert(key, e.to_string());
                }
            }
        }

        run.percent_valid = if run.stats.files == 0 {
            0.0
        } else {
            run.stats.valid_files as f64 / run.stats.files as f64 * 100.0
        };

        info!(
            files = run.stats.files,
            valid_files = run.stats.valid_files,
            issues = run.issues_total(),
            errors = run.errors.len(),
            "verification complete"
        );
        Ok(run)
    }
}

// ── Per-file walk ─────────────────────────────────────────────────────────────

/// Running chain state for one file.
struct FileWalk {
    path: String,
    max_len: usize,
    /// Digest the next chained entry must link to.
    prev: String,
    /// No chained entry seen yet.
    first: bool,
    /// Timestamp of the previous chained entry, parsed and raw.
    prev_ts: Option<(DateTime<Utc>, String)>,
    issues: Vec<Issue>,
    bad_lines: Vec<String>,
    repaired_lines: Vec<String>,
}

impl FileWalk {
    fn new(path: String, max_len: usize) -> Self {
        Self {
            path,
            max_len,
            prev: GENESIS_HASH.to_string(),
            first: true,
            prev_ts: None,
            issues: Vec::new(),
            bad_lines: Vec::new(),
            repaired_lines: Vec::new(),
        }
    }

    fn record(&mut self, code: IssueCode, lineno: usize, what: &str, expected: &str, actual: &str) {
        debug!(path = %self.path, line = lineno, code = %code, "issue recorded");
        let issue = Issue {
            code,
            path: self.path.clone(),
            details: format!("line {lineno}: {what}"),
            expected: expected.to_string(),
            actual: actual.to_string(),
        };
        self.issues.push(issue.bounded(self.max_len));
    }

    fn quarantine(&mut self, line: &str, stats: &mut VerifyStats) {
        self.bad_lines.push(line.to_string());
        stats.quarantined += 1;
    }

    fn check_line(
        &mut self,
        lineno: usize,
        line: &str,
        options: VerifyOptions,
        stats: &mut VerifyStats,
    ) {
        let obj = match self.decode_line(lineno, line, options, stats) {
            Some(obj) => obj,
            None => return,
        };

        if obj.get(VOID_KEY) == Some(&Value::Bool(true)) {
            stats.void_entries += 1;
            return;
        }

        let data = match obj.get("data") {
            Some(Value::Object(map)) => map,
            other => {
                let actual = other.map(json_type_name).unwrap_or(MISSING);
                self.record(
                    IssueCode::MissingField,
                    lineno,
                    "data field missing or not an object",
                    "object",
                    actual,
                );
                self.quarantine(line, stats);
                return;
            }
        };
        let timestamp = match obj.get("timestamp") {
            Some(Value::String(ts)) => ts.as_str(),
            other => {
                let actual = other.map(json_type_name).unwrap_or(MISSING);
                self.record(
                    IssueCode::MissingField,
                    lineno,
                    "timestamp field missing or not a string",
                    "ISO-8601 timestamp",
                    actual,
                );
                self.quarantine(line, stats);
                return;
            }
        };

        let stored_prev = obj.get("prev_hash").and_then(Value::as_str);
        if stored_prev != Some(self.prev.as_str()) {
            let (code, what) = if self.first {
                (IssueCode::GenesisMarkerMismatch, "first entry does not link to genesis")
            } else {
                (IssueCode::ChainPrevMismatch, "prev hash mismatch")
            };
            let expected = self.prev.clone();
            self.record(code, lineno, what, &expected, stored_prev.unwrap_or(MISSING));
        }

        let parsed = parse_timestamp(timestamp);
        let out_of_order = match (&parsed, &self.prev_ts) {
            (Some(current), Some((previous, previous_raw))) if current < previous => {
                Some(previous_raw.clone())
            }
            _ => None,
        };
        if parsed.is_none() {
            self.record(
                IssueCode::MissingField,
                lineno,
                "timestamp is not ISO-8601",
                "ISO-8601 timestamp",
                timestamp,
            );
        } else if let Some(previous_raw) = out_of_order {
            self.record(
                IssueCode::TimestampOrderViolation,
                lineno,
                "timestamp precedes previous entry",
                &previous_raw,
                timestamp,
            );
        }

        let basis = stored_prev.unwrap_or(self.prev.as_str());
        let expected = hash_entry(timestamp, data, basis);
        let stored = stored_digest(&obj);
        if stored != Some(expected.as_str()) {
            self.record(
                IssueCode::HashMismatch,
                lineno,
                "hash mismatch",
                &expected,
                stored.unwrap_or(MISSING),
            );
        }

        if let Some(stored) = stored {
            self.prev = stored.to_string();
        }
        self.first = false;
        if let Some(current) = parsed {
            self.prev_ts = Some((current, timestamp.to_string()));
        }
    }

    /// Decode one line, salvaging it when allowed.  `None` means the line was
    /// recorded as unrecoverable and takes no part in the chain.
    fn decode_line(
        &mut self,
        lineno: usize,
        line: &str,
        options: VerifyOptions,
        stats: &mut VerifyStats,
    ) -> Option<Map<String, Value>> {
        let reason = match decode_object(line) {
            Ok(obj) => return Some(obj),
            Err(DecodeError::NotAnObject { found }) => {
                self.record(
                    IssueCode::NotAnObject,
                    lineno,
                    "line is not a JSON object",
                    "object",
                    found,
                );
                self.quarantine(line, stats);
                return None;
            }
            Err(e) => e.to_string(),
        };

        if options.repair {
            if let Some(fixed) = salvage_line(line) {
                if let Ok(obj) = decode_object(&fixed) {
                    debug!(path = %self.path, line = lineno, "salvaged malformed line");
                    stats.fixed += 1;
                    self.repaired_lines.push(fixed);
                    return Some(obj);
                }
            }
            stats.unrecoverable += 1;
        }

        let actual = bounded_text(line.trim(), self.max_len);
        self.record(IssueCode::MalformedJson, lineno, &reason, "JSON object", &actual);
        self.quarantine(line, stats);
        None
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

fn joined(lines: &[String]) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}
