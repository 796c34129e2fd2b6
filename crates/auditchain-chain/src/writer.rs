//! File-backed producer API.
//!
//! `FileChainWriter` is how producers outside the toolkit append to a log
//! they own.  Opening a writer replays the file once to find the tail digest
//! (the last non-void entry's `rolling_hash`, or `GENESIS_HASH` for a new or
//! empty file); every `append` then writes exactly one canonical line.
//!
//! One writer per file.  The writer does not lock: callers must not let two
//! producers interleave writes into the same file.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info};

use auditchain_contracts::{traits::ChainSink, AuditError, AuditResult};

use crate::{
    chain::canonical_object,
    entry::{
        decode_object, encode, stored_digest, AuditEntry, GENESIS_HASH, VOID_KEY,
    },
    fsio::append_line,
};

/// An append-only writer for one audit log file.
#[derive(Debug)]
pub struct FileChainWriter {
    path: PathBuf,
    last_hash: String,
    appended: usize,
}

impl FileChainWriter {
    /// Open (or prepare to create) the log at `path`.
    ///
    /// Lines that fail to decode are ignored when locating the tail; the
    /// verifier is the place to report them.
    pub fn open(path: impl Into<PathBuf>) -> AuditResult<Self> {
        let path = path.into();
        let last_hash = tail_hash_of(&path)?;
        debug!(path = %path.display(), tail = %last_hash, "opened chain writer");
        Ok(Self {
            path,
            last_hash,
            appended: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry and return it.
    pub fn append_entry(
        &mut self,
        timestamp: &str,
        data: Map<String, Value>,
    ) -> AuditResult<AuditEntry> {
        let entry = AuditEntry::chained(timestamp, data, &self.last_hash);
        append_line(&self.path, &encode(&entry))?;
        self.last_hash = entry.rolling_hash.clone();
        self.appended += 1;
        Ok(entry)
    }

    /// Append a sealed tombstone standing in for an unrecoverable line.
    ///
    /// Tombstones do not advance the chain.
    pub fn append_void(&mut self, timestamp: &str, reason: &str) -> AuditResult<()> {
        let mut obj = Map::new();
        obj.insert("timestamp".to_string(), Value::String(timestamp.to_string()));
        obj.insert(VOID_KEY.to_string(), Value::Bool(true));
        obj.insert("reason".to_string(), Value::String(reason.to_string()));
        append_line(&self.path, &canonical_object(&obj))
    }

    /// Number of entries appended through this writer.
    pub fn appended(&self) -> usize {
        self.appended
    }
}

impl ChainSink for FileChainWriter {
    fn append(&mut self, timestamp: &str, data: Map<String, Value>) -> AuditResult<String> {
        Ok(self.append_entry(timestamp, data)?.rolling_hash)
    }

    fn tail_hash(&self) -> &str {
        &self.last_hash
    }
}

impl Drop for FileChainWriter {
    fn drop(&mut self) {
        if self.appended > 0 {
            info!(
                path = %self.path.display(),
                appended = self.appended,
                tail = %self.last_hash,
                "chain writer closed"
            );
        }
    }
}

/// The digest the next entry appended to `path` must chain to.
pub fn tail_hash_of(path: &Path) -> AuditResult<String> {
    if !path.exists() {
        return Ok(GENESIS_HASH.to_string());
    }
    let contents = fs::read_to_string(path).map_err(|e| AuditError::io(path, e))?;
    let mut last = GENESIS_HASH.to_string();
    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        let Ok(obj) = decode_object(line) else {
            continue;
        };
        if obj.get(VOID_KEY) == Some(&Value::Bool(true)) {
            continue;
        }
        if let Some(digest) = stored_digest(&obj) {
            last = digest.to_string();
        }
    }
    Ok(last)
}

/// Read back every chained entry of `path`, in file order.
///
/// Blank lines and tombstones are skipped; the first line that fails to
/// decode aborts the read with `AuditError::Decode`.
pub fn read_entries(path: &Path) -> AuditResult<Vec<AuditEntry>> {
    let contents = fs::read_to_string(path).map_err(|e| AuditError::io(path, e))?;
    let mut entries = Vec::new();
    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        let decoded = decode_object(line).and_then(|obj| {
            if obj.get(VOID_KEY) == Some(&Value::Bool(true)) {
                Ok(None)
            } else {
                AuditEntry::from_object(obj).map(Some)
            }
        });
        match decoded {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => {}
            Err(source) => {
                return Err(AuditError::Decode {
                    path: path.display().to_string(),
                    source,
                })
            }
        }
    }
    Ok(entries)
}
