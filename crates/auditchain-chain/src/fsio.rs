//! Filesystem helpers shared by every component that touches a log or
//! persists a document.
//!
//! All whole-file replacement goes through `atomic_write`: the new bytes are
//! written to a uniquely named sibling and renamed over the original, so a
//! crash leaves either the old or the new file intact.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;
use uuid::Uuid;

use auditchain_contracts::{AuditError, AuditResult};

/// Replace `path` with `contents` via write-temp-then-rename.
pub fn atomic_write(path: &Path, contents: &[u8]) -> AuditResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| AuditError::io(parent, e))?;
    }
    let temp_path = sibling_path(path, &format!("{}.tmp", Uuid::new_v4().simple()));

    let write_result = (|| -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        Ok(())
    })();
    if let Err(e) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(AuditError::io(&temp_path, e));
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        AuditError::io(path, e)
    })?;
    debug!(path = %path.display(), bytes = contents.len(), "atomically replaced file");
    Ok(())
}

/// Serialize `value` as pretty JSON with a trailing newline and write it
/// atomically.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> AuditResult<()> {
    let mut rendered =
        serde_json::to_string_pretty(value).map_err(|e| AuditError::json(path.display(), e))?;
    rendered.push('\n');
    atomic_write(path, rendered.as_bytes())
}

/// Read and deserialize a JSON document.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> AuditResult<T> {
    let contents = fs::read_to_string(path).map_err(|e| AuditError::io(path, e))?;
    serde_json::from_str(&contents).map_err(|e| AuditError::json(path.display(), e))
}

/// Append one line (a newline is added) to `path`, creating it if needed.
pub fn append_line(path: &Path, line: &str) -> AuditResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| AuditError::io(parent, e))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| AuditError::io(path, e))?;
    file.write_all(format!("{line}\n").as_bytes())
        .map_err(|e| AuditError::io(path, e))
}

/// `path` with `.suffix` appended to its full file name
/// (`a.jsonl` → `a.jsonl.bad`).
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// True if `path` looks like an audit log.
///
/// The extension must be one of `extensions` (or absent), and the first
/// non-blank line must open an object mentioning `timestamp` and `data`.
pub fn is_log_file(path: &Path, extensions: &[String]) -> bool {
    if !path.is_file() {
        return false;
    }
    let ext_ok = match path.extension().and_then(|e| e.to_str()) {
        None => true,
        Some(ext) => extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)),
    };
    if !ext_ok {
        return false;
    }
    let Ok(bytes) = fs::read(path) else {
        return false;
    };
    let text = String::from_utf8_lossy(&bytes);
    match text.lines().find(|l| !l.trim().is_empty()) {
        Some(first) => {
            let first = first.trim_start();
            first.starts_with('{') && first.contains("timestamp") && first.contains("data")
        }
        None => false,
    }
}

/// Every audit log directly inside `target`, sorted lexicographically.
pub fn discover_logs(target: &Path, extensions: &[String]) -> AuditResult<Vec<PathBuf>> {
    if !target.is_dir() {
        return Err(AuditError::TargetNotFound {
            path: target.display().to_string(),
        });
    }
    let mut logs = Vec::new();
    for entry in fs::read_dir(target).map_err(|e| AuditError::io(target, e))? {
        let entry = entry.map_err(|e| AuditError::io(target, e))?;
        let path = entry.path();
        if is_log_file(&path, extensions) {
            logs.push(path);
        }
    }
    logs.sort();
    Ok(logs)
}
