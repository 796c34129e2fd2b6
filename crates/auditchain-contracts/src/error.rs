//! Error types for the auditchain toolkit.
//!
//! Fallible operations return `AuditResult<T>`.  Per-line problems found
//! while scanning a log are never errors: they become `Issue` values and are
//! collected.  The variants here cover what genuinely stops an operation.

use std::path::Path;

use thiserror::Error;

/// Why a single log line could not be decoded into an `AuditEntry`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The line is not valid JSON.
    #[error("malformed JSON: {reason}")]
    Malformed { reason: String },

    /// The line is valid JSON but not a key/value mapping.
    #[error("not a JSON object (found {found})")]
    NotAnObject { found: &'static str },

    /// The object lacks a field every chained entry must carry.
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },
}

/// The unified error type for the auditchain crates.
#[derive(Debug, Error)]
pub enum AuditError {
    /// A file or directory could not be read or written.
    #[error("I/O error on '{path}': {reason}")]
    Io { path: String, reason: String },

    /// A line failed to decode where decoding was mandatory.
    #[error("decode error in '{path}': {source}")]
    Decode {
        path: String,
        #[source]
        source: DecodeError,
    },

    /// A file selected for `rebuild_chain` holds an entry that cannot be
    /// rebuilt.  The file is left untouched.
    #[error("'{path}' is not rebuildable: {reason}")]
    NotRebuildable { path: String, reason: String },

    /// The caller attempted to apply repairs without explicit opt-in.
    #[error("refusing to apply repairs without explicit authorization")]
    ApplyNotAuthorized,

    /// Baseline capture was refused because the target is not in an
    /// acceptable state.
    #[error("refusing to capture baseline: {reason}")]
    BaselineRefused { reason: String },

    /// The target directory does not exist.
    #[error("target not found: {path}")]
    TargetNotFound { path: String },

    /// A configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// A document could not be serialized or deserialized.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },
}

impl AuditError {
    /// Wrap a `std::io::Error` with the path it occurred on.
    pub fn io(path: &Path, err: std::io::Error) -> Self {
        AuditError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }

    /// Wrap a `serde_json::Error` raised while handling `what`.
    pub fn json(what: impl std::fmt::Display, err: serde_json::Error) -> Self {
        AuditError::Serialization {
            reason: format!("{what}: {err}"),
        }
    }
}

/// Convenience alias used throughout the auditchain crates.
pub type AuditResult<T> = Result<T, AuditError>;
