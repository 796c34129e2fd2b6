//! Trait seams between the toolkit's components.
//!
//! - `Verifier`: scans log files and classifies deviations into issues
//! - `ChainSink`: appends correctly chained entries on behalf of a producer
//!
//! The planner and the convergence orchestrator only see a `Verifier`, so
//! they stay pure with respect to whatever verifier output they are given.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::{
    error::AuditResult,
    issue::{VerifyOptions, VerifyRun},
};

/// Scans audit logs and reports every deviation as an `Issue`.
pub trait Verifier {
    /// List the audit logs in `target`, in lexicographic order.
    fn discover(&self, target: &Path) -> AuditResult<Vec<PathBuf>>;

    /// Verify each file in `paths`, in lexicographic order.
    ///
    /// Duplicate paths are verified once.
    /// Only side effects requested through `options` may occur.  A file that
    /// cannot be read is recorded in `VerifyRun::errors` and does not stop
    /// the remaining files.
    fn verify(&self, paths: &[PathBuf], options: VerifyOptions) -> AuditResult<VerifyRun>;

    /// Discover and verify every audit log in `target`.
    fn verify_dir(&self, target: &Path, options: VerifyOptions) -> AuditResult<VerifyRun> {
        let paths = self.discover(target)?;
        self.verify(&paths, options)
    }
}

/// An append-only destination for chained audit entries.
///
/// Implementations must treat this as append-only: entries written here are
/// never modified by the producer that wrote them.
pub trait ChainSink {
    /// Append one entry and return its `rolling_hash`.
    fn append(&mut self, timestamp: &str, data: Map<String, Value>) -> AuditResult<String>;

    /// The digest the next appended entry will chain to.
    fn tail_hash(&self) -> &str;
}
