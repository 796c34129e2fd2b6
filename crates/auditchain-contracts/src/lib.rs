//! # auditchain-contracts
//!
//! Shared types, report schemas, and contracts for the auditchain toolkit.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions, configuration, trait seams and error
//! types.

pub mod baseline;
pub mod config;
pub mod convergence;
pub mod error;
pub mod issue;
pub mod plan;
pub mod receipt;
pub mod traits;

pub use config::AuditConfig;
pub use error::{AuditError, AuditResult, DecodeError};
pub use issue::{Issue, IssueCode, VerifyOptions, VerifyRun, VerifyStats};
pub use plan::SCHEMA_VERSION;
