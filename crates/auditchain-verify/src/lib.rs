//! # auditchain-verify
//!
//! Audit log verification.
//!
//! This crate provides [`engine::ChainVerifier`], which implements the
//! [`auditchain_contracts::traits::Verifier`] trait.  It replays each log
//! file's hash chain from the genesis marker and classifies every deviation
//! into a typed `Issue`:
//!
//! - **Decode**: `malformed_json`, `not_an_object`
//! - **Structure**: `missing_field`, `timestamp_order_violation`
//! - **Chain**: `genesis_marker_mismatch`, `chain_prev_mismatch`,
//!   `hash_mismatch`
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use auditchain_contracts::{traits::Verifier, AuditConfig, VerifyOptions};
//! use auditchain_verify::{ChainVerifier, VerifyResultDoc};
//!
//! let config = AuditConfig::default();
//! let verifier = ChainVerifier::new(&config);
//! let run = verifier.verify_dir("logs".as_ref(), VerifyOptions::default())?;
//! VerifyResultDoc::from_run(&run, &config).persist(&config.verify_result_path())?;
//! ```

pub mod engine;
pub mod report;

pub use engine::ChainVerifier;
pub use report::VerifyResultDoc;

// ── Tests ─────────────────────────────────────────────────────────────────────
