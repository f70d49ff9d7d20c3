//! Configuration drift detection and compliance remediation guidance.
//!
//! Two canonical snapshots are diffed into typed deltas and classified by
//! ordered impact rules; failed compliance checks are mapped to rendered,
//! platform-specific fix commands. Both streams meet in an [`report::AuditReport`].

pub mod config;
pub mod drift;
pub mod error;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod remediation;
pub mod report;
pub mod snapshot;

pub use error::{DriftError, DriftResult};
