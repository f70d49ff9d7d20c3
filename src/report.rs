use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::drift::{Delta, Severity};
use crate::error::DriftError;
use crate::remediation::{AuditStatus, RemediationRecord};
use crate::snapshot::SnapshotMeta;

/// Process exit codes for a completed or failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Clean = 0,
    Findings = 1,
    InputError = 2,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Everything the assembler needs besides the two result streams.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub policy_name: Option<String>,
    pub baseline: SnapshotMeta,
    pub current: SnapshotMeta,
    pub issues: Vec<DriftError>,
    pub passed_controls: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ReportSummary {
    pub total_deltas: usize,
    pub deltas_by_severity: BTreeMap<Severity, usize>,
    pub passed_controls: usize,
    pub failed_controls: usize,
    pub errored_controls: usize,
    pub missing_guidance: usize,
    pub cross_platform_fixes: usize,
    pub malformed_nodes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub policy_name: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub baseline: SnapshotMeta,
    pub current: SnapshotMeta,
    pub summary: ReportSummary,
    pub issues: Vec<DriftError>,
    pub deltas: Vec<Delta>,
    pub remediations: Vec<RemediationRecord>,
}

impl AuditReport {
    /// Merge classified deltas and remediation records into one document.
    ///
    /// Deltas are ordered by severity (highest first) then path; records by
    /// status (ERROR first) then control id.
    pub fn assemble(
        context: ReportContext,
        mut deltas: Vec<Delta>,
        mut remediations: Vec<RemediationRecord>,
    ) -> Self {
        deltas.sort_by(|a, b| {
            Reverse(a.severity)
                .cmp(&Reverse(b.severity))
                .then_with(|| a.item_path.cmp(&b.item_path))
        });
        remediations.sort_by(|a, b| {
            Reverse(a.status)
                .cmp(&Reverse(b.status))
                .then_with(|| compare_control_ids(&a.control_id, &b.control_id))
        });

        let mut deltas_by_severity = BTreeMap::new();
        for delta in &deltas {
            *deltas_by_severity.entry(delta.severity).or_insert(0) += 1;
        }
        let summary = ReportSummary {
            total_deltas: deltas.len(),
            deltas_by_severity,
            passed_controls: context.passed_controls,
            failed_controls: count_status(&remediations, AuditStatus::Fail),
            errored_controls: count_status(&remediations, AuditStatus::Error),
            missing_guidance: remediations
                .iter()
                .filter(|r| matches!(r.error, Some(DriftError::MissingPolicy { .. })))
                .count(),
            cross_platform_fixes: remediations.iter().filter(|r| r.cross_platform).count(),
            malformed_nodes: context.issues.len(),
        };

        Self {
            policy_name: context.policy_name,
            generated_at: Utc::now(),
            baseline: context.baseline,
            current: context.current,
            summary,
            issues: context.issues,
            deltas,
            remediations,
        }
    }

    pub fn has_findings(&self) -> bool {
        !self.deltas.is_empty() || !self.remediations.is_empty()
    }

    pub fn exit_status(&self) -> ExitStatus {
        if self.has_findings() {
            ExitStatus::Findings
        } else {
            ExitStatus::Clean
        }
    }
}

fn count_status(records: &[RemediationRecord], status: AuditStatus) -> usize {
    records.iter().filter(|r| r.status == status).count()
}

/// Order dotted control ids numerically where segments are numbers, so
/// `5.2.9` sorts before `5.2.10`.
pub fn compare_control_ids(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(xn), Ok(yn)) => xn.cmp(&yn),
                    _ => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}
