//! Per-host compare + resolve, and the parallel batch over many hosts.

use std::collections::BTreeMap;
use std::fmt::Display;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::drift::{detect_drift, RuleSet};
use crate::error::DriftResult;
use crate::remediation::{
    resolve_all, AuditResult, AuditStatus, PlatformSelector, PlatformTag, PolicyIndex,
};
use crate::report::{AuditReport, ExitStatus, ReportContext};
use crate::snapshot::LoadOutcome;

/// Frozen inputs shared read-only by every host audited in a scan cycle.
#[derive(Debug, Clone)]
pub struct AuditEngine {
    pub policy_name: Option<String>,
    rules: RuleSet,
    index: PolicyIndex,
    platform: PlatformSelector,
    os_platforms: BTreeMap<String, PlatformTag>,
}

/// One host's baseline/current pair plus its audit results.
#[derive(Debug, Clone)]
pub struct HostInput {
    pub baseline: LoadOutcome,
    pub current: LoadOutcome,
    pub results: Vec<AuditResult>,
}

/// A host that produced no report, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct HostFailure {
    pub host: String,
    pub error: String,
}

impl HostFailure {
    pub fn new(host: impl Into<String>, error: impl Display) -> Self {
        Self {
            host: host.into(),
            error: error.to_string(),
        }
    }
}

/// One batch entry: a loaded host, or why it could not be loaded.
pub type HostEntry = Result<HostInput, HostFailure>;

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub reports: Vec<AuditReport>,
    pub failures: Vec<HostFailure>,
}

impl BatchReport {
    pub fn exit_status(&self) -> ExitStatus {
        if !self.failures.is_empty() {
            ExitStatus::InputError
        } else if self.reports.iter().any(AuditReport::has_findings) {
            ExitStatus::Findings
        } else {
            ExitStatus::Clean
        }
    }
}

impl AuditEngine {
    pub fn new(
        rules: RuleSet,
        index: PolicyIndex,
        platform: PlatformSelector,
        os_platforms: BTreeMap<String, PlatformTag>,
    ) -> Self {
        Self {
            policy_name: None,
            rules,
            index,
            platform,
            os_platforms,
        }
    }

    pub fn with_policy_name(mut self, name: Option<String>) -> Self {
        self.policy_name = name;
        self
    }

    /// Resolve `auto` against the host's declared OS, when it is mapped.
    pub fn selector_for(&self, os: Option<&str>) -> PlatformSelector {
        match &self.platform {
            PlatformSelector::Auto { preferred: None } => PlatformSelector::Auto {
                preferred: os.and_then(|os| {
                    self.os_platforms
                        .get(&os.trim().to_ascii_lowercase())
                        .cloned()
                }),
            },
            other => other.clone(),
        }
    }

    pub fn audit(&self, input: &HostInput) -> DriftResult<AuditReport> {
        let baseline = &input.baseline.snapshot;
        let current = &input.current.snapshot;
        let deltas = detect_drift(Some(baseline), Some(current), &self.rules)?;

        let os = current.os.as_deref().or(baseline.os.as_deref());
        let selector = self.selector_for(os);
        let records = resolve_all(&input.results, &self.index, &selector);

        let mut issues = input.baseline.issues.clone();
        issues.extend(input.current.issues.iter().cloned());
        let context = ReportContext {
            policy_name: self.policy_name.clone(),
            baseline: baseline.meta(),
            current: current.meta(),
            issues,
            passed_controls: input
                .results
                .iter()
                .filter(|r| r.status == AuditStatus::Pass)
                .count(),
        };
        let report = AuditReport::assemble(context, deltas, records);
        info!(
            host = %current.source_host,
            deltas = report.summary.total_deltas,
            remediations = report.remediations.len(),
            "audit complete"
        );
        Ok(report)
    }

    /// Audit hosts in parallel, then merge ordered by host and snapshot id.
    ///
    /// Entries that failed to load are carried into `failures`; the other
    /// hosts are still audited.
    pub fn audit_many(&self, entries: &[HostEntry]) -> BatchReport {
        let mut outcomes: Vec<(String, String, Result<AuditReport, HostFailure>)> = entries
            .par_iter()
            .map(|entry| match entry {
                Ok(input) => {
                    let snapshot = &input.current.snapshot;
                    let outcome = self
                        .audit(input)
                        .map_err(|err| HostFailure::new(snapshot.source_host.as_str(), err));
                    (snapshot.source_host.clone(), snapshot.id.clone(), outcome)
                }
                Err(failure) => (failure.host.clone(), String::new(), Err(failure.clone())),
            })
            .collect();
        outcomes.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let mut reports = Vec::new();
        let mut failures = Vec::new();
        for (_, _, outcome) in outcomes {
            match outcome {
                Ok(report) => reports.push(report),
                Err(failure) => failures.push(failure),
            }
        }
        if !failures.is_empty() {
            warn!(
                failed = failures.len(),
                audited = reports.len(),
                "batch finished with failed hosts"
            );
        }
        BatchReport { reports, failures }
    }
}
