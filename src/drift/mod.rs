pub mod differ;
pub mod severity;

pub use differ::{diff, diff_snapshots, Delta, DeltaKind, ListChange};
pub use severity::{load_rule_file, ImpactRule, RuleSet, Severity};

use crate::error::DriftResult;
use crate::snapshot::Snapshot;

/// Diff two snapshots and classify every delta against `rules`.
pub fn detect_drift(
    baseline: Option<&Snapshot>,
    current: Option<&Snapshot>,
    rules: &RuleSet,
) -> DriftResult<Vec<Delta>> {
    let deltas = diff_snapshots(baseline, current)?;
    Ok(rules.classify_all(deltas))
}
