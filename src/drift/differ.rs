use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::drift::severity::Severity;
use crate::error::{DriftError, DriftResult};
use crate::snapshot::{ItemValue, Scalar, Snapshot};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeltaKind {
    #[serde(rename = "Addition", alias = "added", alias = "Added", alias = "addition")]
    Added,
    #[serde(rename = "Removal", alias = "removed", alias = "Removed", alias = "removal")]
    Removed,
    #[serde(
        rename = "Modification",
        alias = "modified",
        alias = "Modified",
        alias = "modification"
    )]
    Modified,
}

impl DeltaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "Addition",
            Self::Removed => "Removal",
            Self::Modified => "Modification",
        }
    }

    pub fn inverse(self) -> Self {
        match self {
            Self::Added => Self::Removed,
            Self::Removed => Self::Added,
            Self::Modified => Self::Modified,
        }
    }
}

impl Display for DeltaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Members gained and lost by a list item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListChange {
    pub added: Vec<Scalar>,
    pub removed: Vec<Scalar>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delta {
    #[serde(rename = "item")]
    pub item_path: String,
    #[serde(rename = "type")]
    pub kind: DeltaKind,
    #[serde(rename = "baseline")]
    pub baseline_value: Option<ItemValue>,
    #[serde(rename = "current")]
    pub current_value: Option<ItemValue>,
    #[serde(rename = "impact")]
    pub severity: Severity,
    #[serde(rename = "list_change", skip_serializing_if = "Option::is_none")]
    pub list_change: Option<ListChange>,
}

impl Delta {
    /// The same change seen from the other side.
    pub fn reversed(&self) -> Self {
        Self {
            item_path: self.item_path.clone(),
            kind: self.kind.inverse(),
            baseline_value: self.current_value.clone(),
            current_value: self.baseline_value.clone(),
            severity: self.severity,
            list_change: self.list_change.as_ref().map(|c| ListChange {
                added: c.removed.clone(),
                removed: c.added.clone(),
            }),
        }
    }

    /// One-line human description of the change.
    pub fn describe(&self) -> String {
        match (&self.baseline_value, &self.current_value, &self.list_change) {
            (_, _, Some(change)) => {
                let mut parts = Vec::new();
                if !change.added.is_empty() {
                    parts.push(format!("+{}", join_scalars(&change.added)));
                }
                if !change.removed.is_empty() {
                    parts.push(format!("-{}", join_scalars(&change.removed)));
                }
                parts.join(" ")
            }
            (Some(before), Some(after), None) => format!("{before} -> {after}"),
            (None, Some(after), None) => format!("added {after}"),
            (Some(before), None, None) => format!("removed {before}"),
            (None, None, None) => String::new(),
        }
    }
}

fn join_scalars(values: &[Scalar]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Compare two snapshots, failing fast when either side is missing.
pub fn diff_snapshots(
    baseline: Option<&Snapshot>,
    current: Option<&Snapshot>,
) -> DriftResult<Vec<Delta>> {
    match (baseline, current) {
        (Some(baseline), Some(current)) => Ok(diff(baseline, current)),
        (None, _) => Err(DriftError::InputContract(
            "baseline snapshot is required".to_string(),
        )),
        (_, None) => Err(DriftError::InputContract(
            "current snapshot is required".to_string(),
        )),
    }
}

/// Leaf-level differences between two snapshots, ordered by item path.
///
/// Deltas start at `Severity::Info`; classification is a separate pass.
pub fn diff(baseline: &Snapshot, current: &Snapshot) -> Vec<Delta> {
    if baseline.digest() == current.digest() {
        debug!(
            baseline = %baseline.id,
            current = %current.id,
            "snapshot digests match, no drift"
        );
        return Vec::new();
    }

    let old_map = leaf_map(baseline);
    let new_map = leaf_map(current);

    let mut paths = BTreeSet::new();
    paths.extend(old_map.keys().cloned());
    paths.extend(new_map.keys().cloned());

    let mut deltas = Vec::new();
    for path in paths {
        match (old_map.get(&path), new_map.get(&path)) {
            (None, Some(new_v)) => deltas.push(Delta {
                item_path: path,
                kind: DeltaKind::Added,
                baseline_value: None,
                current_value: Some((*new_v).clone()),
                severity: Severity::Info,
                list_change: None,
            }),
            (Some(old_v), None) => deltas.push(Delta {
                item_path: path,
                kind: DeltaKind::Removed,
                baseline_value: Some((*old_v).clone()),
                current_value: None,
                severity: Severity::Info,
                list_change: None,
            }),
            (Some(old_v), Some(new_v)) => {
                if let Some(list_change) = compare_leaves(old_v, new_v) {
                    deltas.push(Delta {
                        item_path: path,
                        kind: DeltaKind::Modified,
                        baseline_value: Some((*old_v).clone()),
                        current_value: Some((*new_v).clone()),
                        severity: Severity::Info,
                        list_change,
                    });
                }
            }
            (None, None) => {}
        }
    }

    deltas.sort_by(|a, b| a.item_path.cmp(&b.item_path));
    debug!(
        baseline = %baseline.id,
        current = %current.id,
        deltas = deltas.len(),
        "computed snapshot diff"
    );
    deltas
}

fn leaf_map(snapshot: &Snapshot) -> BTreeMap<String, &ItemValue> {
    let mut leaves = Vec::new();
    for (path, value) in snapshot.items() {
        value.leaves(path, &mut leaves);
    }
    let mut map = BTreeMap::new();
    for (path, value) in leaves {
        map.entry(path).or_insert(value);
    }
    map
}

/// `None` when equal, `Some(list_change)` when modified.
fn compare_leaves(old_v: &ItemValue, new_v: &ItemValue) -> Option<Option<ListChange>> {
    match (old_v, new_v) {
        (ItemValue::Scalar(a), ItemValue::Scalar(b)) => (a != b).then_some(None),
        (ItemValue::List(a), ItemValue::List(b)) => {
            if a == b {
                return None;
            }
            Some(Some(ListChange {
                added: b.difference(a).cloned().collect(),
                removed: a.difference(b).cloned().collect(),
            }))
        }
        (ItemValue::Object(a), ItemValue::Object(b)) => (a != b).then_some(None),
        _ => Some(None),
    }
}
