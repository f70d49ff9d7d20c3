use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{DriftError, DriftResult};
use crate::snapshot::{join_path, ItemValue, Numeric, Scalar, Snapshot};

const ENVELOPE_KEYS: [&str; 7] = [
    "id",
    "source_host",
    "hostname",
    "os",
    "timestamp",
    "items",
    "config",
];

/// Snapshot plus the nodes the loader had to reshape or reject.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub snapshot: Snapshot,
    pub issues: Vec<DriftError>,
}

/// On-disk snapshot envelope. Bare documents are accepted too.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSnapshot {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "hostname")]
    pub source_host: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(alias = "config")]
    pub items: Value,
}

/// Turn a raw nested document into a canonical snapshot.
///
/// Nested objects are flattened into dotted item paths. Lists of one scalar
/// type become sets; anything else is flattened by index and reported as an
/// issue. `null` leaves are dropped.
pub fn canonicalize(
    id: impl Into<String>,
    source_host: impl Into<String>,
    timestamp: DateTime<Utc>,
    document: &Value,
) -> DriftResult<LoadOutcome> {
    let Value::Object(root) = document else {
        return Err(DriftError::MalformedSnapshot {
            path: "$".to_string(),
            reason: format!("top-level document must be an object, found {}", json_kind(document)),
        });
    };

    let mut items = BTreeMap::new();
    let mut issues = Vec::new();
    flatten_object("", root, &mut items, &mut issues);

    for issue in &issues {
        warn!("{issue}");
    }
    let snapshot = Snapshot::new(id, source_host, timestamp, items);
    debug!(
        snapshot = %snapshot.id,
        items = snapshot.len(),
        issues = issues.len(),
        "canonicalized snapshot"
    );
    Ok(LoadOutcome { snapshot, issues })
}

/// Read a JSON or YAML snapshot file, envelope or bare document.
pub fn load_snapshot_file(path: &Path) -> Result<LoadOutcome> {
    let document = read_document(path)?;
    let fallback_id = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "snapshot".to_string());

    let mut ignored = Vec::new();
    let raw = if is_envelope(&document) {
        ignored = unknown_envelope_keys(&document);
        serde_json::from_value::<RawSnapshot>(document)
            .with_context(|| format!("invalid snapshot envelope: {}", path.display()))?
    } else {
        RawSnapshot {
            id: None,
            source_host: None,
            os: None,
            timestamp: None,
            items: document,
        }
    };

    let mut outcome = canonicalize(
        raw.id.unwrap_or(fallback_id),
        raw.source_host.unwrap_or_else(|| "unknown".to_string()),
        raw.timestamp.unwrap_or_else(Utc::now),
        &raw.items,
    )
    .with_context(|| format!("failed canonicalizing snapshot: {}", path.display()))?;
    if let Some(os) = raw.os {
        outcome.snapshot = outcome.snapshot.with_os(os);
    }
    for key in ignored {
        let issue = DriftError::MalformedSnapshot {
            path: key,
            reason: "unrecognised envelope key ignored; item data belongs under `items`"
                .to_string(),
        };
        warn!("{issue}");
        outcome.issues.push(issue);
    }
    Ok(outcome)
}

/// Parse a JSON or YAML file into a JSON value, choosing by extension.
pub fn read_document(path: &Path) -> Result<Value> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);
    if is_yaml {
        serde_yaml::from_str(&data)
            .with_context(|| format!("failed parsing YAML: {}", path.display()))
    } else {
        serde_json::from_str(&data)
            .with_context(|| format!("failed parsing JSON: {}", path.display()))
    }
}

/// An object with an `items` or `config` object is an envelope.
fn is_envelope(document: &Value) -> bool {
    let Some(map) = document.as_object() else {
        return false;
    };
    ["items", "config"]
        .iter()
        .any(|key| map.get(*key).map(Value::is_object).unwrap_or(false))
}

fn unknown_envelope_keys(document: &Value) -> Vec<String> {
    document
        .as_object()
        .map(|map| {
            map.keys()
                .filter(|k| !ENVELOPE_KEYS.contains(&k.as_str()))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

fn flatten_object(
    prefix: &str,
    map: &Map<String, Value>,
    items: &mut BTreeMap<String, ItemValue>,
    issues: &mut Vec<DriftError>,
) {
    if map.is_empty() && !prefix.is_empty() {
        insert_item(prefix.to_string(), ItemValue::Object(BTreeMap::new()), items, issues);
        return;
    }
    for (key, value) in map {
        flatten_value(join_path(prefix, key), value, items, issues);
    }
}

fn flatten_value(
    path: String,
    value: &Value,
    items: &mut BTreeMap<String, ItemValue>,
    issues: &mut Vec<DriftError>,
) {
    match value {
        Value::Null => {}
        Value::Object(child) => flatten_object(&path, child, items, issues),
        Value::Array(elements) => flatten_list(path, elements, items, issues),
        scalar => match to_scalar(scalar) {
            Some(s) => insert_item(path, ItemValue::Scalar(s), items, issues),
            None => issues.push(DriftError::MalformedSnapshot {
                path,
                reason: format!("unsupported scalar {scalar}"),
            }),
        },
    }
}

fn insert_item(
    path: String,
    item: ItemValue,
    items: &mut BTreeMap<String, ItemValue>,
    issues: &mut Vec<DriftError>,
) {
    if items.contains_key(&path) {
        issues.push(DriftError::MalformedSnapshot {
            path,
            reason: "duplicate item path after flattening; first value kept".to_string(),
        });
        return;
    }
    items.insert(path, item);
}

/// Lists of one scalar type become sets. Anything else is flattened into
/// index-keyed items (`mounts.0`, `mounts.1.path`) so every leaf goes
/// through the same duplicate check as object keys.
fn flatten_list(
    path: String,
    elements: &[Value],
    items: &mut BTreeMap<String, ItemValue>,
    issues: &mut Vec<DriftError>,
) {
    let scalars: Option<Vec<Scalar>> = elements.iter().map(to_scalar).collect();
    if let Some(scalars) = scalars {
        let first_kind = scalars.first().map(std::mem::discriminant);
        if scalars
            .iter()
            .all(|s| Some(std::mem::discriminant(s)) == first_kind)
        {
            let set = scalars.into_iter().collect::<BTreeSet<_>>();
            insert_item(path, ItemValue::List(set), items, issues);
            return;
        }
    }

    let kinds: BTreeSet<&str> = elements.iter().map(json_kind).collect();
    issues.push(DriftError::MalformedSnapshot {
        path: path.clone(),
        reason: format!(
            "heterogeneous list elements ({}); kept as indexed children",
            kinds.into_iter().collect::<Vec<_>>().join(", ")
        ),
    });
    for (idx, element) in elements.iter().enumerate() {
        flatten_value(join_path(&path, &idx.to_string()), element, items, issues);
    }
}

fn to_scalar(value: &Value) -> Option<Scalar> {
    match value {
        Value::Bool(b) => Some(Scalar::Bool(*b)),
        Value::Number(n) => Numeric::from_json(n).map(Scalar::Number),
        Value::String(s) => Some(Scalar::Text(s.clone())),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
