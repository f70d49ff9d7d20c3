pub mod loader;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

pub use loader::{canonicalize, load_snapshot_file, LoadOutcome, RawSnapshot};

/// Separator between segments of an item path.
pub const PATH_SEPARATOR: char = '.';

/// Integral floats inside the `i64` range are stored as `Numeric::Int`.
const I64_BOUND: f64 = i64::MAX as f64;
const I128_BOUND: f64 = i128::MAX as f64;

/// A finite number with a total order, so it can live inside sets.
///
/// Integers keep their exact value; `Float` only holds values that are
/// fractional or outside the `i64` range. `-0.0` folds into `0`, and `80`
/// equals `80.0`.
#[derive(Debug, Clone, Copy)]
pub enum Numeric {
    Int(i128),
    Float(f64),
}

impl Numeric {
    pub fn new(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        if value.fract() == 0.0 && value.abs() < I64_BOUND {
            return Some(Self::Int(value as i128));
        }
        Some(Self::Float(value))
    }

    /// Exact conversion from a parsed JSON/YAML number.
    pub fn from_json(number: &serde_json::Number) -> Option<Self> {
        if let Some(v) = number.as_i64() {
            return Some(Self::Int(v.into()));
        }
        if let Some(v) = number.as_u64() {
            return Some(Self::Int(v.into()));
        }
        number.as_f64().and_then(Self::new)
    }
}

impl From<i64> for Numeric {
    fn from(value: i64) -> Self {
        Self::Int(value.into())
    }
}

impl From<u64> for Numeric {
    fn from(value: u64) -> Self {
        Self::Int(value.into())
    }
}

/// Exact ordering of an integer against a finite float.
fn cmp_int_float(int: i128, float: f64) -> Ordering {
    if float >= I128_BOUND {
        return Ordering::Less;
    }
    if float < -I128_BOUND {
        return Ordering::Greater;
    }
    let floor = float.floor();
    match int.cmp(&(floor as i128)) {
        Ordering::Equal if float > floor => Ordering::Less,
        other => other,
    }
}

impl PartialEq for Numeric {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Numeric {}

impl PartialOrd for Numeric {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Numeric {
    fn cmp(&self, other: &Self) -> Ordering {
        match (*self, *other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(&b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(&b),
            (Self::Int(a), Self::Float(b)) => cmp_int_float(a, b),
            (Self::Float(a), Self::Int(b)) => cmp_int_float(b, a).reverse(),
        }
    }
}

impl Display for Numeric {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

impl Serialize for Numeric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Self::Int(v) => {
                if let Ok(v) = i64::try_from(v) {
                    serializer.serialize_i64(v)
                } else if let Ok(v) = u64::try_from(v) {
                    serializer.serialize_u64(v)
                } else {
                    serializer.serialize_i128(v)
                }
            }
            Self::Float(v) => serializer.serialize_f64(v),
        }
    }
}

/// A leaf configuration value.
///
/// Variant order defines the sort order of mixed members inside a list:
/// booleans, then numbers, then text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(Numeric),
    Text(String),
}

impl Scalar {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn number(value: f64) -> Option<Self> {
        Numeric::new(value).map(Self::Number)
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ItemValue {
    Scalar(Scalar),
    /// Unordered, duplicate-free collection of scalars.
    List(BTreeSet<Scalar>),
    Object(BTreeMap<String, ItemValue>),
}

impl ItemValue {
    /// Expand nested objects into `(path, leaf)` pairs rooted at `path`.
    ///
    /// Empty objects are leaves themselves so they stay visible to the differ.
    pub fn leaves<'a>(&'a self, path: &str, out: &mut Vec<(String, &'a ItemValue)>) {
        match self {
            Self::Object(children) if !children.is_empty() => {
                for (key, child) in children {
                    child.leaves(&join_path(path, key), out);
                }
            }
            _ => out.push((path.to_string(), self)),
        }
    }
}

impl From<Scalar> for ItemValue {
    fn from(value: Scalar) -> Self {
        Self::Scalar(value)
    }
}

impl Display for ItemValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(s) => write!(f, "{s}"),
            Self::List(members) => {
                let joined = members
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{joined}]")
            }
            Self::Object(children) => {
                let joined = children
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{{joined}}}")
            }
        }
    }
}

pub fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}{PATH_SEPARATOR}{key}")
    }
}

/// Captured configuration of one host at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub source_host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    items: BTreeMap<String, ItemValue>,
    digest: String,
}

impl Snapshot {
    pub fn new(
        id: impl Into<String>,
        source_host: impl Into<String>,
        timestamp: DateTime<Utc>,
        items: BTreeMap<String, ItemValue>,
    ) -> Self {
        let canonical = serde_json::to_string(&items).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        Self {
            id: id.into(),
            timestamp,
            source_host: source_host.into(),
            os: None,
            items,
            digest,
        }
    }

    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = Some(os.into());
        self
    }

    pub fn items(&self) -> &BTreeMap<String, ItemValue> {
        &self.items
    }

    pub fn get(&self, path: &str) -> Option<&ItemValue> {
        self.items.get(path)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// SHA-256 over the canonical JSON of the items.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn meta(&self) -> SnapshotMeta {
        SnapshotMeta {
            id: self.id.clone(),
            source_host: self.source_host.clone(),
            os: self.os.clone(),
            timestamp: self.timestamp,
            digest: self.digest.clone(),
            item_count: self.items.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotMeta {
    pub id: String,
    pub source_host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub digest: String,
    pub item_count: usize,
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use chrono::Utc;
    use serde_json::json;

    use super::{ItemValue, Numeric, Scalar, Snapshot};

    #[test]
    fn numbers_compare_by_value_not_spelling() {
        assert_eq!(Numeric::new(80.0), Numeric::new(80.0));
        assert_eq!(Scalar::number(-0.0), Scalar::number(0.0));
        assert_ne!(Scalar::number(80.0).expect("finite"), Scalar::text("80"));
        assert!(Numeric::new(f64::NAN).is_none());
    }

    #[test]
    fn integral_numbers_serialize_without_fraction() {
        let value = ItemValue::Scalar(Scalar::number(22.0).expect("finite"));
        assert_eq!(serde_json::to_value(&value).expect("serialize"), json!(22));
        let value = ItemValue::Scalar(Scalar::number(0.5).expect("finite"));
        assert_eq!(serde_json::to_value(&value).expect("serialize"), json!(0.5));
    }

    #[test]
    fn large_integers_stay_exact() {
        let above = Numeric::from(9_007_199_254_740_993_i64);
        let below = Numeric::from(9_007_199_254_740_992_i64);
        assert_ne!(above, below);
        assert!(below < above);
        assert_ne!(Numeric::from(u64::MAX), Numeric::from(u64::MAX - 1));
        assert_eq!(
            serde_json::to_string(&Numeric::from(u64::MAX)).expect("serialize"),
            "18446744073709551615"
        );
    }

    #[test]
    fn integers_order_exactly_against_fractions() {
        let half = Numeric::new(2.5).expect("finite");
        assert!(Numeric::from(2_i64) < half);
        assert!(Numeric::from(3_i64) > half);
        assert!(Numeric::from(-3_i64) < Numeric::new(-2.5).expect("finite"));
        assert_eq!(Numeric::new(1.0), Some(Numeric::from(1_i64)));
        assert!(Numeric::from(u64::MAX) < Numeric::new(1e30).expect("finite"));
    }

    #[test]
    fn list_serializes_sorted() {
        let members: BTreeSet<Scalar> = ["sshd", "cron"].into_iter().map(Scalar::text).collect();
        let value = ItemValue::List(members);
        assert_eq!(
            serde_json::to_value(&value).expect("serialize"),
            json!(["cron", "sshd"])
        );
    }

    #[test]
    fn leaves_flatten_nested_objects() {
        let mut inner = BTreeMap::new();
        inner.insert("port".to_string(), ItemValue::Scalar(Scalar::text("22")));
        inner.insert("empty".to_string(), ItemValue::Object(BTreeMap::new()));
        let value = ItemValue::Object(inner);
        let mut out = Vec::new();
        value.leaves("sshd", &mut out);
        let paths: Vec<_> = out.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["sshd.empty", "sshd.port"]);
    }

    #[test]
    fn digest_depends_only_on_items() {
        let mut items = BTreeMap::new();
        items.insert("a".to_string(), ItemValue::Scalar(Scalar::Bool(true)));
        let one = Snapshot::new("s1", "host-a", Utc::now(), items.clone());
        let two = Snapshot::new("s2", "host-b", Utc::now(), items);
        assert_eq!(one.digest(), two.digest());
        assert_eq!(one.digest().len(), 64);
    }
}
