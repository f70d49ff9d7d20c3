pub mod policy;
pub mod resolver;
pub mod template;

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::DriftError;

pub use policy::{load_audit_results, load_policy_file, LoadedPolicy, PolicyIndex};
pub use resolver::{resolve, resolve_all};
pub use template::{placeholders, render};

/// Shell or tooling a remediation template is written for, e.g. `bash`.
///
/// Tags are free-form and lowercased so a new platform only needs new
/// guidance entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PlatformTag(String);

impl PlatformTag {
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self(tag.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PlatformTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for PlatformTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformSelector {
    Exact(PlatformTag),
    /// Prefer the platform native to the audited host, when known.
    Auto { preferred: Option<PlatformTag> },
}

impl PlatformSelector {
    pub fn preferred(&self) -> Option<&PlatformTag> {
        match self {
            Self::Exact(tag) => Some(tag),
            Self::Auto { preferred } => preferred.as_ref(),
        }
    }
}

#[derive(Debug, Error)]
#[error("platform selector must not be empty")]
pub struct PlatformParseError;

impl FromStr for PlatformSelector {
    type Err = PlatformParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = PlatformTag::new(s);
        match tag.as_str() {
            "" => Err(PlatformParseError),
            "auto" => Ok(Self::Auto { preferred: None }),
            _ => Ok(Self::Exact(tag)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditStatus {
    #[serde(alias = "pass", alias = "Pass")]
    Pass,
    #[serde(alias = "fail", alias = "Fail")]
    Fail,
    #[serde(alias = "error", alias = "Error")]
    Error,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
        }
    }

    pub fn needs_remediation(&self) -> bool {
        matches!(self, Self::Fail | Self::Error)
    }
}

impl Display for AuditStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one compliance check, produced by an external auditor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditResult {
    #[serde(alias = "id")]
    pub control_id: String,
    pub status: AuditStatus,
    #[serde(default, deserialize_with = "string_map")]
    pub variables: BTreeMap<String, String>,
}

impl AuditResult {
    pub fn new(control_id: impl Into<String>, status: AuditStatus) -> Self {
        Self {
            control_id: control_id.into(),
            status,
            variables: BTreeMap::new(),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyControl {
    pub control_id: String,
    pub description: String,
    pub platform_guidance: BTreeMap<PlatformTag, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemediationRecord {
    pub control_id: String,
    pub status: AuditStatus,
    pub rationale: String,
    pub fix_command: Option<String>,
    pub platform: Option<PlatformTag>,
    /// Guidance was written for a different platform than requested.
    pub cross_platform: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DriftError>,
}

/// Render a JSON scalar as plain text; compound values keep their JSON form.
pub(crate) fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn string_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, String>, D::Error> {
    let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| value_to_text(&v).map(|text| (k, text)))
        .collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{AuditResult, AuditStatus, PlatformSelector, PlatformTag};

    #[test]
    fn parses_platform_selectors() {
        assert_eq!(
            "auto".parse::<PlatformSelector>().expect("auto"),
            PlatformSelector::Auto { preferred: None }
        );
        assert_eq!(
            " PowerShell ".parse::<PlatformSelector>().expect("exact"),
            PlatformSelector::Exact(PlatformTag::new("powershell"))
        );
        assert!("".parse::<PlatformSelector>().is_err());
    }

    #[test]
    fn audit_result_variables_are_stringified() {
        let result: AuditResult = serde_json::from_value(json!({
            "id": "5.2.10",
            "status": "fail",
            "variables": { "user": "alice", "max_days": 90, "unset": null }
        }))
        .expect("parse");
        assert_eq!(result.status, AuditStatus::Fail);
        assert_eq!(result.variables.get("max_days").map(String::as_str), Some("90"));
        assert!(!result.variables.contains_key("unset"));
    }
}
