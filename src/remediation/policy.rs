use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::remediation::{value_to_text, AuditResult, AuditStatus, PlatformTag, PolicyControl};
use crate::snapshot::loader::read_document;

/// Remediation guidance as written in a policy entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FixGuidance {
    PerPlatform(BTreeMap<String, String>),
    Template(String),
}

/// One control in a policy document.
///
/// Entries that carry a `status` also describe an audit outcome.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyEntry {
    #[serde(alias = "id")]
    pub control_id: String,
    #[serde(default, alias = "title")]
    pub description: String,
    #[serde(default)]
    pub status: Option<AuditStatus>,
    #[serde(default)]
    pub current_value: Option<Value>,
    #[serde(default)]
    pub expected_value: Option<Value>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub parameter: Option<String>,
    #[serde(default, alias = "remediation_guidance", alias = "remediation")]
    pub fix: Option<FixGuidance>,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
}

impl PolicyEntry {
    fn to_control(&self, bare_fix_platform: &PlatformTag) -> PolicyControl {
        let platform_guidance = match &self.fix {
            Some(FixGuidance::Template(template)) => {
                BTreeMap::from([(bare_fix_platform.clone(), template.clone())])
            }
            Some(FixGuidance::PerPlatform(map)) => map
                .iter()
                .map(|(platform, template)| (PlatformTag::new(platform), template.clone()))
                .collect(),
            None => BTreeMap::new(),
        };
        PolicyControl {
            control_id: self.control_id.clone(),
            description: self.description.clone(),
            platform_guidance,
        }
    }

    fn to_audit_result(&self) -> Option<AuditResult> {
        let status = self.status?;
        let mut variables = BTreeMap::new();
        variables.insert("control_id".to_string(), self.control_id.clone());
        let fields = [
            ("current_value", self.current_value.as_ref().and_then(value_to_text)),
            ("expected_value", self.expected_value.as_ref().and_then(value_to_text)),
            ("target", self.target.clone()),
            ("parameter", self.parameter.clone()),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                variables.insert(name.to_string(), value);
            }
        }
        for (name, value) in &self.variables {
            if let Some(text) = value_to_text(value) {
                variables.insert(name.clone(), text);
            }
        }
        Some(AuditResult {
            control_id: self.control_id.clone(),
            status,
            variables,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PolicyDocument {
    Bundle {
        #[serde(default)]
        policy_name: Option<String>,
        /// Platform for entries whose `fix` is a single template.
        #[serde(default)]
        platform: Option<String>,
        controls: Vec<PolicyEntry>,
    },
    List(Vec<PolicyEntry>),
    Single(PolicyEntry),
}

/// Read-only `control_id -> PolicyControl` lookup.
#[derive(Debug, Clone, Default)]
pub struct PolicyIndex {
    controls: HashMap<String, PolicyControl>,
}

impl PolicyIndex {
    pub fn from_controls(controls: impl IntoIterator<Item = PolicyControl>) -> Self {
        let mut index = HashMap::new();
        for control in controls {
            if index.contains_key(&control.control_id) {
                warn!(
                    "duplicate policy control {}; keeping first definition",
                    control.control_id
                );
                continue;
            }
            index.insert(control.control_id.clone(), control);
        }
        Self { controls: index }
    }

    pub fn get(&self, control_id: &str) -> Option<&PolicyControl> {
        self.controls.get(control_id)
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }
}

/// A parsed policy document: the control index plus any embedded results.
#[derive(Debug, Clone, Default)]
pub struct LoadedPolicy {
    pub policy_name: Option<String>,
    pub index: PolicyIndex,
    pub results: Vec<AuditResult>,
}

impl LoadedPolicy {
    pub fn from_document(document: PolicyDocument, bare_fix_platform: &PlatformTag) -> Self {
        let (policy_name, platform, entries) = match document {
            PolicyDocument::Bundle {
                policy_name,
                platform,
                controls,
            } => (policy_name, platform, controls),
            PolicyDocument::List(entries) => (None, None, entries),
            PolicyDocument::Single(entry) => (None, None, vec![entry]),
        };
        let bare_platform = platform
            .map(PlatformTag::new)
            .unwrap_or_else(|| bare_fix_platform.clone());

        let index =
            PolicyIndex::from_controls(entries.iter().map(|e| e.to_control(&bare_platform)));
        let results = entries
            .iter()
            .filter_map(PolicyEntry::to_audit_result)
            .collect::<Vec<_>>();
        debug!(
            controls = index.len(),
            results = results.len(),
            "loaded policy document"
        );
        Self {
            policy_name,
            index,
            results,
        }
    }

    pub fn from_value(value: Value, bare_fix_platform: &PlatformTag) -> Result<Self> {
        let document: PolicyDocument =
            serde_json::from_value(value).context("unrecognized policy document shape")?;
        Ok(Self::from_document(document, bare_fix_platform))
    }
}

pub fn load_policy_file(path: &Path, bare_fix_platform: &PlatformTag) -> Result<LoadedPolicy> {
    let value = read_document(path)?;
    LoadedPolicy::from_value(value, bare_fix_platform)
        .with_context(|| format!("failed loading policy: {}", path.display()))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResultsDocument {
    Wrapped { results: Vec<AuditResult> },
    List(Vec<AuditResult>),
}

/// Load externally produced audit results: a list, or `{ "results": [...] }`.
pub fn load_audit_results(path: &Path) -> Result<Vec<AuditResult>> {
    let value = read_document(path)?;
    let document: ResultsDocument = serde_json::from_value(value)
        .with_context(|| format!("invalid audit results: {}", path.display()))?;
    Ok(match document {
        ResultsDocument::Wrapped { results } | ResultsDocument::List(results) => results,
    })
}
