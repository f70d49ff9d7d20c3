//! Severity levels and ordered impact rules.

use std::fmt::{Display, Formatter};
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::drift::differ::{Delta, DeltaKind};
use crate::error::{DriftError, DriftResult};
use crate::snapshot::loader::read_document;
use crate::snapshot::PATH_SEPARATOR;

/// Qualitative impact of a delta, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    #[default]
    #[serde(alias = "info")]
    Info,
    #[serde(alias = "low")]
    Low,
    #[serde(alias = "medium")]
    Medium,
    #[serde(alias = "high")]
    High,
    #[serde(alias = "critical")]
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "Info",
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rule as written in configuration or a rules file.
///
/// `path_pattern` is a glob over item paths: `*` matches any run of
/// characters, `?` a single character. A pattern also matches every path
/// nested beneath what it names, so `sshd` covers `sshd.Port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactRule {
    #[serde(alias = "pattern")]
    pub path_pattern: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind_scope: Option<DeltaKind>,
}

impl ImpactRule {
    pub fn new(path_pattern: impl Into<String>, severity: Severity) -> Self {
        Self {
            path_pattern: path_pattern.into(),
            severity,
            kind_scope: None,
        }
    }

    pub fn scoped(mut self, kind: DeltaKind) -> Self {
        self.kind_scope = Some(kind);
        self
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: ImpactRule,
    matcher: Regex,
}

/// Ordered, compiled impact rules. Built once, then only read.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn compile(rules: impl IntoIterator<Item = ImpactRule>) -> DriftResult<Self> {
        let mut compiled = Vec::new();
        for rule in rules {
            let matcher = glob_to_regex(&rule.path_pattern)?;
            compiled.push(CompiledRule { rule, matcher });
        }
        Ok(Self { rules: compiled })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Severity of the first matching rule, `Info` when none match.
    pub fn severity_for(&self, item_path: &str, kind: DeltaKind) -> Severity {
        self.rules
            .iter()
            .find(|c| {
                c.rule.kind_scope.map(|scope| scope == kind).unwrap_or(true)
                    && c.matcher.is_match(item_path)
            })
            .map(|c| c.rule.severity)
            .unwrap_or_default()
    }

    pub fn classify(&self, mut delta: Delta) -> Delta {
        delta.severity = self.severity_for(&delta.item_path, delta.kind);
        delta
    }

    pub fn classify_all(&self, deltas: Vec<Delta>) -> Vec<Delta> {
        deltas.into_iter().map(|d| self.classify(d)).collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RuleFile {
    Wrapped { rules: Vec<ImpactRule> },
    List(Vec<ImpactRule>),
}

/// Load ordered rules from a JSON/YAML file: a list, or `{ "rules": [...] }`.
pub fn load_rule_file(path: &Path) -> Result<Vec<ImpactRule>> {
    let value = read_document(path)?;
    let file: RuleFile = serde_json::from_value(value)
        .with_context(|| format!("invalid impact rules: {}", path.display()))?;
    Ok(match file {
        RuleFile::Wrapped { rules } | RuleFile::List(rules) => rules,
    })
}

fn glob_to_regex(pattern: &str) -> DriftResult<Regex> {
    let mut expr = String::from("(?s)^");
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push_str(&format!("(?:{}.*)?$", regex::escape(&PATH_SEPARATOR.to_string())));
    Regex::new(&expr).map_err(|e| DriftError::InvalidRule {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{ImpactRule, RuleSet, Severity};
    use crate::drift::differ::{Delta, DeltaKind};

    fn delta(path: &str, kind: DeltaKind) -> Delta {
        Delta {
            item_path: path.to_string(),
            kind,
            baseline_value: None,
            current_value: None,
            severity: Severity::Info,
            list_change: None,
        }
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = RuleSet::compile(vec![
            ImpactRule::new("PermitRootLogin", Severity::High),
            ImpactRule::new("*", Severity::Low),
        ])
        .expect("compile");
        let classified = rules.classify(delta("PermitRootLogin", DeltaKind::Modified));
        assert_eq!(classified.severity, Severity::High);
        assert_eq!(
            rules.severity_for("Banner", DeltaKind::Added),
            Severity::Low
        );
    }

    #[test]
    fn kind_scope_restricts_matches() {
        let rules = RuleSet::compile(vec![
            ImpactRule::new("services", Severity::Critical).scoped(DeltaKind::Removed),
            ImpactRule::new("services", Severity::Medium),
        ])
        .expect("compile");
        assert_eq!(
            rules.severity_for("services", DeltaKind::Removed),
            Severity::Critical
        );
        assert_eq!(
            rules.severity_for("services", DeltaKind::Modified),
            Severity::Medium
        );
    }

    #[test]
    fn pattern_covers_nested_paths_but_not_prefixes() {
        let rules = RuleSet::compile(vec![ImpactRule::new("sshd", Severity::High)])
            .expect("compile");
        assert_eq!(
            rules.severity_for("sshd.Port", DeltaKind::Modified),
            Severity::High
        );
        assert_eq!(
            rules.severity_for("sshd_extra", DeltaKind::Modified),
            Severity::Info
        );
    }

    #[test]
    fn wildcards_and_literal_dots() {
        let rules = RuleSet::compile(vec![
            ImpactRule::new("users.*.shell", Severity::Medium),
            ImpactRule::new("kernel.?", Severity::Low),
        ])
        .expect("compile");
        assert_eq!(
            rules.severity_for("users.alice.shell", DeltaKind::Modified),
            Severity::Medium
        );
        assert_eq!(
            rules.severity_for("usersXaliceXshell", DeltaKind::Modified),
            Severity::Info
        );
        assert_eq!(rules.severity_for("kernel.a", DeltaKind::Added), Severity::Low);
    }

    #[test]
    fn wildcard_matches_keys_containing_newlines() {
        let rules = RuleSet::compile(vec![ImpactRule::new("*", Severity::High)])
            .expect("compile");
        assert_eq!(
            rules.severity_for("motd\nline", DeltaKind::Added),
            Severity::High
        );
        let single = RuleSet::compile(vec![ImpactRule::new("a?b", Severity::Low)])
            .expect("compile");
        assert_eq!(single.severity_for("a\nb", DeltaKind::Added), Severity::Low);
    }

    #[test]
    fn no_rules_means_info() {
        let rules = RuleSet::default();
        for kind in [DeltaKind::Added, DeltaKind::Removed, DeltaKind::Modified] {
            assert_eq!(rules.severity_for("anything", kind), Severity::Info);
        }
    }

    #[test]
    fn parses_rules_from_json() {
        let rule: ImpactRule = serde_json::from_str(
            r#"{ "pattern": "PermitRootLogin", "severity": "high", "kind_scope": "modified" }"#,
        )
        .expect("parse rule");
        assert_eq!(rule.severity, Severity::High);
        assert_eq!(rule.kind_scope, Some(DeltaKind::Modified));
    }

    #[test]
    fn severity_sorts_by_impact() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Info < Severity::Low);
    }
}
