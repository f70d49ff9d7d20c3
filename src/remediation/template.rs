use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::{DriftError, DriftResult};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<([A-Za-z_][A-Za-z0-9_.\-]*)>").expect("placeholder pattern must compile")
});

/// Placeholder names in order of first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    PLACEHOLDER
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Substitute every `<name>` token, or fail without producing partial output.
///
/// Values are inserted verbatim and are not scanned for further tokens.
pub fn render(
    control_id: &str,
    template: &str,
    variables: &BTreeMap<String, String>,
) -> DriftResult<String> {
    let missing: Vec<String> = placeholders(template)
        .into_iter()
        .filter(|name| !variables.contains_key(name))
        .collect();
    if !missing.is_empty() {
        return Err(DriftError::UnresolvedPlaceholder {
            control_id: control_id.to_string(),
            placeholders: missing,
        });
    }

    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        variables.get(&caps[1]).cloned().unwrap_or_default()
    });
    Ok(rendered.into_owned())
}
