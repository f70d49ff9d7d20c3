use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures raised by the core comparison and remediation stages.
///
/// Only `InputContract` and `InvalidRule` abort a run. The per-item variants
/// are captured inside loader issues and remediation records.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", content = "detail", rename_all = "snake_case")]
pub enum DriftError {
    #[error("malformed snapshot node at {path}: {reason}")]
    MalformedSnapshot { path: String, reason: String },
    #[error("no remediation guidance defined for control {control_id}")]
    MissingPolicy { control_id: String },
    #[error("unresolved placeholder(s) {} in remediation template for control {control_id}", format_placeholders(.placeholders))]
    UnresolvedPlaceholder {
        control_id: String,
        placeholders: Vec<String>,
    },
    #[error("input contract violated: {0}")]
    InputContract(String),
    #[error("invalid impact rule pattern {pattern:?}: {reason}")]
    InvalidRule { pattern: String, reason: String },
}

pub type DriftResult<T> = std::result::Result<T, DriftError>;

fn format_placeholders(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("<{n}>"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::DriftError;

    #[test]
    fn placeholder_error_lists_tokens() {
        let err = DriftError::UnresolvedPlaceholder {
            control_id: "1.1".to_string(),
            placeholders: vec!["user".to_string(), "path".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "unresolved placeholder(s) <user>, <path> in remediation template for control 1.1"
        );
    }
}
