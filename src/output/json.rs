use anyhow::Result;
use serde::Serialize;

/// Pretty JSON for reports, batches and the resolved config.
pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::render_json;
    use crate::drift::{Delta, DeltaKind, Severity};
    use crate::snapshot::{ItemValue, Numeric, Scalar};

    #[test]
    fn delta_uses_external_field_names() {
        let delta = Delta {
            item_path: "sshd.Port".to_string(),
            kind: DeltaKind::Modified,
            baseline_value: Some(ItemValue::Scalar(Scalar::Number(
                Numeric::new(22.0).expect("finite"),
            ))),
            current_value: Some(ItemValue::Scalar(Scalar::Text("2222".to_string()))),
            severity: Severity::Medium,
            list_change: None,
        };
        let rendered = render_json(&[delta]).expect("render");
        let parsed: Value = serde_json::from_str(&rendered).expect("valid json");
        let first = &parsed[0];
        assert_eq!(first["item"], "sshd.Port");
        assert_eq!(first["type"], "Modification");
        assert_eq!(first["baseline"], 22);
        assert_eq!(first["current"], "2222");
        assert_eq!(first["impact"], "Medium");
        assert!(first.get("list_change").is_none());
    }
}
