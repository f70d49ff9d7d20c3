use tracing::{debug, warn};

use crate::error::DriftError;
use crate::remediation::policy::PolicyIndex;
use crate::remediation::template::render;
use crate::remediation::{
    AuditResult, AuditStatus, PlatformSelector, PlatformTag, PolicyControl, RemediationRecord,
};

struct SelectedGuidance<'a> {
    platform: &'a PlatformTag,
    template: &'a str,
    cross_platform: bool,
}

/// Map one audit result to its remediation record.
///
/// PASS results need no remediation and yield `None`; FAIL and ERROR always
/// yield exactly one record, with lookup and rendering problems folded in.
pub fn resolve(
    result: &AuditResult,
    index: &PolicyIndex,
    selector: &PlatformSelector,
) -> Option<RemediationRecord> {
    if !result.status.needs_remediation() {
        return None;
    }

    let Some((control, guidance)) = index
        .get(&result.control_id)
        .and_then(|control| select_guidance(control, selector).map(|g| (control, g)))
    else {
        warn!(
            "no remediation guidance defined for control {}",
            result.control_id
        );
        return Some(missing_guidance(result));
    };

    if guidance.cross_platform {
        debug!(
            control = %result.control_id,
            platform = %guidance.platform,
            "falling back to guidance for another platform"
        );
    }

    let record = match render(&result.control_id, guidance.template, &result.variables) {
        Ok(fix_command) => RemediationRecord {
            control_id: result.control_id.clone(),
            status: result.status,
            rationale: rationale(control, result, &guidance),
            fix_command: Some(fix_command),
            platform: Some(guidance.platform.clone()),
            cross_platform: guidance.cross_platform,
            error: None,
        },
        Err(err) => {
            warn!("{err}");
            RemediationRecord {
                control_id: result.control_id.clone(),
                status: AuditStatus::Error,
                rationale: err.to_string(),
                fix_command: Some(guidance.template.to_string()),
                platform: Some(guidance.platform.clone()),
                cross_platform: guidance.cross_platform,
                error: Some(err),
            }
        }
    };
    Some(record)
}

/// Resolve every FAIL/ERROR result, preserving input order.
pub fn resolve_all(
    results: &[AuditResult],
    index: &PolicyIndex,
    selector: &PlatformSelector,
) -> Vec<RemediationRecord> {
    results
        .iter()
        .filter_map(|result| resolve(result, index, selector))
        .collect()
}

fn select_guidance<'a>(
    control: &'a PolicyControl,
    selector: &PlatformSelector,
) -> Option<SelectedGuidance<'a>> {
    if let Some(wanted) = selector.preferred() {
        if let Some((platform, template)) = control.platform_guidance.get_key_value(wanted) {
            return Some(SelectedGuidance {
                platform,
                template,
                cross_platform: false,
            });
        }
    }
    control
        .platform_guidance
        .iter()
        .next()
        .map(|(platform, template)| SelectedGuidance {
            platform,
            template,
            cross_platform: true,
        })
}

fn missing_guidance(result: &AuditResult) -> RemediationRecord {
    let err = DriftError::MissingPolicy {
        control_id: result.control_id.clone(),
    };
    RemediationRecord {
        control_id: result.control_id.clone(),
        status: AuditStatus::Fail,
        rationale: format!(
            "No remediation guidance defined for control {}",
            result.control_id
        ),
        fix_command: None,
        platform: None,
        cross_platform: false,
        error: Some(err),
    }
}

fn rationale(control: &PolicyControl, result: &AuditResult, guidance: &SelectedGuidance<'_>) -> String {
    let mut text = if control.description.trim().is_empty() {
        format!("Control {} reported {}", control.control_id, result.status)
    } else {
        control.description.trim().to_string()
    };
    if let (Some(expected), Some(current)) = (
        result.variables.get("expected_value"),
        result.variables.get("current_value"),
    ) {
        text.push_str(&format!(" (expected '{expected}', found '{current}')"));
    }
    if guidance.cross_platform {
        text.push_str(&format!(
            " [guidance written for {}; may require adaptation]",
            guidance.platform
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{resolve, resolve_all};
    use crate::error::DriftError;
    use crate::remediation::{
        AuditResult, AuditStatus, PlatformSelector, PlatformTag, PolicyControl, PolicyIndex,
    };

    fn control(id: &str, guidance: &[(&str, &str)]) -> PolicyControl {
        PolicyControl {
            control_id: id.to_string(),
            description: format!("Control {id} description"),
            platform_guidance: guidance
                .iter()
                .map(|(p, t)| (PlatformTag::new(p), t.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn bash() -> PlatformSelector {
        PlatformSelector::Exact(PlatformTag::new("bash"))
    }

    #[test]
    fn renders_fix_for_failed_control() {
        let index = PolicyIndex::from_controls(vec![control(
            "5.2.10",
            &[("bash", "sudo chage -l <user>")],
        )]);
        let result = AuditResult::new("5.2.10", AuditStatus::Fail).with_variable("user", "alice");
        let record = resolve(&result, &index, &bash()).expect("record");
        assert_eq!(record.status, AuditStatus::Fail);
        assert_eq!(record.fix_command.as_deref(), Some("sudo chage -l alice"));
        assert_eq!(record.platform, Some(PlatformTag::new("bash")));
        assert!(!record.cross_platform);
    }

    #[test]
    fn missing_control_is_reported_not_dropped() {
        let index = PolicyIndex::default();
        let result = AuditResult::new("9.9.9", AuditStatus::Fail);
        let record = resolve(&result, &index, &bash()).expect("record");
        assert_eq!(
            record.rationale,
            "No remediation guidance defined for control 9.9.9"
        );
        assert_eq!(record.fix_command, None);
        assert_eq!(record.status, AuditStatus::Fail);
        assert!(matches!(record.error, Some(DriftError::MissingPolicy { .. })));
    }

    #[test]
    fn unresolved_placeholder_yields_error_with_raw_template() {
        let index = PolicyIndex::from_controls(vec![control("1.2", &[("bash", "echo <missing>")])]);
        let result = AuditResult::new("1.2", AuditStatus::Fail);
        let record = resolve(&result, &index, &bash()).expect("record");
        assert_eq!(record.status, AuditStatus::Error);
        assert_eq!(record.fix_command.as_deref(), Some("echo <missing>"));
        assert!(matches!(
            record.error,
            Some(DriftError::UnresolvedPlaceholder { ref placeholders, .. }) if placeholders == &vec!["missing".to_string()]
        ));
    }

    #[test]
    fn pass_results_produce_no_record() {
        let index = PolicyIndex::from_controls(vec![control("1.1", &[("bash", "true")])]);
        let result = AuditResult::new("1.1", AuditStatus::Pass);
        assert!(resolve(&result, &index, &bash()).is_none());
    }

    #[test]
    fn auto_prefers_host_platform() {
        let index = PolicyIndex::from_controls(vec![control(
            "3.1",
            &[("bash", "systemctl disable <svc>"), ("powershell", "Stop-Service <svc>")],
        )]);
        let result = AuditResult::new("3.1", AuditStatus::Error).with_variable("svc", "telnet");
        let selector = PlatformSelector::Auto {
            preferred: Some(PlatformTag::new("powershell")),
        };
        let record = resolve(&result, &index, &selector).expect("record");
        assert_eq!(record.fix_command.as_deref(), Some("Stop-Service telnet"));
        assert_eq!(record.status, AuditStatus::Error);
        assert!(!record.cross_platform);
    }

    #[test]
    fn falls_back_to_other_platform_and_flags_it() {
        let index = PolicyIndex::from_controls(vec![control("3.2", &[("bash", "ufw enable")])]);
        let result = AuditResult::new("3.2", AuditStatus::Fail);
        let selector = PlatformSelector::Exact(PlatformTag::new("powershell"));
        let record = resolve(&result, &index, &selector).expect("record");
        assert!(record.cross_platform);
        assert_eq!(record.platform, Some(PlatformTag::new("bash")));
        assert!(record.rationale.contains("may require adaptation"));

        let unknown_host = PlatformSelector::Auto { preferred: None };
        let record = resolve(&result, &index, &unknown_host).expect("record");
        assert!(record.cross_platform);
    }

    #[test]
    fn control_without_guidance_counts_as_missing() {
        let index = PolicyIndex::from_controls(vec![control("4.4", &[])]);
        let result = AuditResult::new("4.4", AuditStatus::Fail);
        let record = resolve(&result, &index, &bash()).expect("record");
        assert_eq!(record.fix_command, None);
        assert!(record.rationale.starts_with("No remediation guidance"));
    }

    #[test]
    fn every_failing_result_gets_one_record() {
        let index = PolicyIndex::from_controls(vec![control("a", &[("bash", "fix <x>")])]);
        let results = vec![
            AuditResult::new("a", AuditStatus::Fail).with_variable("x", "1"),
            AuditResult::new("a", AuditStatus::Pass),
            AuditResult::new("b", AuditStatus::Error),
            AuditResult::new("a", AuditStatus::Fail),
        ];
        let records = resolve_all(&results, &index, &bash());
        assert_eq!(records.len(), 3);
        let again = resolve_all(&results, &index, &bash());
        assert_eq!(records, again);
        for record in records.iter().filter(|r| r.status != AuditStatus::Error) {
            let fix = record.fix_command.as_deref().unwrap_or_default();
            assert!(!fix.contains('<'), "unresolved token in {fix}");
        }
    }
}
