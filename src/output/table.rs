use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::drift::{Delta, Severity};
use crate::pipeline::BatchReport;
use crate::remediation::{AuditStatus, RemediationRecord};
use crate::report::AuditReport;

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Critical => Color::Magenta,
        Severity::High => Color::Red,
        Severity::Medium => Color::Yellow,
        Severity::Low => Color::Cyan,
        Severity::Info => Color::Grey,
    }
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn render_delta_table(deltas: &[Delta]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Impact", "Item", "Type", "Change"]);
    for delta in deltas {
        table.add_row(Row::from(vec![
            Cell::new(delta.severity.as_str()).fg(severity_color(delta.severity)),
            Cell::new(&delta.item_path),
            Cell::new(delta.kind.as_str()),
            Cell::new(delta.describe()),
        ]));
    }
    table.to_string()
}

pub fn render_remediation_table(records: &[RemediationRecord]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Control", "Status", "Platform", "Fix", "Rationale"]);
    for record in records {
        let status_cell = match record.status {
            AuditStatus::Error => Cell::new(record.status.as_str()).fg(Color::Magenta),
            AuditStatus::Fail => Cell::new(record.status.as_str()).fg(Color::Red),
            AuditStatus::Pass => Cell::new(record.status.as_str()).fg(Color::Green),
        };
        let platform = match (&record.platform, record.cross_platform) {
            (Some(p), true) => format!("{p} (adapt)"),
            (Some(p), false) => p.to_string(),
            (None, _) => "-".to_string(),
        };
        table.add_row(Row::from(vec![
            Cell::new(&record.control_id),
            status_cell,
            Cell::new(platform),
            Cell::new(record.fix_command.as_deref().unwrap_or("-")),
            Cell::new(&record.rationale),
        ]));
    }
    table.to_string()
}

/// Human-readable checklist for one host.
pub fn render_checklist(report: &AuditReport) -> String {
    let mut out = String::new();
    if let Some(name) = &report.policy_name {
        out.push_str(&format!("Policy: {name}\n"));
    }
    out.push_str(&format!(
        "Host: {}  baseline: {}  current: {}\n",
        report.current.source_host, report.baseline.id, report.current.id
    ));

    if report.deltas.is_empty() {
        out.push_str("\nNo configuration drift detected.\n");
    } else {
        out.push_str(&format!("\nDrift ({} items)\n", report.deltas.len()));
        out.push_str(&render_delta_table(&report.deltas));
        out.push('\n');
    }

    if report.remediations.is_empty() {
        out.push_str("\nNo failed controls.\n");
    } else {
        out.push_str(&format!(
            "\nRemediation ({} controls)\n",
            report.remediations.len()
        ));
        out.push_str(&render_remediation_table(&report.remediations));
        out.push('\n');
    }

    if !report.issues.is_empty() {
        out.push_str("\nInput issues\n");
        for issue in &report.issues {
            out.push_str(&format!("  - {issue}\n"));
        }
    }

    let summary = &report.summary;
    out.push_str(&format!(
        "\nSummary: {} deltas, {} passed, {} failed, {} errored controls\n",
        summary.total_deltas,
        summary.passed_controls,
        summary.failed_controls,
        summary.errored_controls
    ));
    out
}

pub fn render_batch(batch: &BatchReport) -> String {
    let mut out = String::new();
    for report in &batch.reports {
        out.push_str(&render_checklist(report));
        out.push('\n');
    }
    for failure in &batch.failures {
        out.push_str(&format!("Host {} failed: {}\n", failure.host, failure.error));
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::render_checklist;
    use crate::drift::{Delta, DeltaKind, Severity};
    use crate::remediation::{AuditStatus, PlatformTag, RemediationRecord};
    use crate::report::{AuditReport, ReportContext};
    use crate::snapshot::SnapshotMeta;

    #[test]
    fn checklist_lists_drift_and_fixes() {
        let meta = SnapshotMeta {
            id: "web-01".to_string(),
            source_host: "web-01".to_string(),
            os: Some("linux".to_string()),
            timestamp: Utc::now(),
            digest: String::new(),
            item_count: 1,
        };
        let report = AuditReport::assemble(
            ReportContext {
                policy_name: Some("CIS Ubuntu".to_string()),
                baseline: meta.clone(),
                current: meta,
                issues: Vec::new(),
                passed_controls: 0,
            },
            vec![Delta {
                item_path: "PermitRootLogin".to_string(),
                kind: DeltaKind::Modified,
                baseline_value: None,
                current_value: None,
                severity: Severity::High,
                list_change: None,
            }],
            vec![RemediationRecord {
                control_id: "5.2.10".to_string(),
                status: AuditStatus::Fail,
                rationale: "Disable root login".to_string(),
                fix_command: Some("sudo chage -l alice".to_string()),
                platform: Some(PlatformTag::new("bash")),
                cross_platform: false,
                error: None,
            }],
        );
        let text = render_checklist(&report);
        assert!(text.contains("Policy: CIS Ubuntu"));
        assert!(text.contains("PermitRootLogin"));
        assert!(text.contains("sudo chage -l alice"));
        assert!(text.contains("1 deltas, 0 passed, 1 failed"));
    }
}
