use anyhow::Result;

use crate::drift::Delta;
use crate::pipeline::BatchReport;
use crate::remediation::RemediationRecord;
use crate::report::AuditReport;

fn optional_value<T: ToString>(value: Option<&T>) -> String {
    value.map(ToString::to_string).unwrap_or_default()
}

/// Rows belonging to one host: `(host, snapshot id)` plus its records.
type HostRows<'a, T> = (Option<(&'a str, &'a str)>, &'a [T]);

const HOST_COLUMNS: [&str; 2] = ["host", "snapshot"];

pub fn deltas_to_csv(deltas: &[Delta]) -> Result<String> {
    delta_rows(&[(None, deltas)], false)
}

pub fn remediations_to_csv(records: &[RemediationRecord]) -> Result<String> {
    remediation_rows(&[(None, records)], false)
}

/// Every host's deltas in one table, keyed by leading host columns.
pub fn batch_deltas_to_csv(batch: &BatchReport) -> Result<String> {
    let groups: Vec<HostRows<'_, Delta>> = batch
        .reports
        .iter()
        .map(|r| (Some(host_key(r)), r.deltas.as_slice()))
        .collect();
    delta_rows(&groups, true)
}

pub fn batch_remediations_to_csv(batch: &BatchReport) -> Result<String> {
    let groups: Vec<HostRows<'_, RemediationRecord>> = batch
        .reports
        .iter()
        .map(|r| (Some(host_key(r)), r.remediations.as_slice()))
        .collect();
    remediation_rows(&groups, true)
}

fn host_key(report: &AuditReport) -> (&str, &str) {
    (report.current.source_host.as_str(), report.current.id.as_str())
}

fn with_host(key: Option<(&str, &str)>, host_columns: bool, row: Vec<String>) -> Vec<String> {
    if !host_columns {
        return row;
    }
    let (host, snapshot) = key.unwrap_or_default();
    let mut out = vec![host.to_string(), snapshot.to_string()];
    out.extend(row);
    out
}

fn header(host_columns: bool, columns: &[&str]) -> Vec<String> {
    let prefix: &[&str] = if host_columns { &HOST_COLUMNS } else { &[] };
    prefix.iter().chain(columns).map(|c| c.to_string()).collect()
}

fn delta_rows(groups: &[HostRows<'_, Delta>], host_columns: bool) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(header(
        host_columns,
        &["item", "type", "baseline", "current", "impact"],
    ))?;
    for (key, deltas) in groups {
        for delta in deltas.iter() {
            writer.write_record(with_host(
                *key,
                host_columns,
                vec![
                    delta.item_path.clone(),
                    delta.kind.to_string(),
                    optional_value(delta.baseline_value.as_ref()),
                    optional_value(delta.current_value.as_ref()),
                    delta.severity.to_string(),
                ],
            ))?;
        }
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

fn remediation_rows(
    groups: &[HostRows<'_, RemediationRecord>],
    host_columns: bool,
) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(header(
        host_columns,
        &[
            "control_id",
            "status",
            "platform",
            "cross_platform",
            "fix_command",
            "rationale",
        ],
    ))?;
    for (key, records) in groups {
        for record in records.iter() {
            writer.write_record(with_host(
                *key,
                host_columns,
                vec![
                    record.control_id.clone(),
                    record.status.to_string(),
                    optional_value(record.platform.as_ref()),
                    record.cross_platform.to_string(),
                    record.fix_command.clone().unwrap_or_default(),
                    record.rationale.clone(),
                ],
            ))?;
        }
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}
