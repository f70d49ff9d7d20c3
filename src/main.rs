use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use drift_tool::config::{Config, ConfigOverrides};
use drift_tool::drift::{load_rule_file, RuleSet};
use drift_tool::logging::init_logging;
use drift_tool::output::csv::{
    batch_deltas_to_csv, batch_remediations_to_csv, deltas_to_csv, remediations_to_csv,
};
use drift_tool::output::json::render_json;
use drift_tool::output::table::{render_batch, render_checklist};
use drift_tool::output::ReportFormat;
use drift_tool::pipeline::{AuditEngine, BatchReport, HostEntry, HostFailure, HostInput};
use drift_tool::remediation::{
    load_audit_results, load_policy_file, AuditResult, LoadedPolicy, PlatformSelector,
};
use drift_tool::report::{AuditReport, ExitStatus};
use drift_tool::snapshot::load_snapshot_file;
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Parser)]
#[command(
    name = "drift-tool",
    about = "Configuration drift detection and remediation guidance"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long = "log-level")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Args, Clone)]
struct AuditArgs {
    #[arg(long)]
    policy: PathBuf,
    /// Extra impact rules, evaluated before rules from the config file.
    #[arg(long)]
    rules: Option<PathBuf>,
    /// `bash`, `powershell`, `auto`, or any other platform tag.
    #[arg(long)]
    platform: Option<String>,
    #[arg(long, value_enum)]
    format: Option<ReportFormat>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Diff two snapshots and resolve remediation for failed controls.
    Compare {
        #[arg(long)]
        baseline: PathBuf,
        #[arg(long)]
        current: PathBuf,
        /// Audit results to resolve instead of statuses embedded in the policy.
        #[arg(long)]
        results: Option<PathBuf>,
        #[command(flatten)]
        audit: AuditArgs,
    },
    /// Audit many hosts listed in a manifest, in parallel.
    Batch {
        #[arg(long)]
        manifest: PathBuf,
        #[command(flatten)]
        audit: AuditArgs,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

/// One host in a batch manifest. Relative paths resolve against the manifest.
#[derive(Debug, Deserialize)]
struct ManifestEntry {
    /// Label reported when the host's files cannot be loaded.
    #[serde(default)]
    host: Option<String>,
    baseline: PathBuf,
    current: PathBuf,
    #[serde(default)]
    results: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(status) => ExitCode::from(status.code()),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(ExitStatus::InputError.code())
        }
    }
}

fn run(cli: Cli) -> Result<ExitStatus> {
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    let audit_args = match &cli.command {
        Commands::Compare { audit, .. } | Commands::Batch { audit, .. } => Some(audit),
        Commands::Config { .. } => None,
    };
    config.apply_overrides(ConfigOverrides {
        format: audit_args.and_then(|a| a.format),
        platform: audit_args.and_then(|a| a.platform.clone()),
        log_level: cli.log_level.clone(),
    });
    init_logging(&config.logging);

    match &cli.command {
        Commands::Config { init, show } => {
            handle_config_command(*init, *show, &config, &config_path)?;
            Ok(ExitStatus::Clean)
        }
        Commands::Compare {
            baseline,
            current,
            results,
            audit,
        } => {
            let (engine, policy) = build_engine(&config, audit)?;
            let input = load_host(baseline, current, results.as_deref(), &policy)?;
            let report = engine.audit(&input)?;
            print_report(&report, config.report.format)?;
            Ok(report.exit_status())
        }
        Commands::Batch { manifest, audit } => {
            let (engine, policy) = build_engine(&config, audit)?;
            let inputs = load_manifest(manifest, &policy)?;
            info!(hosts = inputs.len(), "starting batch audit");
            let batch = engine.audit_many(&inputs);
            print_batch(&batch, config.report.format)?;
            Ok(batch.exit_status())
        }
    }
}

fn handle_config_command(init: bool, show: bool, config: &Config, config_path: &Path) -> Result<()> {
    if init {
        Config::write_template(config_path)?;
        println!("Wrote config template to {}", config_path.display());
    }
    if show || !init {
        println!("{}", render_json(config)?);
    }
    Ok(())
}

/// Load rules and policy once; the engine is read-only from here on.
fn build_engine(config: &Config, args: &AuditArgs) -> Result<(AuditEngine, LoadedPolicy)> {
    let mut rules = match &args.rules {
        Some(path) => load_rule_file(path)?,
        None => Vec::new(),
    };
    rules.extend(config.impact_rules.iter().cloned());
    let rule_set = RuleSet::compile(rules)?;
    debug!(rules = rule_set.len(), "compiled impact rules");

    let policy = load_policy_file(&args.policy, &config.remediation.bare_fix_platform)?;
    let selector: PlatformSelector = config
        .remediation
        .platform
        .parse()
        .map_err(|e| anyhow!("invalid --platform: {e}"))?;

    let engine = AuditEngine::new(
        rule_set,
        policy.index.clone(),
        selector,
        config.remediation.os_platforms.clone(),
    )
    .with_policy_name(policy.policy_name.clone());
    Ok((engine, policy))
}

fn load_host(
    baseline: &Path,
    current: &Path,
    results: Option<&Path>,
    policy: &LoadedPolicy,
) -> Result<HostInput> {
    let results: Vec<AuditResult> = match results {
        Some(path) => load_audit_results(path)?,
        None => policy.results.clone(),
    };
    Ok(HostInput {
        baseline: load_snapshot_file(baseline)?,
        current: load_snapshot_file(current)?,
        results,
    })
}

/// Load every manifest entry; a host whose files fail to load becomes a
/// `HostFailure` instead of aborting the batch.
fn load_manifest(path: &Path, policy: &LoadedPolicy) -> Result<Vec<HostEntry>> {
    let value = drift_tool::snapshot::loader::read_document(path)?;
    let entries: Vec<ManifestEntry> = serde_json::from_value(value)
        .with_context(|| format!("invalid batch manifest: {}", path.display()))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(entries
        .iter()
        .map(|entry| {
            let results = entry.results.as_ref().map(|r| base_dir.join(r));
            load_host(
                &base_dir.join(&entry.baseline),
                &base_dir.join(&entry.current),
                results.as_deref(),
                policy,
            )
            .map_err(|err| {
                let host = entry
                    .host
                    .clone()
                    .unwrap_or_else(|| entry.current.display().to_string());
                warn!(host = %host, "failed loading host: {err:#}");
                HostFailure::new(host, format!("{err:#}"))
            })
        })
        .collect())
}

fn print_report(report: &AuditReport, format: ReportFormat) -> Result<()> {
    match format {
        ReportFormat::Text => print!("{}", render_checklist(report)),
        ReportFormat::Json => println!("{}", render_json(report)?),
        ReportFormat::Csv => {
            print!("{}", deltas_to_csv(&report.deltas)?);
            if !report.remediations.is_empty() {
                println!();
                print!("{}", remediations_to_csv(&report.remediations)?);
            }
        }
    }
    Ok(())
}

fn print_batch(batch: &BatchReport, format: ReportFormat) -> Result<()> {
    match format {
        ReportFormat::Text => print!("{}", render_batch(batch)),
        ReportFormat::Json => println!("{}", render_json(batch)?),
        ReportFormat::Csv => {
            print!("{}", batch_deltas_to_csv(batch)?);
            if batch.reports.iter().any(|r| !r.remediations.is_empty()) {
                println!();
                print!("{}", batch_remediations_to_csv(batch)?);
            }
            for failure in &batch.failures {
                eprintln!("error: host {} failed: {}", failure.host, failure.error);
            }
        }
    }
    Ok(())
}
