//! Schema Compatibility CLI
//!
//! Checks a snapshot of previously published operator schemas against the
//! schemas registered by the current build.
//!
//! Usage:
//!   check-schema-compat --existing-schemas schemas.txt --current-schemas current.txt
//!   check-schema-compat --help
//!
//! Exit status is 0 when every old schema is backward compatible (forward
//! compatibility failures only warn), 1 otherwise.

use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use schema_compat::config::{CompatConfig, OutputFormat};
use schema_compat::report::Reporter;
use schema_compat::{driver, Allowlist, CurrentSchemas, DontParseList, Verdict, VersionMap};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "check-schema-compat")]
#[command(about = "Check operator schemas for backward and forward compatibility")]
struct Cli {
    /// File to load existing schemas from
    #[arg(long)]
    existing_schemas: Option<PathBuf>,

    /// Schemas registered by the current build
    #[arg(long)]
    current_schemas: Option<PathBuf>,

    /// Custom-class method schemas of the current build
    #[arg(long)]
    custom_class_schemas: Option<PathBuf>,

    /// Raw upgrader version map (JSON)
    #[arg(long)]
    version_map: Option<PathBuf>,

    /// Config file (layered over compat.toml and COMPAT__* variables)
    #[arg(short, long)]
    config: Option<String>,

    /// Evaluate exemption expiry against this date instead of today
    #[arg(long)]
    today: Option<NaiveDate>,

    /// Output format
    #[arg(short, long, value_parser = ["text", "json"])]
    format: Option<String>,

    /// Do not print word diffs against candidates
    #[arg(long)]
    no_diff: bool,

    /// Write the effective configuration to PATH and exit
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(verdict) => std::process::exit(verdict.exit_code()),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<Verdict> {
    let mut config =
        CompatConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    apply_overrides(&mut config, &cli);

    if let Some(path) = &cli.write_config {
        config
            .save(path)
            .with_context(|| format!("writing configuration to {}", path.display()))?;
        println!("✅ Wrote configuration to {}", path.display());
        return Ok(Verdict::Success);
    }

    let today = config.today();
    let allowlist = Allowlist::builtin(today)?;
    let dont_parse = DontParseList::builtin(today)?;
    info!(%today, active_allowlist_entries = allowlist.entries().len(), "evaluating exemptions");

    let snapshot_path = &config.inputs.existing_schemas;
    let snapshot = std::fs::read_to_string(snapshot_path)
        .with_context(|| format!("reading existing schemas from {}", snapshot_path.display()))?;

    let current = CurrentSchemas::load(&config.current_schema_paths())
        .context("loading current schemas")?;
    let version_map = match &config.inputs.version_map {
        Some(path) => VersionMap::load(path)
            .with_context(|| format!("loading version map from {}", path.display()))?,
        None => VersionMap::default(),
    };

    let outcome = driver::run(&snapshot, &dont_parse, &current, &allowlist, &version_map)
        .with_context(|| format!("parsing {}", snapshot_path.display()))?;

    let reporter = Reporter::new(&config.report, &current);
    match config.report.format {
        OutputFormat::Json => println!("{}", reporter.render_json(&outcome)?),
        OutputFormat::Text => print!("{}", reporter.render_text(&outcome)),
    }

    Ok(outcome.verdict)
}

fn apply_overrides(config: &mut CompatConfig, cli: &Cli) {
    if let Some(path) = &cli.existing_schemas {
        config.inputs.existing_schemas = path.clone();
    }
    if let Some(path) = &cli.current_schemas {
        config.inputs.current_schemas = path.clone();
    }
    if let Some(path) = &cli.custom_class_schemas {
        config.inputs.custom_class_schemas = Some(path.clone());
    }
    if let Some(path) = &cli.version_map {
        config.inputs.version_map = Some(path.clone());
    }
    if let Some(today) = cli.today {
        config.policy.today = Some(today);
    }
    if let Some(format) = &cli.format {
        config.report.format = if format == "json" {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        };
    }
    if cli.no_diff {
        config.report.show_candidate_diffs = false;
    }
}
