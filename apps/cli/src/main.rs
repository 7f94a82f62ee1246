//! Maintenance CLI for the reference-range service
//!
//! Usage:
//!   labsync [--config labsync.toml] audit
//!   labsync check payload.json
//!   labsync migrate

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use labsync::{
    db::PostgresRangeStore,
    logging::init_cli_logging,
    services::RangeAuditService,
    startup::{connect_pool, initialize_schema},
    Config,
};
use labsync_ranges::{plan_sync, prepare, ExistingState, SyncIntent, SyncRequest};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "labsync", version, about = "Reference-range maintenance tools")]
struct Cli {
    /// Configuration file (defaults to ./labsync.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan every stored range and report overlaps, gaps and redundant splits
    Audit,

    /// Validate a sync payload offline and show what it would store on an
    /// empty parameter
    Check {
        /// JSON file holding a sync request body
        file: PathBuf,
    },

    /// Apply pending database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_cli_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Audit => audit(&config).await,
        Command::Check { file } => check(&config, &file),
        Command::Migrate => migrate(&config).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(path).context("load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

async fn audit(config: &Config) -> Result<ExitCode> {
    let pool = connect_pool(&config.database).await?;
    let service = RangeAuditService::new(
        PostgresRangeStore::new(pool),
        Decimal::from(config.ranges.gap_fill_max_age_years),
    );

    let report = service.run().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(if report.findings.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn check(config: &Config, file: &Path) -> Result<ExitCode> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("read {}", file.display()))?;
    let request: SyncRequest =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", file.display()))?;

    let prepared = match prepare(&request, &config.ranges.normalize_options()) {
        Ok(prepared) => prepared,
        Err(e) => {
            let rejection = json!({
                "valid": false,
                "code": e.code(),
                "descriptorIndex": e.descriptor_index(),
                "message": e.to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&rejection)?);
            return Ok(ExitCode::FAILURE);
        }
    };

    let intent = match &prepared.intent {
        SyncIntent::Preserve => "preserve",
        SyncIntent::ClearAll => "clear",
        SyncIntent::Apply { .. } => "apply",
    };
    let plan = plan_sync(
        &prepared,
        &ExistingState::from_rows(Vec::new()),
        &config.ranges.plan_options(),
    );
    info!(intent, rows = plan.inserts.len(), "payload accepted");

    let report = json!({
        "valid": true,
        "intent": intent,
        "normalization": prepared.report.notes,
        "rows": plan.inserts,
        "summary": plan.summary,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::SUCCESS)
}

async fn migrate(config: &Config) -> Result<ExitCode> {
    let pool = connect_pool(&config.database).await?;
    initialize_schema(&pool).await?;
    pool.close().await;
    println!("migrations applied");
    Ok(ExitCode::SUCCESS)
}
