use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use migration::{Migrator, MigratorTrait};

use api_types::DateRange;
use eboekhouden::{LegacyClient, LegacyConfig, RestClient, RestConfig, Upstream};
use engine::{CancelFlag, Engine, SyncOptions, SyncScope};

mod settings;

#[derive(Parser, Debug)]
#[command(name = "grootboek")]
#[command(about = "Synchronize an e-Boekhouden administration into the ledger")]
struct Cli {
    /// Settings file (TOML, extension omitted).
    #[arg(long, default_value = "settings", env = "GROOTBOEK_SETTINGS")]
    settings: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a migration against the configured upstream.
    Run(RunArgs),
    /// Show recent runs and aggregate import outcomes.
    Status,
    /// Export failed mutations to CSV for triage.
    ExportFailed(ExportFailedArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Start of the date range (inclusive, YYYY-MM-DD).
    #[arg(long)]
    from: Option<NaiveDate>,
    /// End of the date range (inclusive, YYYY-MM-DD).
    #[arg(long)]
    to: Option<NaiveDate>,
    /// Validate and report without writing anything.
    #[arg(long)]
    dry_run: bool,
    /// Mutations per commit/checkpoint.
    #[arg(long, default_value_t = 100)]
    batch_size: usize,
    /// Skip the chart-of-accounts setup phase.
    #[arg(long)]
    skip_accounts: bool,
    /// Skip prefetching counterparty relations.
    #[arg(long)]
    skip_parties: bool,
    /// Import only opening balances (type 0 mutations).
    #[arg(long)]
    opening_balances_only: bool,
    /// Skip opening balances.
    #[arg(long, conflicts_with = "opening_balances_only")]
    skip_opening_balances: bool,
}

#[derive(Args, Debug)]
struct ExportFailedArgs {
    /// Output file path.
    #[arg(long, default_value = "unprocessed_mutations.csv")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let settings = settings::Settings::new(&cli.settings)?;

    let level = settings
        .app
        .as_ref()
        .and_then(|app| app.level.clone())
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "grootboek={level},engine={level},eboekhouden={level}",
            level = level
        ))
        .init();

    let db = sea_orm::Database::connect(format!("sqlite:{}?mode=rwc", settings.sqlite.path)).await?;
    Migrator::up(&db, None).await?;
    let engine = Engine::builder().database(db).build().await?;

    match cli.command {
        Command::Run(args) => run(&engine, &settings, args).await,
        Command::Status => status(&engine).await,
        Command::ExportFailed(args) => export_failed(&engine, args).await,
    }
}

fn build_upstream(
    settings: &settings::Settings,
) -> Result<Upstream, Box<dyn std::error::Error + Send + Sync>> {
    if let Some(rest) = &settings.rest {
        let mut config = RestConfig::new(&rest.api_url, &rest.api_token);
        if let Some(source) = &rest.source {
            config.source = source.clone();
        }
        return Ok(Upstream::Rest(RestClient::new(config)?));
    }
    if let Some(legacy) = &settings.legacy {
        tracing::warn!(
            "no REST credentials configured; the legacy protocol caps history at 500 records"
        );
        let config = LegacyConfig::new(
            &legacy.url,
            &legacy.username,
            &legacy.security_code_1,
            &legacy.security_code_2,
        );
        return Ok(Upstream::Legacy(LegacyClient::new(config)?));
    }
    Err("no upstream credentials configured (set [rest] or [legacy] in settings)".into())
}

async fn run(
    engine: &Engine,
    settings: &settings::Settings,
    args: RunArgs,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let upstream = build_upstream(settings)?;

    let range = if args.from.is_some() || args.to.is_some() {
        Some(DateRange {
            from: args.from,
            to: args.to,
        })
    } else {
        None
    };

    let scope = SyncScope {
        accounts: !args.skip_accounts,
        parties: !args.skip_parties,
        transactions: !args.opening_balances_only,
        opening_balances: !args.skip_opening_balances,
    };
    let options = SyncOptions {
        range,
        dry_run: args.dry_run,
        scope,
        batch_size: args.batch_size,
        ..SyncOptions::default()
    };

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("cancellation requested; stopping after the current batch");
            handler_flag.cancel();
        }
    });

    let report = engine.run_migration(&upstream, options, cancel).await?;

    println!("Run {} finished: {:?}", report.run_id, report.status);
    println!(
        "  fetched {}  imported {}  skipped {}  failed {}",
        report.fetched, report.imported, report.skipped, report.failed
    );
    if report.dry_run {
        println!("  dry run: nothing was written");
    }
    if report.truncated {
        println!("  WARNING: upstream truncated the history; import is incomplete");
    }
    if !report.failures.is_empty() {
        println!("  example failures:");
        for failure in &report.failures {
            println!("    mutation {}: {}", failure.mutation_id, failure.reason);
        }
    }

    Ok(())
}

async fn status(engine: &Engine) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let totals = engine.import_totals().await?;
    println!(
        "import log: {} imported, {} duplicate-skips, {} skipped, {} failed",
        totals.imported, totals.skipped_duplicate, totals.skipped, totals.failed
    );

    let runs = engine.latest_runs(10).await?;
    if runs.is_empty() {
        println!("no migration runs yet");
        return Ok(());
    }
    for run in runs {
        println!(
            "{}  {:<24} {:>3}%  fetched {:>6}  imported {:>6}  failed {:>4}  {}",
            run.started_at.format("%Y-%m-%d %H:%M"),
            run.status,
            run.progress_pct,
            run.fetched,
            run.imported,
            run.failed,
            run.current_operation.unwrap_or_default()
        );
    }
    Ok(())
}

async fn export_failed(
    engine: &Engine,
    args: ExportFailedArgs,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let failed = engine.failed_mutations().await?;
    let mut writer = csv::Writer::from_path(&args.output)?;
    writer.write_record(["mutation_id", "error", "run_id", "recorded_at"])?;
    let count = failed.len();
    for entry in failed {
        writer.write_record([
            entry.mutation_id.to_string(),
            entry.error.unwrap_or_default(),
            entry.run_id,
            entry.created_at.to_rfc3339(),
        ])?;
    }
    writer.flush()?;
    println!("wrote {count} failed mutations to {}", args.output.display());
    Ok(())
}
