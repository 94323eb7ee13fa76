//! Fuelwatch main entry point
//!
//! This is the command-line interface for the Fuelwatch price scraper.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fuelwatch::backoff::BackoffPolicy;
use fuelwatch::clock::SystemClock;
use fuelwatch::config::{load_config_with_hash, Config};
use fuelwatch::fetch::PriceFetcher;
use fuelwatch::notify::{EmailNotifier, LogNotifier, Notifier};
use fuelwatch::schedule::{run_sweep, ScheduleWindow, Scheduler, SchedulerMode};
use fuelwatch::storage::{SqliteStore, Store};
use tracing_subscriber::EnvFilter;

/// Fuelwatch: distributed commodity-price scrape orchestration
///
/// Fuelwatch fetches publicly posted heating-fuel prices from supplier
/// websites, spreading fetch times across a daily window and backing off
/// sources that are chronically failing.
#[derive(Parser, Debug)]
#[command(name = "fuelwatch")]
#[command(version = "1.0.0")]
#[command(about = "Distributed fuel price scraper", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Scrape every source once, sequentially, then exit
    #[arg(long, conflicts_with_all = ["preview", "stats", "monthly_reset", "dry_run"])]
    sweep: bool,

    /// Show each source's next scheduled run time and exit
    #[arg(long, conflicts_with_all = ["sweep", "stats", "monthly_reset", "dry_run"])]
    preview: bool,

    /// Show backoff and observation statistics and exit
    #[arg(long, conflicts_with_all = ["sweep", "preview", "monthly_reset", "dry_run"])]
    stats: bool,

    /// Reactivate phone-only sources for a fresh monthly attempt and exit
    #[arg(long, conflicts_with_all = ["sweep", "preview", "stats", "dry_run"])]
    monthly_reset: bool,

    /// Validate config and show what would run without fetching anything
    #[arg(long, conflicts_with_all = ["sweep", "preview", "stats", "monthly_reset"])]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, _config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.preview {
        handle_preview(&config)?;
    } else if cli.monthly_reset {
        handle_monthly_reset(&config)?;
    } else if cli.sweep {
        handle_sweep(&config).await?;
    } else {
        handle_schedule(&config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("fuelwatch=info,warn"),
            1 => EnvFilter::new("fuelwatch=debug,info"),
            2 => EnvFilter::new("fuelwatch=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_store(config: &Config) -> Result<SqliteStore, Box<dyn std::error::Error>> {
    Ok(SqliteStore::new(Path::new(&config.output.database_path))?)
}

fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>, Box<dyn std::error::Error>> {
    match &config.notify {
        Some(notify) => Ok(Arc::new(EmailNotifier::new(notify)?)),
        None => {
            tracing::info!("No [notify] section configured, notifications go to the log");
            Ok(Arc::new(LogNotifier))
        }
    }
}

/// Handles the --dry-run mode: validates config and shows what would run
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Fuelwatch Dry Run ===\n");

    println!("Scraper Configuration:");
    println!("  Request timeout: {}s", config.scraper.request_timeout_secs);
    println!("  Max retries: {}", config.scraper.max_retries);
    println!("  Retry delay: {}ms", config.scraper.retry_delay_ms);
    println!("  Sweep delay: {}ms", config.scraper.sweep_delay_ms);

    println!("\nSchedule Window:");
    println!(
        "  Hours: {:02}:00-{:02}:00 (UTC{:+})",
        config.window.start_hour, config.window.end_hour, config.window.utc_offset_hours
    );
    println!("  Jitter: ±{} min", config.window.jitter_minutes);
    println!("  Mode: {}", config.window.mode);
    println!(
        "  Shadow observation period: {} days",
        config.window.shadow_observation_days
    );

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.scraper_name);
    println!("  Version: {}", config.user_agent.scraper_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nNotifications:");
    match &config.notify {
        Some(n) => println!("  SMTP via {} ({} -> {})", n.smtp_host, n.from, n.to),
        None => println!("  Log only"),
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows backoff and observation statistics
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    println!("Database: {}\n", config.output.database_path);

    let stats = BackoffPolicy::default().backoff_stats(&store)?;
    println!("Sources ({} total):", stats.total());
    println!("  Active:     {}", stats.active);
    println!("  Cooldown:   {}", stats.cooldown);
    println!("  Phone-only: {}", stats.phone_only);

    println!("\nPrice observations: {}", store.observation_count()?);
    Ok(())
}

/// Handles the --preview mode: shows each source's next scheduled run
fn handle_preview(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let sources = store.get_scrapable_sources()?;
    let scheduler = build_scheduler(config, Box::new(store))?;

    println!(
        "Schedule preview ({:02}:00-{:02}:00 window, ±{} min jitter):\n",
        config.window.start_hour, config.window.end_hour, config.window.jitter_minutes
    );
    for (name, at) in scheduler.preview_schedule(&sources) {
        println!("  {}  {}", at.format("%Y-%m-%d %H:%M UTC"), name);
    }
    Ok(())
}

/// Handles the --monthly-reset mode: gives phone-only sources another try
fn handle_monthly_reset(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = open_store(config)?;
    let reset = BackoffPolicy::default().monthly_reset(&mut store)?;
    println!("Reactivated {} phone-only source(s)", reset);
    Ok(())
}

/// Handles the --sweep mode: one sequential pass over all sources
async fn handle_sweep(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = open_store(config)?;
    let fetcher = PriceFetcher::new(&config.scraper, &config.user_agent)?;
    let clock = SystemClock;

    let summary = run_sweep(
        &mut store,
        &fetcher,
        &BackoffPolicy::default(),
        &clock,
        Duration::from_millis(config.scraper.sweep_delay_ms),
    )
    .await?;

    println!(
        "Sweep complete: {} succeeded, {} failed, {} skipped",
        summary.succeeded, summary.failed, summary.skipped
    );
    if summary.is_degraded() {
        println!(
            "WARNING: {:.0}% of fetches failed",
            summary.failure_rate() * 100.0
        );
    }
    Ok(())
}

fn build_scheduler(
    config: &Config,
    store: Box<dyn Store>,
) -> Result<Scheduler, Box<dyn std::error::Error>> {
    let mode = SchedulerMode::parse(&config.window.mode)
        .ok_or_else(|| format!("unknown scheduler mode: {}", config.window.mode))?;
    let fetcher = PriceFetcher::new(&config.scraper, &config.user_agent)?;
    let notifier = build_notifier(config)?;

    Ok(Scheduler::new(
        store,
        notifier,
        Arc::new(SystemClock),
        fetcher,
        ScheduleWindow::from_config(&config.window),
        mode,
        config.window.shadow_observation_days,
    ))
}

/// Handles the default mode: run the distributed scheduler until interrupted
async fn handle_schedule(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let mut scheduler = build_scheduler(config, Box::new(store))?;

    scheduler.start()?;
    tracing::info!("Press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    scheduler.stop();

    Ok(())
}
