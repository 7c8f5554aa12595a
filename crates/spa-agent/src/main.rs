//! spa-agent - Browser interaction correlation
//!
//! Replays recorded boundary-event scripts through the correlation engine
//! and harvests the resulting interactions to JSONL.

mod demo;
mod replay;

use clap::{Parser, Subcommand};
use replay::{ReplaySummary, Replayer};
use spa_core::config::{AgentConfig, ConfigLoader};
use spa_core::script::{read_script, read_script_lenient, write_script};
use spa_core::{ScriptStep, TrackerConfig, AGENT_VERSION};
use spa_harvest::{HarvestBuffers, Harvester, JsonlExporter, JsonlExporterConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "spa-agent")]
#[command(version)]
#[command(about = "Correlates browser boundary events into interactions", long_about = None)]
struct Cli {
    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "SPA_AGENT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded boundary-event script
    Replay {
        /// Input script (JSONL)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for harvested records (defaults to harvest.path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Page URL when the script starts
        #[arg(long)]
        location: Option<String>,

        /// Skip script lines that do not parse instead of failing
        #[arg(long)]
        lenient: bool,
    },

    /// Generate the route-change demo session and replay it
    Demo {
        /// Output file for harvested records (defaults to harvest.path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Where to write the generated script
        #[arg(long, default_value = "spa-demo-script.jsonl")]
        script: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.clone());

    // CLI verbose flag takes precedence, then config, then default
    let log_level = if cli.verbose > 0 {
        match cli.verbose {
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    } else {
        match config.agent.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Replay {
            input,
            output,
            location,
            lenient,
        } => replay_command(&config, &input, output, location, lenient).await,
        Commands::Demo { output, script } => demo_command(&config, output, &script).await,
        Commands::Config => config_command(&config),
    }
}

/// Load configuration from file/env, with fallback to defaults
fn load_config(cli_path: Option<PathBuf>) -> AgentConfig {
    let loader = ConfigLoader::new().with_cli_path(cli_path);
    match loader.load() {
        Ok(config) => {
            info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            warn!("Failed to load configuration: {}, using defaults", e);
            AgentConfig::default()
        }
    }
}

async fn replay_command(
    config: &AgentConfig,
    input: &Path,
    output: Option<PathBuf>,
    location: Option<String>,
    lenient: bool,
) -> anyhow::Result<()> {
    let steps = if lenient {
        read_script_lenient(input).await?
    } else {
        read_script(input).await?
    };

    let output = output.unwrap_or_else(|| PathBuf::from(&config.harvest.path));
    let summary = run_session(
        config,
        config.tracker.clone(),
        &steps,
        location.as_deref(),
        &output,
    )
    .await?;
    print_summary(&summary, &output);
    Ok(())
}

async fn demo_command(
    config: &AgentConfig,
    output: Option<PathBuf>,
    script: &Path,
) -> anyhow::Result<()> {
    println!();
    println!("  spa-agent v{} - DEMO MODE", AGENT_VERSION);
    println!();

    let steps = demo::route_change_script();
    write_script(
        script,
        &steps,
        Some("spa-agent demo session: click, route change, two requests, late beacon"),
    )
    .await?;
    println!("  Script:  {} ({} steps)", script.display(), steps.len());

    let output = output.unwrap_or_else(|| PathBuf::from(&config.harvest.path));
    let summary = run_session(
        config,
        demo::demo_config(&config.tracker),
        &steps,
        Some(demo::ORIGIN),
        &output,
    )
    .await?;
    print_summary(&summary, &output);
    Ok(())
}

fn config_command(config: &AgentConfig) -> anyhow::Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Replay `steps` while a harvester drains the buffers in the background,
/// then harvest what is left and close the output
async fn run_session(
    config: &AgentConfig,
    tracker: TrackerConfig,
    steps: &[ScriptStep],
    location: Option<&str>,
    output: &Path,
) -> anyhow::Result<ReplaySummary> {
    let buffers = HarvestBuffers::new(config.harvest.max_items);
    let exporter = Arc::new(JsonlExporter::open(JsonlExporterConfig {
        path: output.to_path_buf(),
        ..JsonlExporterConfig::from(&config.harvest)
    })?);

    let mut harvester = Harvester::new(
        buffers.clone(),
        Duration::from_millis(config.harvest.interval_ms),
    );
    harvester.add_exporter(exporter.clone());
    let harvester = Arc::new(harvester);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let harvest_task = {
        let harvester = harvester.clone();
        tokio::spawn(async move { harvester.run(shutdown_rx).await })
    };

    let summary = {
        let mut replayer = Replayer::new(tracker, buffers.clone(), 0.0);
        if let Some(url) = location {
            replayer.set_location(url);
        }
        replayer.apply_all(steps);
        info!(
            live = replayer.tracker().live_interactions(),
            "script replayed, flushing"
        );
        let (_, summary) = replayer.finish();
        info!("Tracker stats: {}", summary.stats);
        summary
    };

    let _ = shutdown_tx.send(());
    harvest_task.await?;
    exporter.close()?;

    if harvester.export_failures() > 0 {
        warn!("{} exports failed", harvester.export_failures());
    }
    if buffers.dropped() > 0 {
        warn!("{} records dropped by full buffers", buffers.dropped());
    }
    info!("{} records written", exporter.records_written());
    Ok(summary)
}

fn print_summary(summary: &ReplaySummary, output: &Path) {
    let stats = &summary.stats;
    println!();
    println!("  Steps replayed:        {}", summary.steps);
    if summary.unmatched > 0 {
        println!("  Unmatched steps:       {}", summary.unmatched);
    }
    if summary.open_frames > 0 {
        println!("  Frames left open:      {}", summary.open_frames);
    }
    if summary.open_interactions > 0 {
        println!("  Interactions left open: {}", summary.open_interactions);
    }
    println!("  Interactions emitted:  {}", stats.interactions_emitted);
    println!("  Interactions discarded: {}", stats.interactions_discarded);
    println!("  Standalone requests:   {}", stats.standalone_ajax);
    println!("  Errors captured:       {}", stats.errors_captured);
    println!();
    println!("  Output:  {}", output.display());
    println!();
}
