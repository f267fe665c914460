use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use linesight::config::{DiscoveredConfig, LinesightConfig, LogFormat, LoggingConfig};
use linesight::dashboard::{Dashboard, DashboardView};

#[derive(Parser)]
#[command(
    name = "linesight",
    about = "Live manufacturing test-result dashboard: yield trends from a snapshot plus a live feed",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true, env = "LINESIGHT_CONFIG")]
    config: Option<PathBuf>,

    /// Override upstream.base_url (snapshot API)
    #[arg(long, global = true)]
    upstream: Option<String>,

    /// Override upstream.live_url (WebSocket feed)
    #[arg(long, global = true)]
    live_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the core and serve the read API
    Serve {
        /// Bind address (overrides api.listen_address)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Fetch the historical snapshot once and print it
    Snapshot {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Follow the live feed and print counters and yield on every change
    Watch {
        /// JSON output, one view per line
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

/// Resolve the config before logging exists; the caller logs the result
/// once the subscriber is up.
fn load_config(cli: &Cli) -> Result<DiscoveredConfig> {
    let mut discovered = match &cli.config {
        Some(path) => DiscoveredConfig {
            config: LinesightConfig::read(path)?,
            source: Some(path.clone()),
            skipped: Vec::new(),
        },
        None => LinesightConfig::discover(),
    };
    let config = &mut discovered.config;
    if let Some(base_url) = &cli.upstream {
        config.upstream.base_url = base_url.clone();
    }
    if let Some(live_url) = &cli.live_url {
        config.upstream.live_url = live_url.clone();
    }
    config.validate().context("invalid configuration")?;
    Ok(discovered)
}

fn print_view(view: &DashboardView) {
    println!("\n=== linesight: {} ===", view.connectivity);
    println!(
        "Total: {}   Good: {}   Rejects: {}   Pass rate: {:.1}%",
        view.counters.total, view.counters.pass_count, view.counters.fail_count, view.pass_rate_pct
    );

    println!("\n{:<6} | {:<20} | {:<10} | Timestamp", "Status", "Barcode", "Machine");
    println!("{:-<6}-|-{:-<20}-|-{:-<10}-|-{:-<25}", "", "", "", "");
    for r in &view.window {
        println!(
            "{:<6} | {:<20} | {:<10} | {}",
            r.status,
            r.barcode,
            r.machine_id,
            r.timestamp.to_rfc3339()
        );
    }

    println!("\nYield trend (last {} runs):", view.trend.len());
    for p in &view.trend {
        println!(
            "  #{:<4} pass {:>5.1}%  reject {:>5.1}%",
            p.index, p.pass_yield_pct, p.fail_yield_pct
        );
    }
    println!();
}

async fn watch(config: LinesightConfig, json: bool) -> Result<()> {
    let (snapshot, feed) = linesight::sources(&config)?;
    let dashboard = Dashboard::from_config(&config.window);
    let changes = dashboard.subscribe();
    let running = dashboard.start(snapshot, feed);

    let followed = linesight::follow(&dashboard, changes, linesight::shutdown_signal(), |view| {
        if json {
            println!("{}", serde_json::to_string(view)?);
        } else {
            let latest = view
                .trend
                .last()
                .map(|p| format!("{:.1}% / {:.1}%", p.pass_yield_pct, p.fail_yield_pct))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "[{}] total={} pass={} fail={} yield(pass/reject)={}",
                view.connectivity,
                view.counters.total,
                view.counters.pass_count,
                view.counters.fail_count,
                latest
            );
        }
        Ok(())
    })
    .await;

    running.shutdown().await;
    followed
}

#[tokio::main]
async fn main() -> Result<()> {
    // wss:// needs a process-wide rustls provider; an Err means one is set.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();
    let discovered = load_config(&cli)?;
    init_tracing(&discovered.config.logging);
    discovered.log();
    let config = discovered.config;

    match cli.command {
        Commands::Serve { bind } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.api.listen_address = bind;
            }
            tracing::info!(bind = %config.api.listen_address, "Starting linesight");
            linesight::serve(config).await?;
        }
        Commands::Snapshot { json } => {
            tracing::info!(upstream = %config.upstream.base_url, "Fetching snapshot");
            let view = linesight::snapshot_view(&config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print_view(&view);
            }
        }
        Commands::Watch { json } => {
            tracing::info!(live_url = %config.upstream.live_url, "Watching live feed");
            watch(config, json).await?;
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
