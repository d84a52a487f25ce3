use mtf_signals::config::EngineConfig;
use mtf_signals::engine::SignalEngine;
use mtf_signals::query::{DEFAULT_RECENT_LIMIT, signal_feed};
use mtf_signals::server::{self, ServerState};

use anyhow::Result;
use chrono::{SubsecRound, Utc};
use clap::{Parser, Subcommand};
use log::info;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "mtf-signals",
    about = "Multi-timeframe CALL/PUT signal engine"
)]
struct Cli {
    /// Path to a JSON config file. Defaults are used when it does not exist.
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll all symbols until interrupted.
    Run,
    /// Run a single cycle and print what was logged.
    Once,
    /// Print the most recent logged signals as JSON.
    Recent {
        #[arg(long, default_value_t = DEFAULT_RECENT_LIMIT)]
        limit: usize,
    },
    /// Serve the signal log over HTTP until interrupted.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8000")]
        bind: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger with default info level if RUST_LOG not set
    if std::env::var("RUST_LOG").is_err() {
        unsafe { std::env::set_var("RUST_LOG", "info"); }
    }
    env_logger::init();

    let cli = Cli::parse();
    info!("Loading configuration from: {}", cli.config.display());
    let config = EngineConfig::load_from_file(&cli.config)?;

    match cli.command {
        Commands::Run => {
            info!("Starting signal engine");
            let engine = SignalEngine::from_config(&config)?;
            engine.run().await;
        }
        Commands::Once => {
            let engine = SignalEngine::from_config(&config)?;
            let report = engine.run_cycle().await;
            for signal in report.persisted() {
                println!("{}", signal.summary());
            }
            for outcome in &report.outcomes {
                for e in &outcome.errors {
                    println!("{}: {}", outcome.symbol, e);
                }
            }
            println!(
                "{} signal(s) logged to {}",
                report.persisted_count(),
                config.log_path.display()
            );
        }
        Commands::Recent { limit } => {
            let feed = signal_feed(&config.log_path, limit, Utc::now().trunc_subsecs(0))?;
            println!("{}", serde_json::to_string_pretty(&feed)?);
        }
        Commands::Serve { bind } => {
            server::serve(
                bind,
                ServerState {
                    log_path: config.log_path.clone(),
                    default_limit: DEFAULT_RECENT_LIMIT,
                },
            )
            .await?;
        }
    }

    Ok(())
}
