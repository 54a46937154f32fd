//! Quipbot CLI entry point.

use anyhow::Context as _;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use quipbot::commands::CommandSet;
use quipbot::config::Config;
use quipbot::conversation::HistoryStore;
use quipbot::llm::gateway::{CompletionGateway, GenerationParams, HttpCompletionApi};
use quipbot::llm::ladder::Ladder;
use quipbot::messaging::discord::{self, DiscordHandler};
use quipbot::orchestrator::ResponseOrchestrator;

#[derive(Parser)]
#[command(name = "quipbot")]
#[command(about = "A Discord persona bot backed by a hosted completion endpoint")]
struct Cli {
    /// Path to config file (optional)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("starting quipbot");

    let config = if let Some(config_path) = cli.config {
        Config::load_from_path(&config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        Config::load().context("failed to load configuration from environment")?
    };

    let history = Arc::new(HistoryStore::new(config.chat.max_history));
    let commands = CommandSet::new(
        config.chat.command_marker,
        config.chat.command_names.clone(),
    );

    let api = HttpCompletionApi::new(&config.llm).context("failed to initialize completion API")?;
    let ladder = Ladder::new(&config.llm.api_keys, &config.llm.models);
    let gateway = CompletionGateway::new(api, ladder, GenerationParams::from(&config.llm));

    let orchestrator = Arc::new(ResponseOrchestrator::new(
        config.persona.clone(),
        config.chat.interject_odds,
        commands.clone(),
        Arc::clone(&history),
        gateway,
    ));

    if let Some(addr) = config.health_addr {
        tokio::spawn(async move {
            if let Err(error) = quipbot::health::serve(addr).await {
                tracing::error!(%error, "health server failed");
            }
        });
    }

    let handler = DiscordHandler::new(
        orchestrator,
        history,
        commands,
        config.chat.role_name.clone(),
    );

    tokio::select! {
        result = discord::run(&config.discord_token, handler) => {
            result.context("Discord client exited")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("quipbot stopped");
    Ok(())
}
