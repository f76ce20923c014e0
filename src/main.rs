// ABOUTME: Console host for the chatlog handler, one message per stdin line
// ABOUTME: Initializes logging and config, runs the handler loop, and cleans up on exit

use anyhow::{Context, Result};
use chatlog::{
    channel::{ConsoleChannel, EventContext, MessageContent, ReplyChannel},
    config::Config,
    handler::{HandleResult, LongMessageHandler},
    ArtifactManager, IncomingMessage,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "chatlog", version, about = "Replies to overlong messages with a chat log file")]
struct Cli {
    /// Path to config.toml (overrides the default search)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sender ID attached to every stdin message
    #[arg(long, default_value = "console")]
    sender: String,

    /// Treat stdin messages as posted in this group
    #[arg(long)]
    group: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries replies, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chatlog=info,chatlog_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting chatlog console host");

    dotenvy::dotenv().ok();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let artifact_dir = config.artifact_dir();
    tracing::info!(
        dir = %artifact_dir.display(),
        threshold = config.conversion.threshold_chars,
        max_chars = config.conversion.max_chars,
        retention_secs = config.conversion.retention_secs,
        keep_files = config.conversion.keep_files,
        "Configuration loaded"
    );

    let manager = ArtifactManager::new(&artifact_dir, config.conversion.clone())
        .with_context(|| format!("Failed to prepare {}", artifact_dir.display()))?
        .purge_on_shutdown(config.storage.purge_on_shutdown);
    let manager = Arc::new(manager);
    let handler = LongMessageHandler::new(Arc::clone(&manager));
    let channel = ConsoleChannel::new(cli.group.clone().unwrap_or_else(|| cli.sender.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                None
            }
        };
        let Some(text) = line else {
            break;
        };

        let message = IncomingMessage {
            text,
            sender_id: cli.sender.clone(),
            group_id: cli.group.clone(),
        };
        let mut ctx = EventContext::new(message);

        if let HandleResult::Failed(reason) = handler.handle(&mut ctx, &channel).await? {
            tracing::warn!(reason = %reason, "Conversion failed");
        }

        if !ctx.is_default_prevented() {
            // Default behaviour of this host: echo the message back
            let echo = format!("echo: {}", ctx.message.text);
            if let Err(e) = channel.send(MessageContent::plain(echo)).await {
                tracing::error!(error = %e, "Failed to send default reply");
            }
        }
    }

    let report = manager.shutdown();
    tracing::info!(
        removed = report.removed,
        failed = report.failed,
        "Chatlog console host stopped"
    );

    Ok(())
}
