use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use feedrelay::transport::{self, ChatTransport, DiscordTransport, StdoutTransport};
use feedrelay::{console, Cli, Config, HttpFeedSource, Relay, Result};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match Config::load_with_env(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", cli.config.display());
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };
    if let Some(token) = &cli.token {
        config.discord.token = token.clone();
    }

    // Initialize logging
    if let Err(e) = feedrelay::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        feedrelay::logging::init_console_only(&config.logging.level);
    }

    info!("Feed Relay {}", env!("CARGO_PKG_VERSION"));

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Startup failed");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    config.validate()?;
    let registrations = cli.registrations(config.fetch.block_private_hosts)?;

    let chat: Arc<dyn ChatTransport> = if cli.dry_run {
        info!("Dry run: messages go to stdout");
        Arc::new(StdoutTransport::new())
    } else {
        Arc::new(DiscordTransport::new(&config.discord)?)
    };
    let source = Arc::new(HttpFeedSource::new(&config.fetch)?);

    let relay = Arc::new(Relay::new(&config, source, Arc::clone(&chat)));
    let running = relay.start(registrations).await;
    info!(running, "Polling feeds; type help for commands, Ctrl-C to stop");

    let console_relay = Arc::clone(&relay);
    let console_task = tokio::spawn(async move {
        let lines = console::spawn_stdin_reader();
        if let Err(e) = console::run(&console_relay, lines, tokio::io::stdout()).await {
            warn!(error = %e, "Console stopped");
        }
    });

    wait_for_shutdown().await;
    info!("Shutdown requested");
    console_task.abort();

    let snapshot = relay.shutdown().await;
    if !config.discord.farewell.is_empty() {
        let reached = transport::broadcast(chat.as_ref(), &snapshot, &config.discord.farewell).await;
        info!(reached, "Farewell sent");
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "Failed to listen for SIGTERM");
            if tokio::signal::ctrl_c().await.is_err() {
                error!("Failed to listen for ctrl-c");
            }
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if result.is_err() {
                error!("Failed to listen for ctrl-c");
            }
        }
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    if tokio::signal::ctrl_c().await.is_err() {
        error!("Failed to listen for ctrl-c");
    }
}
