use anyhow::{Context, Result};
use clap::Parser;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wschat_core::{Config, ConnectionManager};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[derive(Parser, Debug)]
#[command(name = "wschat")]
#[command(version, about = "Terminal chat client for WebSocket chat backends")]
struct Cli {
    /// WebSocket endpoint to connect to
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Seconds to wait for the connection handshake
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Reconnect up to N times after a failure (0 disables reconnection)
    #[arg(long)]
    retries: Option<u32>,

    /// Write logs here instead of the default data directory
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Persist the resolved settings to the config file
    #[arg(long)]
    save: bool,
}

impl Cli {
    /// Command-line flags take precedence over the config file
    fn apply_to(&self, config: &mut Config) {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = Some(endpoint.clone());
        }
        if let Some(secs) = self.connect_timeout {
            config.connect_timeout_secs = Some(secs);
        }
        if let Some(retries) = self.retries {
            let mut policy = config.reconnect.unwrap_or_default();
            policy.max_retries = retries;
            config.reconnect = Some(policy);
        }
        if let Some(path) = &self.log_file {
            config.log_file = Some(path.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    cli.apply_to(&mut config);
    if cli.save {
        config.save()?;
    }

    init_logging(&config)?;

    tracing::info!(endpoint = config.endpoint(), "starting wschat");
    let connection = ConnectionManager::connect_with(config.endpoint(), config.channel_options());
    let mut app = App::new(connection);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, &mut app).await;
    tui::restore()?;

    // The Close frame must be written before the runtime drops the socket task
    app.connection.shutdown().await;
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App) -> Result<()> {
    let mut events = EventHandler::new();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        tokio::select! {
            Some(event) = events.next() => handler::handle_event(app, event),
            Some(event) = app.connection.next_event() => app.on_channel_event(event),
            else => break,
        }
    }

    Ok(())
}

/// The terminal belongs to the UI, so logs go to a file
fn init_logging(config: &Config) -> Result<()> {
    let path = config.log_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Could not open log file {}", path.display()))?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wschat=debug,wschat_core=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wschat_core::ReconnectPolicy;

    #[test]
    fn test_flags_override_config_file() {
        let mut config = Config {
            endpoint: Some("ws://from-file/chat".to_string()),
            connect_timeout_secs: Some(30),
            reconnect: Some(ReconnectPolicy {
                max_retries: 1,
                initial_delay_ms: 100,
                max_delay_ms: 400,
            }),
            log_file: None,
        };
        let cli = Cli::parse_from(["wschat", "--endpoint", "ws://from-flag/chat", "--retries", "5"]);
        cli.apply_to(&mut config);

        assert_eq!(config.endpoint(), "ws://from-flag/chat");
        assert_eq!(config.connect_timeout_secs, Some(30));
        let policy = config.reconnect.unwrap();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_delay_ms, 100);
    }

    #[test]
    fn test_no_flags_leave_config_untouched() {
        let mut config = Config::new();
        Cli::parse_from(["wschat"]).apply_to(&mut config);
        assert_eq!(config, Config::new());
        assert_eq!(
            config.channel_options().reconnect,
            ReconnectPolicy::default()
        );
    }
}
