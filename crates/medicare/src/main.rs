//! medicare server binary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use medicare::llm::ClientFactory;
use medicare::server::{self, AppState};

#[derive(Parser)]
#[command(name = "medicare")]
#[command(version)]
#[command(about = "Chat and medical-record analysis backend for Google Gemini")]
struct Cli {
    /// Development override file; real environment variables take precedence
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Bind host (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let clients =
        ClientFactory::from_env(Some(cli.env_file.as_path())).context("failed to load settings")?;
    let settings = clients.settings();
    info!(
        model = %settings.gemini_model(),
        base_url = %settings.gemini_base_url(),
        temperature = settings.temperature(),
        max_tokens = settings.max_tokens(),
        cors_origins = ?settings.cors_origins_list(),
        "Settings loaded"
    );

    let host = cli.host.unwrap_or_else(|| settings.host().to_string());
    let port = cli.port.unwrap_or(settings.port());

    let state = AppState::new(clients);
    let app = server::build_app(state);

    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}
