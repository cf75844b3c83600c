//! Polyglot Server - HTTP frontend for the translation service.

mod routes;
mod state;

use anyhow::{Context, Result};
use clap::Parser;
use polyglot_core::GlobalConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "polyglot-server")]
#[command(author, version, about = "Translation API server", long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind to
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Configuration file (defaults to $POLYGLOT_CONFIG, then ./polyglot.toml)
    #[arg(short, long, env = "POLYGLOT_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let config = match &args.config {
        Some(path) => GlobalConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => GlobalConfig::load().context("Failed to load config")?,
    };
    info!(
        "Loaded {} model(s), default: {}",
        config.models.len(),
        config.default_model().unwrap_or("<none>")
    );

    // Registers the built-in adapter kinds and validates the model map
    // against them; registration is closed before the first request.
    let state =
        Arc::new(AppState::new(config).context("Failed to initialize application state")?);

    let app = routes::app(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    info!("Starting server at http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
