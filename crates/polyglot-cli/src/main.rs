//! Polyglot CLI - one-shot command line client for the translation service.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use polyglot_core::{GlobalConfig, Params, TranslateRequest, TranslationService};
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "polyglot")]
#[command(author, version, about = "Translate text from the command line", long_about = None)]
struct Args {
    /// Text to translate (read from stdin when omitted)
    text: Option<String>,

    /// Logical model name (config default when omitted)
    #[arg(short, long)]
    model: Option<String>,

    /// Request-level parameter overrides as key=value (e.g. -P max_new_tokens=64)
    #[arg(short = 'P', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Config file path (defaults to $POLYGLOT_CONFIG, then ./polyglot.toml)
    #[arg(short, long, env = "POLYGLOT_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Parse `key=value` overrides. Values are taken as JSON when they parse as
/// such (numbers, booleans), strings otherwise, so `num_beams=4` becomes a
/// number and `tgt_lang=es` a string.
fn parse_params(pairs: &[String]) -> Result<Params> {
    let mut params = Params::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Invalid parameter '{pair}', expected KEY=VALUE"))?;
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        params.insert(key, value);
    }
    Ok(params)
}

fn read_stdin() -> Result<String> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read text from stdin")?;
    Ok(text)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Setup logging
    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    // Load config
    let config = if let Some(config_path) = &args.config {
        GlobalConfig::from_file(config_path).context("Failed to load config file")?
    } else {
        GlobalConfig::load().context("Failed to load config")?
    };
    info!("Loaded {} model(s)", config.models.len());

    let service = TranslationService::new(config).context("Failed to initialize service")?;

    let text = match args.text {
        Some(text) => text,
        None => read_stdin()?,
    };

    let request = TranslateRequest {
        text,
        model: args.model,
        params: if args.params.is_empty() {
            None
        } else {
            Some(parse_params(&args.params)?)
        },
    };

    // The first request for a model may load it; show a spinner meanwhile.
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .context("Invalid spinner template")?,
    );
    pb.set_message("Translating...");
    pb.enable_steady_tick(Duration::from_millis(100));

    let result = service.translate(&request).await;
    pb.finish_and_clear();

    let result = result.map_err(|e| anyhow::anyhow!("{e}"))?;
    info!("Served by model '{}' ({})", result.model, result.adapter);

    #[allow(clippy::print_stdout)]
    {
        println!("{}", result.output);
    }

    Ok(())
}
