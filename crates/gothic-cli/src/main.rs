//! gothic - inspect a sign-in setup from the terminal.
//!
//! Reads the same configuration and recognition marker a session would, and
//! decodes identity credentials for debugging.

use std::io;

use anyhow::{Context, Result};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gothic_core::marker::RECOGNITION_KEY;
use gothic_core::provider::{CredentialDecoder, MarkerStore};
use gothic_core::{Config, FileMarkerStore, JwtDecoder, Library, User};

const USAGE: &str = "\
Usage: gothic <command>

Commands:
  status          Show configuration validity and recognition marker
  config          Print the effective configuration as JSON
  decode <token>  Decode an identity credential and show the derived user
  forget          Remove the recognition marker";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn load_config() -> Result<Config> {
    let mut config = Config::load().context("Failed to load config")?;
    config.apply_env();
    debug!(client_id = %config.client_id, "Config loaded");
    Ok(config)
}

fn marker_store(config: &Config) -> Result<FileMarkerStore> {
    let dir = config.marker_dir()?;
    debug!(?dir, "Marker directory resolved");
    Ok(FileMarkerStore::new(dir))
}

fn status() -> Result<()> {
    let config = load_config()?;
    match config.validate() {
        Ok(()) => println!("config:     ok (client {})", config.client_id),
        Err(e) => println!("config:     invalid - {}", e),
    }
    println!("scope:      {}", config.scope);
    println!("discovery:  {}", config.discovery.join(", "));
    for library in Library::ALL {
        println!("{:<11} {}", format!("{}:", library), library.script_src());
    }

    let markers = marker_store(&config)?;
    let recognized = markers.has(RECOGNITION_KEY);
    println!("recognized: {}", if recognized { "yes" } else { "no" });
    Ok(())
}

fn print_config() -> Result<()> {
    let config = load_config()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn decode(token: &str) -> Result<()> {
    let claims = JwtDecoder.decode(token).context("Failed to decode credential")?;
    let user = User::from_claims(&claims).ok();
    let output = serde_json::json!({
        "claims": claims,
        "user": user,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn forget() -> Result<()> {
    let config = load_config()?;
    let markers = marker_store(&config)?;
    markers.remove(RECOGNITION_KEY)?;
    info!("Recognition marker removed");
    println!("Recognition marker removed");
    Ok(())
}

fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("status") => status(),
        Some("config") => print_config(),
        Some("decode") => {
            let token = args
                .get(2)
                .ok_or_else(|| anyhow::anyhow!("decode requires a token argument"))?;
            decode(token)
        }
        Some("forget") => forget(),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}
