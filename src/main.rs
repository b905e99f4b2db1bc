use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tirilo::{app, config::Config};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    // The terminal belongs to the face; logs go to a file.
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.runtime.log_file)
        .with_context(|| format!("opening log file {}", config.runtime.log_file.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_ansi(false)
        .with_writer(Mutex::new(log))
        .init();

    std::panic::set_hook(Box::new(|panic| {
        error!(%panic, "panic");
    }));

    info!(version = env!("CARGO_PKG_VERSION"), "tirilo starting");
    let result = app::run(config).await;
    if let Err(e) = &result {
        error!(error = %e, "tirilo stopped with an error");
    }
    result
}
