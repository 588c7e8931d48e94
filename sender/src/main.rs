// sender/src/main.rs

use ctrl_push::{load_config, send_control_update};
use eyre::{Result, WrapErr};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config().wrap_err("Invalid control sender configuration")?;
    let report = send_control_update(&config)
        .await
        .wrap_err_with(|| format!("Control update to {} failed", config.endpoint))?;

    info!(
        frames = report.frames_sent,
        settled_ms = report.settled_for.as_millis() as u64,
        "Done"
    );
    Ok(())
}
