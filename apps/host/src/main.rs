//! pagedrop host entry point.

mod app;
mod config;
mod local_fs;
mod stdio;
mod unavailable;

use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // stdout carries the protocol, logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pagedrop=debug")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting pagedrop host");

    let config = config::HostConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        config::HostConfig::default()
    });
    tracing::info!(
        path = %config::config_path().display(),
        download_dir = %config.download_dir.display(),
        "configuration loaded"
    );

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(async {
        let coordinator = app::build_coordinator(&config)?;
        stdio::serve(
            coordinator,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
        .await?;
        anyhow::Ok(())
    })?;

    tracing::info!("host shut down cleanly");
    Ok(())
}
