use anyhow::Result;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload};

use prism_exporter::app;
use prism_exporter::config::ExporterConfig;
use prism_exporter::logging::{self, LogLevels};
use prism_exporter::state::AppState;
use prism_exporter::watch;

const DEFAULT_CONFIG_PATH: &str = "config/exporter.toml";

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  prism-exporter [config.toml]    Start the exporter (default: {DEFAULT_CONFIG_PATH})");
    eprintln!();
    eprintln!("Without a config file the `default` section is read from");
    eprintln!("NUTANIX_URL, NUTANIX_USERNAME and NUTANIX_PASSWORD.");
}

#[tokio::main]
async fn main() -> Result<()> {
    let (filter, handle) = reload::Layer::new(logging::env_filter("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = match args.get(1).map(|s| s.as_str()) {
        Some("-h" | "--help") => {
            print_usage();
            return Ok(());
        }
        Some(path) => path,
        None => DEFAULT_CONFIG_PATH,
    };

    run_server(config_path, LogLevels::new(handle, "info")).await
}

async fn run_server(config_path: &str, log_levels: LogLevels) -> Result<()> {
    let config = ExporterConfig::load(config_path)?;
    let addr: SocketAddr = config.listen_address.parse()?;

    tracing::info!(
        listen = %addr,
        config = config_path,
        sections = config.sections.len(),
        "prism-exporter starting"
    );

    let watch_handle = tokio::spawn(watch_config(
        PathBuf::from(config_path),
        config.file_missing,
    ));

    let state = AppState::new(config, log_levels);
    let http_app = app::build_http_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let result = axum::serve(listener, http_app)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("Shutting down gracefully");
        })
        .await;

    watch_handle.abort();
    result?;
    Ok(())
}

/// Exit with status 1 once the config file changes so a supervisor restarts
/// the exporter with the new configuration.
async fn watch_config(path: PathBuf, initially_missing: bool) {
    watch::wait_for_change(path.clone(), initially_missing, watch::WATCH_INTERVAL).await;
    tracing::info!(path = %path.display(), "config file changed, restarting exporter");
    std::process::exit(1);
}
