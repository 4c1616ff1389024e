mod api;
mod db;
mod store;

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use fleetmon_core::{FleetMonitor, HttpGatewayProvider, MonitorConfig, RetryPolicy};

use api::AppState;
use store::SqliteHostStore;

#[derive(Parser, Debug)]
#[command(name = "fleetmon-server")]
#[command(about = "Multi-host container monitoring server", long_about = None)]
struct Args {
    /// Bind address for HTTP server
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Database file path
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Seconds between health sweeps
    #[arg(long, default_value_t = 30)]
    health_interval: u64,

    /// Seconds between lifecycle-detection sweeps
    #[arg(long, default_value_t = 10)]
    event_interval: u64,

    /// Timeout in seconds for one engine call
    #[arg(long, default_value_t = 10)]
    request_timeout: u64,

    /// Attempts per engine call (including the first)
    #[arg(long, default_value_t = 2)]
    retry_attempts: u32,

    /// Delay in milliseconds between retry attempts
    #[arg(long, default_value_t = 500)]
    retry_delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting fleetmon server");

    // Initialize database and host store
    let pool = db::init_db(args.db_path)?;
    let store = Arc::new(SqliteHostStore::new(pool));

    let request_timeout = Duration::from_secs(args.request_timeout);
    let config = MonitorConfig::new()
        .with_request_timeout(request_timeout)
        .with_retry(RetryPolicy::new(
            args.retry_attempts,
            Duration::from_millis(args.retry_delay_ms),
        ))
        .with_health_interval(Duration::from_secs(args.health_interval))
        .with_event_interval(Duration::from_secs(args.event_interval));

    let gateways = Arc::new(HttpGatewayProvider::new(request_timeout));
    let monitor = Arc::new(FleetMonitor::new(config, gateways, Some(store)));

    let loaded = monitor.load_hosts().await?;
    info!("Monitoring {} configured host(s)", loaded);

    monitor.start_monitoring();

    // Create router
    let state = Arc::new(AppState { monitor });
    let app = api::create_router(state);

    // Parse bind address
    let addr: SocketAddr = args.bind.parse()?;
    info!("Listening on http://{}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
