//! meshircd - modular multi-server IRC daemon.

use meshircd::config::{Config, validate};
use meshircd::error::StartupError;
use meshircd::event;
use meshircd::state::{JsonFileStorage, Matrix, MemoryStorage, Storage};
use meshircd::{metrics, telemetry};
use tracing::{debug, error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing(std::env::var_os("MESHIRCD_JSON_LOGS").is_some());

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        StartupError::from(e)
    })?;
    validate(&config).map_err(|errors| {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        StartupError::Invalid(errors.iter().map(ToString::to_string).collect())
    })?;

    info!(
        server = %config.server.name,
        sid = %config.server.sid,
        "Starting meshircd"
    );

    let storage: Box<dyn Storage> = match &config.storage.path {
        Some(path) => {
            info!(path = %path, "Using file storage");
            Box::new(JsonFileStorage::open(path).map_err(StartupError::from)?)
        }
        None => {
            info!("Using in-memory storage");
            Box::new(MemoryStorage::default())
        }
    };

    metrics::init();

    let mut matrix = Matrix::new(&config, storage)?;
    info!(modules = ?matrix.registry.loaded(), "Modules loaded");

    // Listeners and link connectors are handed clones of `events`; they are
    // built outside this crate. Holding the sender here keeps the loop
    // alive until the shutdown signal even when none are attached.
    let (events, events_rx) = event::channel();
    info!("Event channel ready for transport collaborators");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
    };
    event::run(&mut matrix, events_rx, shutdown).await;
    drop(events);

    debug!(metrics = %metrics::gather_metrics(), "Final metrics");

    info!("meshircd stopped");
    Ok(())
}
