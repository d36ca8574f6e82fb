//! fo-skid service binary.
//!
//! Usage: `fo-skid [config.toml]`. Without an argument the path comes from
//! `FO_SKID_CONFIG`, falling back to `fo-skid.toml`; a missing default file
//! means built-in defaults plus environment overrides.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fo_skid::{HttpProbe, MqttBus, RestBackend, Skid, SkidConfig, SqlStore, SyncForwarder};

const DEFAULT_CONFIG: &str = "fo-skid.toml";

fn load_config() -> Result<SkidConfig> {
    let explicit = std::env::args().nth(1).or_else(|| std::env::var("FO_SKID_CONFIG").ok());

    match explicit {
        Some(path) => SkidConfig::load(&path).with_context(|| format!("loading {path}")),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            SkidConfig::load(DEFAULT_CONFIG).with_context(|| format!("loading {DEFAULT_CONFIG}"))
        }
        None => {
            let mut config = SkidConfig::default();
            config.apply_overrides(|key| std::env::var(key).ok());
            config.validate()?;
            Ok(config)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!(signal = "SIGINT", "Shutdown requested"),
                    _ = sigterm.recv() => info!(signal = "SIGTERM", "Shutdown requested"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Cannot install SIGTERM handler, waiting for SIGINT only");
                let _ = ctrl_c.await;
                info!(signal = "SIGINT", "Shutdown requested");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!(signal = "SIGINT", "Shutdown requested");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!(
        pipeline = config.pipeline.enabled,
        control = config.control.enabled,
        remote = config.remote.enabled,
        broker = %format!("{}:{}", config.bus.host, config.bus.port),
        "Starting fo-skid"
    );

    let store = Arc::new(SqlStore::connect(&config.store).await.context("connecting to store")?);

    let forwarder = if config.pipeline.enabled && config.remote.enabled {
        let probe = HttpProbe::new(
            config.remote.probe_url.clone(),
            Duration::from_secs(config.remote.probe_timeout_secs),
        )?;
        let backend = RestBackend::new(&config.remote)?;
        info!(endpoint = backend.endpoint(), "Remote sync enabled");
        Some(SyncForwarder::new(Arc::new(probe), Arc::new(backend)))
    } else {
        None
    };

    let bus_config = config.bus.clone();
    let (bus, pump) = MqttBus::connect(&bus_config, Skid::topics_for(&config));

    let skid = Arc::new(Skid::new(config, store.clone(), store.clone(), forwarder, Arc::new(bus.clone())));

    let (tx, rx) = mpsc::channel(bus_config.channel_capacity);
    let pump_task = tokio::spawn(pump.run(tx));

    let aborted = skid.run(rx, shutdown_signal()).await;
    if aborted > 0 {
        warn!(aborted, "Some tasks were aborted during shutdown");
    }

    if let Err(e) = bus.disconnect().await {
        warn!(error = %e, "MQTT disconnect failed");
    }
    if tokio::time::timeout(bus_config.request_timeout(), pump_task).await.is_err() {
        warn!("MQTT event pump did not stop in time");
    }

    store.close().await;
    info!("fo-skid stopped");
    Ok(())
}
