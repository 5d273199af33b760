//! Sensor bridge - translates local sensor readings for a cloud MQTT broker
//!
//! The local broker carries `<sensor> <value>` text on one topic. The cloud
//! broker wants a bare number on a feed topic. Every Nth valid reading is
//! forwarded through a short-lived remote session.
//!
//! Module structure:
//! - `domain/` - Reading parsing
//! - `io/` - Local subscriber, remote publisher
//! - `services/` - Translator, throttle, forward worker
//! - `infra/` - Config, metrics, logging, embedded broker

use anyhow::Context;
use clap::Parser;
use sensor_bridge::infra::{broker, logging, Config, Metrics};
use sensor_bridge::io::{LocalSubscriber, LoggingObserver, MqttRemotePublisher, RemotePublisher};
use sensor_bridge::services::{create_forward_worker, Translator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Sensor bridge - throttled local-to-cloud MQTT translation
#[derive(Parser, Debug)]
#[command(name = "sensor-bridge", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/bridge.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = Config::resolve_config_path(args.config.as_deref());
    let config = Config::load_from_path(&config_path)?;

    logging::init(config.log_json());
    info!("sensor-bridge starting");

    if config.config_file() == "default" {
        warn!(config_file = %config_path, "config_file_missing_using_defaults");
    }
    info!(
        config_file = %config.config_file(),
        local_host = %config.local().host,
        local_port = %config.local().port,
        local_topic = %config.local().topic,
        remote_host = %config.remote().host,
        remote_topic = %config.remote().topic,
        threshold = %config.throttle_threshold(),
        initial_count = %config.throttle_initial_count(),
        queued = %config.remote().queued,
        "config_loaded"
    );
    if config.remote().username.is_empty() {
        warn!("remote_username_not_set");
    }

    if config.broker().enabled {
        broker::start_embedded_broker(&config.broker().bind_address, config.broker().port)?;
    }

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics = Arc::new(Metrics::new());

    let mqtt_publisher: Arc<dyn RemotePublisher> = Arc::new(
        MqttRemotePublisher::new(config.remote()).with_observer(Arc::new(LoggingObserver)),
    );

    // Queued mode runs remote sessions on their own task
    let publisher: Arc<dyn RemotePublisher> = if config.remote().queued {
        let (queued, worker) =
            create_forward_worker(mqtt_publisher, metrics.clone(), config.remote().queue_size);
        tokio::spawn(worker.run());
        Arc::new(queued)
    } else {
        mqtt_publisher
    };

    // Start metrics reporter (if interval > 0)
    let metrics_interval = config.metrics_interval_secs();
    if metrics_interval > 0 {
        let metrics_clone = metrics.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
            loop {
                interval.tick().await;
                metrics_clone.report().log();
            }
        });
    }

    let translator = Translator::new(&config, publisher, metrics.clone());

    let subscriber = LocalSubscriber::connect(config.local(), metrics.clone())
        .await
        .with_context(|| {
            format!("Cannot reach local broker {}:{}", config.local().host, config.local().port)
        })?;

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Runs until shutdown
    subscriber.run(translator, shutdown_rx).await;

    metrics.report().log();
    info!("sensor-bridge shutdown complete");
    Ok(())
}
