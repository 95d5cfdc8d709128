//! Drone delivery service
//!
//! Runs one drone: waits for an assignment on `order/{droneId}`, flies the
//! outbound leg, reports the outcome, flies back on callback and exits once
//! returned. Telemetry and alert levels stream to the order's topics for the
//! whole session.
//!
//! Module structure:
//! - `domain/` - Drone aggregate, identifiers, negligence reports
//! - `sensors/` - Sensor contract and simulated producers
//! - `services/` - DroneService actor, travel, alert classification
//! - `io/` - MQTT connection, wire format, report sinks, Prometheus
//! - `infra/` - Config, Metrics, embedded broker

use clap::Parser;
use drone_delivery::domain::{Drone, DroneId};
use drone_delivery::infra::broker::start_embedded_broker;
use drone_delivery::infra::{Config, Metrics};
use drone_delivery::io::mqtt::{self, InboundForwarder};
use drone_delivery::io::{
    create_bus_channel, BusReporter, JournalReporter, MqttPublisher, ReporterSet,
};
use drone_delivery::sensors::{ExternalSource, SensorKind, SensorSource, SimulatedSource};
use drone_delivery::services::DroneService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Autonomous delivery drone service
#[derive(Parser, Debug)]
#[command(name = "drone-service", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the drone id from the configuration
    #[arg(long)]
    drone_id: Option<String>,
}

fn sensor_source(config: &Config, kind: SensorKind) -> Box<dyn SensorSource> {
    if config.sensors_simulated() {
        Box::new(SimulatedSource::new(kind, config.sensor_sample_interval()))
    } else {
        Box::new(ExternalSource)
    }
}

fn build_reporters(config: &Config, bus: &drone_delivery::io::BusSender) -> ReporterSet {
    let mut reporters = ReporterSet::new();
    if config.reports_publish() {
        reporters = reporters.with(BusReporter::new(bus.clone()));
    }
    if let Some(file) = config.reports_file() {
        reporters = reporters.with(JournalReporter::new(file));
    }
    if reporters.is_empty() {
        warn!("negligence_reports_disabled");
    }
    reporters
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG controls the level; default INFO, RUST_LOG=debug for every message
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "drone-service starting");

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(|| Config::resolve_config_path(&[]));
    let mut config = Config::load_from_path(&config_path);
    if let Some(id) = args.drone_id.as_deref() {
        config = config.with_drone_id(id);
    }

    if config.broker_enabled() {
        start_embedded_broker(&config)?;
    }

    info!(
        config_file = %config.config_file(),
        drone_id = %config.drone_id(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        poll_interval_ms = %config.poll_interval().as_millis(),
        travel_duration_ms = %config.travel_duration().as_millis(),
        success_percentage = %config.success_percentage(),
        simulated_sensors = %config.sensors_simulated(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let metrics = Arc::new(Metrics::new());

    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_shutdown = shutdown_rx.clone();
        let drone_id = config.drone_id().to_string();
        tokio::spawn(async move {
            if let Err(e) = drone_delivery::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                drone_id,
                prom_shutdown,
            )
            .await
            {
                error!(error = %e, "prometheus_server_error");
            }
        });
    }

    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // One connection: the eventloop feeds the service, the publisher drains its bus
    let (client, eventloop) = mqtt::connect(&config);
    let (inbound_tx, inbound_rx) = mpsc::channel(256);
    let forwarder = InboundForwarder::new(inbound_tx, metrics.clone());
    let eventloop_task = tokio::spawn(mqtt::run_eventloop(eventloop, forwarder, shutdown_rx.clone()));

    let (bus, bus_rx) = create_bus_channel(1000, metrics.clone());
    let publisher_task = tokio::spawn(MqttPublisher::new(client, bus_rx).run(shutdown_rx.clone()));

    let reporters = build_reporters(&config, &bus);
    let drone = Drone::new(
        DroneId::new(config.drone_id()),
        sensor_source(&config, SensorKind::Proximity),
        sensor_source(&config, SensorKind::Accelerometer),
        sensor_source(&config, SensorKind::Camera),
    );
    let service = DroneService::new(config, drone, bus, Box::new(reporters), metrics.clone());

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown_signal_received");
            let _ = signal_tx.send(true);
        }
    });

    let service = service.run(inbound_rx, shutdown_rx).await;
    info!(phase = %service.phase(), "drone_service_stopped");

    // Dropping the service closes the bus; the publisher flushes and disconnects
    drop(service);
    if let Err(e) = publisher_task.await {
        error!(error = %e, "mqtt_publisher_panicked");
    }
    if tokio::time::timeout(Duration::from_secs(2), eventloop_task).await.is_err() {
        warn!("mqtt_eventloop_flush_timeout");
    }
    let _ = shutdown_tx.send(true);

    metrics.report().log();
    info!("drone-service shutdown complete");
    Ok(())
}
