//! Dispatch tool for driving a drone by hand
//!
//! Usage:
//!   cargo run --bin dispatch -- assign --order 1017 --courier mario
//!   cargo run --bin dispatch -- callback --order 1017
//!   cargo run --bin dispatch -- mode --order 1017 manual
//!   cargo run --bin dispatch -- move --order 1017 proceed
//!   cargo run --bin dispatch -- watch --order 1017 --until-returned
//!
//! Broker settings and the default drone id come from the same TOML file the
//! service reads.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use drone_delivery::domain::{CourierId, DrivingMode, DroneId, OrderId};
use drone_delivery::infra::Config;
use drone_delivery::io::messages::{
    alert_topic, control_topic, data_topic, lifecycle_topic, order_topic, order_topic_for_drone,
    AssignmentPayload, ControlCommand, ControlPayload, SyncPayload, CALLBACK,
};
use drone_delivery::io::mqtt::mqtt_options;
use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dispatch", version, about = "Send orders and commands to a delivery drone")]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Seconds to wait for the broker to acknowledge
    #[arg(long, default_value_t = 5, global = true)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assign an order to a drone
    Assign {
        #[arg(long)]
        order: String,
        #[arg(long)]
        courier: String,
        /// Target drone (defaults to the configured drone id)
        #[arg(long)]
        drone: Option<String>,
    },
    /// Call the drone back after the delivery outcome
    Callback {
        #[arg(long)]
        order: String,
    },
    /// Switch driving mode
    Mode {
        #[arg(long)]
        order: String,
        mode: ModeArg,
    },
    /// Operator proceed or halt
    Move {
        #[arg(long)]
        order: String,
        direction: MoveArg,
    },
    /// Print telemetry, alerts and lifecycle updates for an order
    Watch {
        #[arg(long)]
        order: String,
        /// Exit once the drone reports it has returned
        #[arg(long)]
        until_returned: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Automatic,
    Manual,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MoveArg {
    Proceed,
    Halt,
}

/// Publish one message and wait for the broker's PubAck
async fn publish_once(
    client: &AsyncClient,
    eventloop: &mut EventLoop,
    topic: String,
    payload: Vec<u8>,
    timeout: Duration,
) -> anyhow::Result<()> {
    client.publish(&topic, QoS::AtLeastOnce, false, payload).await?;

    tokio::time::timeout(timeout, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::PubAck(_))) => return Ok(()),
                Ok(event) => debug!(?event, "mqtt_event"),
                Err(e) => return Err(anyhow::Error::new(e)),
            }
        }
    })
    .await
    .with_context(|| format!("No acknowledgement for {topic}"))??;

    info!(topic = %topic, "published");
    let _ = client.disconnect().await;
    Ok(())
}

async fn watch(
    client: &AsyncClient,
    eventloop: &mut EventLoop,
    order_id: &OrderId,
    until_returned: bool,
) -> anyhow::Result<()> {
    for topic in [data_topic(order_id), alert_topic(order_id), lifecycle_topic(order_id)] {
        client.subscribe(&topic, QoS::AtLeastOnce).await?;
    }
    info!(order_id = %order_id, "watching");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            result = eventloop.poll() => match result {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let text = String::from_utf8_lossy(&publish.payload);
                    println!("{} {}", publish.topic, text);
                    let returned = serde_json::from_slice::<serde_json::Value>(&publish.payload)
                        .map(|v| v["status"] == "returned")
                        .unwrap_or(false);
                    if until_returned && returned {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "mqtt_connection_error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
    let _ = client.disconnect().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(|| Config::resolve_config_path(&[]));
    let config = Config::load_from_path(&config_path);
    let timeout = Duration::from_secs(args.timeout_secs);

    let client_id = format!("dispatch-{}", std::process::id());
    let (client, mut eventloop) = AsyncClient::new(mqtt_options(&config, &client_id, true), 10);

    match args.command {
        Command::Assign { order, courier, drone } => {
            let drone = DroneId::new(drone.unwrap_or_else(|| config.drone_id().to_string()));
            let (order, courier) = (OrderId::new(order), CourierId::new(courier));
            let payload = serde_json::to_vec(&AssignmentPayload::new(&order, &courier))?;
            publish_once(&client, &mut eventloop, order_topic_for_drone(&drone), payload, timeout)
                .await
        }
        Command::Callback { order } => {
            let payload = serde_json::to_vec(&SyncPayload { sync: CALLBACK })?;
            let topic = order_topic(&OrderId::new(order));
            publish_once(&client, &mut eventloop, topic, payload, timeout).await
        }
        Command::Mode { order, mode } => {
            let mode = match mode {
                ModeArg::Automatic => DrivingMode::Automatic,
                ModeArg::Manual => DrivingMode::Manual,
            };
            let payload = serde_json::to_vec(&ControlPayload::from_command(ControlCommand::Mode(mode)))?;
            let topic = control_topic(&OrderId::new(order));
            publish_once(&client, &mut eventloop, topic, payload, timeout).await
        }
        Command::Move { order, direction } => {
            let command = match direction {
                MoveArg::Proceed => ControlCommand::Proceed,
                MoveArg::Halt => ControlCommand::Halt,
            };
            let payload = serde_json::to_vec(&ControlPayload::from_command(command))?;
            let topic = control_topic(&OrderId::new(order));
            publish_once(&client, &mut eventloop, topic, payload, timeout).await
        }
        Command::Watch { order, until_returned } => {
            watch(&client, &mut eventloop, &OrderId::new(order), until_returned).await
        }
    }
}
