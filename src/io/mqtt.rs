//! MQTT connection for the drone
//!
//! One `AsyncClient` serves both directions:
//! - `run_eventloop` polls the connection and forwards inbound publishes to the
//!   service's channel with `try_send`
//! - `MqttPublisher` drains [`BusMessage`]s (publish, subscribe, unsubscribe,
//!   disconnect) from the service's bus channel
//!
//! The session is persistent (`clean_session = false`) so the broker keeps the
//! drone's subscriptions across reconnects.

use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::bus::BusMessage;
use bytes::Bytes;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Capacity of the client's request queue
const REQUEST_CAPACITY: usize = 100;

/// Inbound publish handed to the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self { topic: topic.into(), payload: payload.into() }
    }
}

/// Connection options shared by the service and the dispatch tool
pub fn mqtt_options(config: &Config, client_id: &str, clean_session: bool) -> MqttOptions {
    let mut options = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    options.set_keep_alive(config.mqtt_keep_alive());
    options.set_clean_session(clean_session);
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        options.set_credentials(username, password);
    }
    options
}

/// Create the drone's client and eventloop
pub fn connect(config: &Config) -> (AsyncClient, EventLoop) {
    let client_id = format!("drone-{}", config.drone_id());
    AsyncClient::new(mqtt_options(config, &client_id, false), REQUEST_CAPACITY)
}

/// Non-blocking hand-off of inbound publishes with rate-limited drop warnings
pub struct InboundForwarder {
    tx: mpsc::Sender<InboundMessage>,
    metrics: Arc<Metrics>,
    last_drop_warn: Instant,
}

impl InboundForwarder {
    pub fn new(tx: mpsc::Sender<InboundMessage>, metrics: Arc<Metrics>) -> Self {
        Self { tx, metrics, last_drop_warn: Instant::now() - Duration::from_secs(2) }
    }

    /// Forward a message; returns false once the receiver is gone
    pub fn forward(&mut self, message: InboundMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                self.metrics.record_inbound_rejected();
                if self.last_drop_warn.elapsed() > Duration::from_secs(1) {
                    warn!(topic = %message.topic, "mqtt_inbound_dropped: channel full");
                    self.last_drop_warn = Instant::now();
                }
                true
            }
            Err(TrySendError::Closed(_)) => {
                warn!("mqtt_inbound_channel_closed");
                false
            }
        }
    }
}

/// Poll the connection until shutdown, disconnect, or the service goes away
pub async fn run_eventloop(
    mut eventloop: EventLoop,
    mut forwarder: InboundForwarder,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("mqtt_eventloop_shutdown");
                    return;
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        debug!(topic = %publish.topic, bytes = %publish.payload.len(), "mqtt_publish_received");
                        let message = InboundMessage::new(publish.topic, publish.payload);
                        if !forwarder.forward(message) {
                            return;
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        info!(session_present = %ack.session_present, "mqtt_connected");
                    }
                    Ok(Event::Incoming(Packet::SubAck(ack))) => {
                        debug!(pkid = %ack.pkid, "mqtt_suback");
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        info!("mqtt_disconnected");
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "mqtt_connection_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

/// MQTT publisher actor
///
/// Receives bus messages and applies them to the client in order.
pub struct MqttPublisher {
    client: AsyncClient,
    rx: mpsc::Receiver<BusMessage>,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient, rx: mpsc::Receiver<BusMessage>) -> Self {
        Self { client, rx }
    }

    /// Run until a disconnect is processed, the channel closes or shutdown is signalled
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("mqtt_publisher_started");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("mqtt_publisher_shutdown");
                        // Drain what the service queued before stopping
                        while let Ok(message) = self.rx.try_recv() {
                            if !self.apply(message).await {
                                return;
                            }
                        }
                        self.disconnect().await;
                        return;
                    }
                }
                message = self.rx.recv() => {
                    match message {
                        Some(message) => {
                            if !self.apply(message).await {
                                return;
                            }
                        }
                        None => {
                            self.disconnect().await;
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Apply one message; returns false after a disconnect
    async fn apply(&self, message: BusMessage) -> bool {
        match message {
            BusMessage::Publish { topic, payload, qos } => {
                if let Err(e) = self.client.publish(&topic, qos, false, payload).await {
                    error!(topic = %topic, error = %e, "mqtt_publish_failed");
                }
            }
            BusMessage::Subscribe { topic } => {
                match self.client.subscribe(&topic, QoS::AtLeastOnce).await {
                    Ok(()) => info!(topic = %topic, "mqtt_subscribed"),
                    Err(e) => error!(topic = %topic, error = %e, "mqtt_subscribe_failed"),
                }
            }
            BusMessage::Unsubscribe { topic } => {
                match self.client.unsubscribe(&topic).await {
                    Ok(()) => info!(topic = %topic, "mqtt_unsubscribed"),
                    Err(e) => error!(topic = %topic, error = %e, "mqtt_unsubscribe_failed"),
                }
            }
            BusMessage::Disconnect => {
                self.disconnect().await;
                return false;
            }
        }
        true
    }

    async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "mqtt_disconnect_failed");
        }
    }
}
