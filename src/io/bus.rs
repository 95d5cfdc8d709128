//! Typed channel between the drone service and the MQTT connection
//!
//! The service never touches the client directly: it pushes [`BusMessage`]s
//! through a bounded mpsc channel with `try_send`, so a slow or disconnected
//! broker can never stall the poll loop. Dropped messages are counted and
//! logged, never retried.

use crate::domain::types::{AlertLevel, AlertType, LifecycleStatus, Motion, OrderId, SensorSnapshot};
use crate::infra::metrics::Metrics;
use crate::io::messages::{
    alert_topic, data_topic, lifecycle_topic, AlertPayload, MovingStatePayload, StatusPayload,
};
use rumqttc::QoS;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, warn};

/// Commands for the connection owner
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    Publish { topic: String, payload: Vec<u8>, qos: QoS },
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    /// Close the session's connection once everything queued before it went out
    Disconnect,
}

/// Sender handle for bus messages
///
/// Clone this to share across producers. Non-blocking: if the channel is full
/// the message is dropped.
#[derive(Clone)]
pub struct BusSender {
    tx: mpsc::Sender<BusMessage>,
    metrics: Arc<Metrics>,
}

impl BusSender {
    pub fn new(tx: mpsc::Sender<BusMessage>, metrics: Arc<Metrics>) -> Self {
        Self { tx, metrics }
    }

    /// Queue a message; returns false if it was dropped
    pub fn send(&self, message: BusMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                self.metrics.record_bus_dropped();
                warn!(message = ?summary(&message), "bus_message_dropped: channel full");
                false
            }
            Err(TrySendError::Closed(message)) => {
                self.metrics.record_bus_dropped();
                warn!(message = ?summary(&message), "bus_message_dropped: channel closed");
                false
            }
        }
    }

    /// Serialize and queue a publish
    pub fn publish_json<T: Serialize>(&self, topic: String, payload: &T, qos: QoS) -> bool {
        match serde_json::to_vec(payload) {
            Ok(payload) => self.send(BusMessage::Publish { topic, payload, qos }),
            Err(e) => {
                error!(topic = %topic, error = %e, "bus_serialize_failed");
                false
            }
        }
    }

    pub fn publish_telemetry(&self, order_id: &OrderId, snapshot: &SensorSnapshot) -> bool {
        self.publish_json(data_topic(order_id), snapshot, QoS::AtMostOnce)
    }

    pub fn publish_alert(&self, order_id: &OrderId, kind: AlertType, level: AlertLevel) -> bool {
        self.publish_json(alert_topic(order_id), &AlertPayload::new(level, kind), QoS::AtLeastOnce)
    }

    pub fn publish_status(&self, order_id: &OrderId, status: LifecycleStatus) -> bool {
        self.publish_json(lifecycle_topic(order_id), &StatusPayload::new(status), QoS::AtLeastOnce)
    }

    pub fn publish_moving_state(&self, order_id: &OrderId, motion: Motion) -> bool {
        self.publish_json(
            lifecycle_topic(order_id),
            &MovingStatePayload::new(motion),
            QoS::AtLeastOnce,
        )
    }

    pub fn subscribe(&self, topic: String) -> bool {
        self.send(BusMessage::Subscribe { topic })
    }

    pub fn unsubscribe(&self, topic: String) -> bool {
        self.send(BusMessage::Unsubscribe { topic })
    }

    pub fn disconnect(&self) -> bool {
        self.send(BusMessage::Disconnect)
    }
}

/// Topic-only view for log lines
fn summary(message: &BusMessage) -> &str {
    match message {
        BusMessage::Publish { topic, .. }
        | BusMessage::Subscribe { topic }
        | BusMessage::Unsubscribe { topic } => topic,
        BusMessage::Disconnect => "disconnect",
    }
}

/// Create a new bus channel pair
pub fn create_bus_channel(
    buffer_size: usize,
    metrics: Arc<Metrics>,
) -> (BusSender, mpsc::Receiver<BusMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (BusSender::new(tx, metrics), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_status_shape() {
        let (sender, mut rx) = create_bus_channel(8, Arc::new(Metrics::new()));
        assert!(sender.publish_status(&OrderId::new("5"), LifecycleStatus::Returned));

        match rx.try_recv().unwrap() {
            BusMessage::Publish { topic, payload, qos } => {
                assert_eq!(topic, "lifecycle/5");
                assert_eq!(payload, br#"{"status":"returned"}"#.to_vec());
                assert_eq!(qos, QoS::AtLeastOnce);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_full_channel_drops_and_counts() {
        let metrics = Arc::new(Metrics::new());
        let (sender, _rx) = create_bus_channel(1, metrics.clone());
        assert!(sender.subscribe("a".to_string()));
        assert!(!sender.subscribe("b".to_string()));
        assert_eq!(metrics.bus_dropped(), 1);
    }

    #[test]
    fn test_closed_channel_drops() {
        let metrics = Arc::new(Metrics::new());
        let (sender, rx) = create_bus_channel(4, metrics.clone());
        drop(rx);
        assert!(!sender.disconnect());
        assert_eq!(metrics.bus_dropped(), 1);
    }
}
