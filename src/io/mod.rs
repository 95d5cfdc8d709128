//! IO modules - external system interfaces
//!
//! - `messages` - wire payloads, topic names and inbound decoding
//! - `bus` - typed channel from the service to the MQTT connection
//! - `mqtt` - MQTT eventloop (inbound) and publisher actor (outbound)
//! - `reporter` - negligence report sinks (MQTT, JSONL journal)
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod bus;
pub mod messages;
pub mod mqtt;
pub mod prometheus;
pub mod reporter;

pub use bus::{create_bus_channel, BusMessage, BusSender};
pub use mqtt::{InboundMessage, MqttPublisher};
pub use reporter::{BusReporter, JournalReporter, NegligenceReporter, ReporterSet};
