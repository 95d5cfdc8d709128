//! Drone sensors
//!
//! Every sensor follows the same contract:
//! - `activate()` starts a producer that writes raw payloads into the sensor's buffer
//! - `read_data()` consumes the latest payload (non-blocking) and decodes it,
//!   keeping the last known value when nothing new arrived or decoding failed
//! - `get_data()` returns a copy of the decoded value
//! - `deactivate()` stops the producer; further reads are no-ops
//!
//! Producers are pluggable through [`SensorSource`]: the service binary uses
//! [`SimulatedSource`], tests push payloads straight into the buffer.

pub mod accelerometer;
pub mod camera;
pub mod proximity;
pub mod simulator;

pub use accelerometer::Accelerometer;
pub use camera::Camera;
pub use proximity::ProximitySensor;
pub use simulator::SimulatedSource;

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Sensor variants carried by a drone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Proximity,
    Accelerometer,
    Camera,
}

impl SensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Proximity => "proximity",
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Camera => "camera",
        }
    }
}

/// Failure to decode a raw sensor payload
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("payload is empty")]
    Empty,
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("payload is not valid sensor JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Single-slot buffer holding the most recent raw payload of a sensor
///
/// Writers overwrite, the reader takes. Cloning shares the slot.
#[derive(Debug, Clone, Default)]
pub struct SensorBuffer {
    slot: Arc<Mutex<Option<Vec<u8>>>>,
}

impl SensorBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the buffered payload
    pub fn write(&self, payload: impl Into<Vec<u8>>) {
        *self.slot.lock() = Some(payload.into());
    }

    /// Take the buffered payload, leaving the slot empty
    pub fn take(&self) -> Option<Vec<u8>> {
        self.slot.lock().take()
    }

    pub fn clear(&self) {
        self.slot.lock().take();
    }

    pub fn has_payload(&self) -> bool {
        self.slot.lock().is_some()
    }
}

/// Producer side of a sensor
pub trait SensorSource: Send {
    /// Begin writing payloads into `buffer`
    fn start(&mut self, buffer: SensorBuffer);
    /// Stop producing and release held resources
    fn stop(&mut self);
}

/// Source whose payloads are written by the owner of the buffer handle
#[derive(Debug, Default)]
pub struct ExternalSource;

impl SensorSource for ExternalSource {
    fn start(&mut self, _buffer: SensorBuffer) {}

    fn stop(&mut self) {}
}

/// Common sensor capability
pub trait Sensor {
    type Data: Copy;

    fn kind(&self) -> SensorKind;
    fn activate(&mut self);
    fn deactivate(&mut self);
    fn is_on(&self) -> bool;
    /// Consume the latest buffered payload, if any, and update the decoded value
    fn read_data(&mut self);
    fn get_data(&self) -> Self::Data;
}

/// Activation flag, buffer and producer shared by every sensor variant
pub(crate) struct SensorCore {
    kind: SensorKind,
    on: bool,
    buffer: SensorBuffer,
    source: Box<dyn SensorSource>,
}

impl SensorCore {
    pub(crate) fn new(kind: SensorKind, source: Box<dyn SensorSource>) -> Self {
        Self { kind, on: false, buffer: SensorBuffer::new(), source }
    }

    pub(crate) fn activate(&mut self) {
        if self.on {
            return;
        }
        self.on = true;
        self.source.start(self.buffer.clone());
        debug!(sensor = %self.kind.as_str(), "sensor_activated");
    }

    pub(crate) fn deactivate(&mut self) {
        if !self.on {
            return;
        }
        self.source.stop();
        self.buffer.clear();
        self.on = false;
        debug!(sensor = %self.kind.as_str(), "sensor_deactivated");
    }

    pub(crate) fn is_on(&self) -> bool {
        self.on
    }

    /// Next payload to decode; `None` while off or when nothing new arrived
    pub(crate) fn next_payload(&self) -> Option<Vec<u8>> {
        if !self.on {
            return None;
        }
        self.buffer.take()
    }

    pub(crate) fn buffer(&self) -> SensorBuffer {
        self.buffer.clone()
    }
}

/// Text producers append line-delimited JSON; only the newest line matters
pub(crate) fn last_json_line(payload: &[u8]) -> Result<&str, SensorError> {
    let text = std::str::from_utf8(payload)?;
    text.lines().rev().map(str::trim).find(|line| !line.is_empty()).ok_or(SensorError::Empty)
}
