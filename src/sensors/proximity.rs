//! Ultrasonic proximity sensor
//!
//! Payload: `{"proximity": <centimeters>}`, newest line wins.

use super::{last_json_line, Sensor, SensorBuffer, SensorCore, SensorError, SensorKind, SensorSource};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct ProximityPayload {
    proximity: f64,
}

pub struct ProximitySensor {
    core: SensorCore,
    distance: f64,
}

impl ProximitySensor {
    pub fn new(source: Box<dyn SensorSource>) -> Self {
        Self { core: SensorCore::new(SensorKind::Proximity, source), distance: 0.0 }
    }

    /// Handle for pushing payloads from outside the sensor
    pub fn buffer(&self) -> SensorBuffer {
        self.core.buffer()
    }

    fn decode(payload: &[u8]) -> Result<f64, SensorError> {
        let line = last_json_line(payload)?;
        let parsed: ProximityPayload = serde_json::from_str(line)?;
        Ok(parsed.proximity)
    }
}

impl Sensor for ProximitySensor {
    type Data = f64;

    fn kind(&self) -> SensorKind {
        SensorKind::Proximity
    }

    fn activate(&mut self) {
        self.core.activate();
    }

    fn deactivate(&mut self) {
        self.core.deactivate();
    }

    fn is_on(&self) -> bool {
        self.core.is_on()
    }

    fn read_data(&mut self) {
        let Some(payload) = self.core.next_payload() else { return };
        match Self::decode(&payload) {
            Ok(distance) => self.distance = distance,
            Err(e) => warn!(sensor = "proximity", error = %e, "sensor_payload_skipped"),
        }
    }

    fn get_data(&self) -> f64 {
        self.distance
    }
}
