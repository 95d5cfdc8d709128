//! Three-axis accelerometer
//!
//! Payload: `{"accelerometer": {"x": .., "y": .., "z": ..}}`, newest line wins.
//! Yields `None` until the first well-formed vector arrives.

use super::{last_json_line, Sensor, SensorBuffer, SensorCore, SensorError, SensorKind, SensorSource};
use crate::domain::types::Acceleration;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct AccelerometerPayload {
    accelerometer: Acceleration,
}

pub struct Accelerometer {
    core: SensorCore,
    vector: Option<Acceleration>,
}

impl Accelerometer {
    pub fn new(source: Box<dyn SensorSource>) -> Self {
        Self { core: SensorCore::new(SensorKind::Accelerometer, source), vector: None }
    }

    pub fn buffer(&self) -> SensorBuffer {
        self.core.buffer()
    }

    fn decode(payload: &[u8]) -> Result<Acceleration, SensorError> {
        let line = last_json_line(payload)?;
        let parsed: AccelerometerPayload = serde_json::from_str(line)?;
        Ok(parsed.accelerometer)
    }
}

impl Sensor for Accelerometer {
    type Data = Option<Acceleration>;

    fn kind(&self) -> SensorKind {
        SensorKind::Accelerometer
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
            Ok(vector) => self.vector = Some(vector),
            Err(e) => warn!(sensor = "accelerometer", error = %e, "sensor_payload_skipped"),
        }
    }

    fn get_data(&self) -> Option<Acceleration> {
        self.vector
    }
}
