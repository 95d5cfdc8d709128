//! Simulated sensor producers
//!
//! Stand-ins for the hardware drivers: a tokio task per sensor writes a fresh
//! payload into the buffer every `interval`. Readings are mostly nominal with
//! occasional excursions into the warning and critical bands so that a
//! simulated flight exercises the alert path.

use super::{SensorBuffer, SensorKind, SensorSource};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Probability that a sample falls in the critical band
const CRITICAL_CHANCE: f64 = 0.02;
/// Probability that a sample falls in the warning band
const WARNING_CHANCE: f64 = 0.08;

pub struct SimulatedSource {
    kind: SensorKind,
    interval: Duration,
    seed: Option<u64>,
    task: Option<JoinHandle<()>>,
}

impl SimulatedSource {
    pub fn new(kind: SensorKind, interval: Duration) -> Self {
        Self { kind, interval, seed: None, task: None }
    }

    /// Deterministic readings, for reproducible runs
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl SensorSource for SimulatedSource {
    fn start(&mut self, buffer: SensorBuffer) {
        if self.task.is_some() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(sensor = %self.kind.as_str(), "simulated_sensor_without_runtime");
            return;
        };

        let kind = self.kind;
        let period = self.interval.max(Duration::from_millis(1));
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        self.task = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                buffer.write(sample(kind, &mut rng));
            }
        }));
        debug!(sensor = %kind.as_str(), interval_ms = %period.as_millis(), "simulated_sensor_started");
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(sensor = %self.kind.as_str(), "simulated_sensor_stopped");
        }
    }
}

impl Drop for SimulatedSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Produce one raw payload for the given sensor
pub fn sample(kind: SensorKind, rng: &mut impl Rng) -> Vec<u8> {
    match kind {
        SensorKind::Proximity => {
            let roll: f64 = rng.gen();
            let distance = if roll < CRITICAL_CHANCE {
                rng.gen_range(5.0..30.0)
            } else if roll < CRITICAL_CHANCE + WARNING_CHANCE {
                rng.gen_range(30.0..50.0)
            } else {
                rng.gen_range(50.0..400.0)
            };
            format!("{}\n", json!({ "proximity": round2(distance) })).into_bytes()
        }
        SensorKind::Accelerometer => {
            let roll: f64 = rng.gen();
            // Level flight keeps gravity on z; a tilt rotates it towards y
            let tilt_deg: f64 = if roll < CRITICAL_CHANCE {
                rng.gen_range(55.0..80.0)
            } else if roll < CRITICAL_CHANCE + WARNING_CHANCE {
                rng.gen_range(32.0..48.0)
            } else {
                rng.gen_range(-10.0..10.0)
            };
            let tilt = tilt_deg.to_radians();
            let x = rng.gen_range(-0.05..0.05);
            let y = tilt.sin();
            let z = tilt.cos();
            let payload = json!({ "accelerometer": { "x": round2(x), "y": round2(y), "z": round2(z) } });
            format!("{}\n", payload).into_bytes()
        }
        SensorKind::Camera => vec![0u8; rng.gen_range(8_000..64_000)],
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::{Accelerometer, Camera, ProximitySensor, Sensor};

    #[test]
    fn test_samples_decode_with_real_sensors() {
        let mut rng = StdRng::seed_from_u64(7);

        let mut proximity = ProximitySensor::new(Box::new(crate::sensors::ExternalSource));
        let mut accelerometer = Accelerometer::new(Box::new(crate::sensors::ExternalSource));
        let mut camera = Camera::new(Box::new(crate::sensors::ExternalSource));
        proximity.activate();
        accelerometer.activate();
        camera.activate();

        for _ in 0..50 {
            proximity.buffer().write(sample(SensorKind::Proximity, &mut rng));
            accelerometer.buffer().write(sample(SensorKind::Accelerometer, &mut rng));
            camera.buffer().write(sample(SensorKind::Camera, &mut rng));
            proximity.read_data();
            accelerometer.read_data();
            camera.read_data();

            assert!(proximity.get_data() >= 5.0 && proximity.get_data() <= 400.0);
            assert!(accelerometer.get_data().is_some());
            assert!(camera.get_data() >= 8_000);
        }
    }

    #[test]
    fn test_start_without_runtime_is_harmless() {
        let mut source = SimulatedSource::new(SensorKind::Proximity, Duration::from_millis(10));
        source.start(SensorBuffer::new());
        assert!(!source.is_running());
        source.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_producer_fills_buffer_until_stopped() {
        let buffer = SensorBuffer::new();
        let mut source =
            SimulatedSource::new(SensorKind::Proximity, Duration::from_millis(100)).with_seed(1);
        source.start(buffer.clone());
        assert!(source.is_running());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(buffer.take().is_some());

        source.stop();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(buffer.take().is_none());
    }
}
