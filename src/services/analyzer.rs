//! Alert classification for the two monitored dimensions
//!
//! Proximity: `d <= critical` CRITICAL, `d <= warning` WARNING, otherwise NONE.
//! A non-positive distance means the sensor has not produced a reading yet.
//!
//! Angles: roll and pitch only; yaw does not affect stability.

use crate::domain::types::{AlertLevel, Angles};
use crate::infra::config::Config;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataAnalyzer {
    proximity_warning_cm: f64,
    proximity_critical_cm: f64,
    angle_warning_deg: i32,
    angle_critical_deg: i32,
}

impl Default for DataAnalyzer {
    fn default() -> Self {
        Self {
            proximity_warning_cm: 50.0,
            proximity_critical_cm: 30.0,
            angle_warning_deg: 30,
            angle_critical_deg: 50,
        }
    }
}

impl DataAnalyzer {
    pub fn new(
        proximity_warning_cm: f64,
        proximity_critical_cm: f64,
        angle_warning_deg: i32,
        angle_critical_deg: i32,
    ) -> Self {
        Self { proximity_warning_cm, proximity_critical_cm, angle_warning_deg, angle_critical_deg }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.proximity_warning_cm(),
            config.proximity_critical_cm(),
            config.angle_warning_deg(),
            config.angle_critical_deg(),
        )
    }

    #[inline]
    pub fn classify_proximity(&self, distance: f64) -> AlertLevel {
        if distance <= 0.0 {
            AlertLevel::None
        } else if distance <= self.proximity_critical_cm {
            AlertLevel::Critical
        } else if distance <= self.proximity_warning_cm {
            AlertLevel::Warning
        } else {
            AlertLevel::None
        }
    }

    pub fn classify_angles(&self, angles: Option<Angles>) -> AlertLevel {
        let Some(angles) = angles else {
            return AlertLevel::None;
        };
        let roll = angles.roll.unsigned_abs();
        let pitch = angles.pitch.unsigned_abs();
        let exceeds = |limit: i32| roll > limit.unsigned_abs() || pitch > limit.unsigned_abs();

        if exceeds(self.angle_critical_deg) {
            AlertLevel::Critical
        } else if exceeds(self.angle_warning_deg) {
            AlertLevel::Warning
        } else {
            AlertLevel::None
        }
    }
}
