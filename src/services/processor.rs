//! Accelerometer vector to orientation angles

use crate::domain::types::{Acceleration, Angles};

/// Convert a raw acceleration vector into roll/pitch/yaw, truncated to whole degrees
///
/// Returns `None` for a missing or all-zero vector: a powered accelerometer
/// always sees gravity, so zero on every axis means no usable reading.
pub fn process_accelerometer(vector: Option<Acceleration>) -> Option<Angles> {
    let v = vector.filter(|v| !v.is_zero())?;

    let roll = v.y.atan2(v.z).to_degrees();
    let pitch = (-v.x).atan2((v.y * v.y + v.z * v.z).sqrt()).to_degrees();
    // atan2(0, 0) is 0 by convention, so a vertical vector yields yaw 0
    let yaw = v.x.atan2(v.y).to_degrees();

    Some(Angles { roll: roll.trunc() as i32, pitch: pitch.trunc() as i32, yaw: yaw.trunc() as i32 })
}
