//! Shared types for the drone delivery service

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Ids become topic levels, so separators, wildcards and NUL are not allowed
pub fn is_topic_level(id: &str) -> bool {
    !id.is_empty() && !id.contains(['/', '+', '#', '\0'])
}

/// Order identifier threaded through every topic and payload of a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order ids arrive either as JSON strings or as integers
impl<'de> Deserialize<'de> for OrderId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct OrderIdVisitor;

        impl<'de> Visitor<'de> for OrderIdVisitor {
            type Value = OrderId;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or integer order id usable as a topic level")
            }

            fn visit_str<E>(self, value: &str) -> Result<OrderId, E>
            where
                E: de::Error,
            {
                let trimmed = value.trim();
                if !is_topic_level(trimmed) {
                    return Err(E::invalid_value(de::Unexpected::Str(value), &self));
                }
                Ok(OrderId(trimmed.to_string()))
            }

            fn visit_u64<E>(self, value: u64) -> Result<OrderId, E>
            where
                E: de::Error,
            {
                Ok(OrderId(value.to_string()))
            }

            fn visit_i64<E>(self, value: i64) -> Result<OrderId, E>
            where
                E: de::Error,
            {
                Ok(OrderId(value.to_string()))
            }
        }

        deserializer.deserialize_any(OrderIdVisitor)
    }
}

/// Courier responsible for the order; the negligent party on a critical alert
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourierId(pub String);

impl CourierId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CourierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of this drone on the bus (`order/{droneId}`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DroneId(pub String);

impl DroneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DroneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordinal severity of a monitored dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum AlertLevel {
    #[default]
    None,
    Warning,
    Critical,
}

impl AlertLevel {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::None => "none",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dimension an alert level refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertType {
    Distance,
    Angle,
}

impl AlertType {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Distance => "distance",
            AlertType::Angle => "angle",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who governs the drone's motion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DrivingMode {
    /// Self-governing: travel completion and critical alerts halt the drone
    #[default]
    Automatic,
    /// Operator-governed: only explicit proceed/halt directives move it
    Manual,
}

impl DrivingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrivingMode::Automatic => "automatic",
            DrivingMode::Manual => "manual",
        }
    }
}

/// Whether the drone is currently travelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Motion {
    Moving,
    #[default]
    Stopped,
}

impl Motion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Motion::Moving => "moving",
            Motion::Stopped => "stopped",
        }
    }
}

/// Status values published on `lifecycle/{orderId}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleStatus {
    Delivering,
    Succeeded,
    Failed,
    Returning,
    Returned,
}

impl LifecycleStatus {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Delivering => "delivering",
            LifecycleStatus::Succeeded => "succeeded",
            LifecycleStatus::Failed => "failed",
            LifecycleStatus::Returning => "returning",
            LifecycleStatus::Returned => "returned",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw accelerometer axes
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Acceleration {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Acceleration {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }
}

/// Orientation derived from an acceleration vector, in whole degrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Angles {
    pub roll: i32,
    pub pitch: i32,
    pub yaw: i32,
}

/// Missing angles go on the wire as an empty object
pub fn serialize_angles<S>(angles: &Option<Angles>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    use serde::ser::SerializeMap;

    match angles {
        Some(angles) => angles.serialize(serializer),
        None => serializer.serialize_map(Some(0))?.end(),
    }
}

/// One poll cycle's worth of decoded sensor values
///
/// Serializes to the telemetry shape `{proximity, accelerometer, camera}`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SensorSnapshot {
    /// Distance to the nearest obstacle in centimeters; non-positive until the sensor warms up
    pub proximity: f64,
    /// Orientation, absent until the accelerometer produced a usable vector
    #[serde(rename = "accelerometer", serialize_with = "serialize_angles")]
    pub angles: Option<Angles>,
    /// Byte length of the latest camera frame
    #[serde(rename = "camera")]
    pub camera_bytes: usize,
}
