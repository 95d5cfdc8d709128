//! Negligence report raised when a critical alert forces the drone to halt

use crate::domain::types::{CourierId, OrderId, SensorSnapshot};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Immutable record of the sensor state at the moment of a critical halt
///
/// Serialized field names follow what the reporting consumers read:
/// `negligent`, `orderId`, `data`, `detectionInstant`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NegligenceReport {
    id: String,
    negligent: CourierId,
    order_id: OrderId,
    data: SensorSnapshot,
    #[serde(rename = "detectionInstant", serialize_with = "serialize_instant")]
    instant: DateTime<Utc>,
}

impl NegligenceReport {
    pub fn new(negligent: CourierId, order_id: OrderId, data: SensorSnapshot) -> Self {
        Self::at(negligent, order_id, data, Utc::now())
    }

    pub fn at(
        negligent: CourierId,
        order_id: OrderId,
        data: SensorSnapshot,
        instant: DateTime<Utc>,
    ) -> Self {
        Self { id: new_uuid_v7(), negligent, order_id, data, instant }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn negligent(&self) -> &CourierId {
        &self.negligent
    }

    pub fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    pub fn data(&self) -> SensorSnapshot {
        self.data
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.instant
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

fn serialize_instant<S>(instant: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&instant.to_rfc3339_opts(SecondsFormat::Millis, true))
}
