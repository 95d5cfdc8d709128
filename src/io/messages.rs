//! Wire format for the drone's MQTT topics
//!
//! Inbound:
//! - `order/{droneId}`   `{"sync": "perform delivery", "orderId": .., "courier": ..}`
//! - `order/{orderId}`   `{"sync": "callback"}`
//! - `control/{orderId}` `{"mode": "automatic" | "manual"}` or `{"move": "proceed" | "halt"}`
//!
//! Outbound:
//! - `data/{orderId}`       telemetry snapshot
//! - `alertLevel/{orderId}` `{"level", "type"}`
//! - `lifecycle/{orderId}`  `{"status"}` or `{"movingState"}`
//! - `negligenceReports/{courier}` negligence report
//!
//! Keyword values are matched case-insensitively.

use crate::domain::types::{
    is_topic_level, AlertLevel, AlertType, CourierId, DrivingMode, DroneId, LifecycleStatus,
    Motion, OrderId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PERFORM_DELIVERY: &str = "perform delivery";
pub const CALLBACK: &str = "callback";
pub const PROCEED: &str = "proceed";
pub const HALT: &str = "halt";

pub fn order_topic_for_drone(drone_id: &DroneId) -> String {
    format!("order/{drone_id}")
}

pub fn order_topic(order_id: &OrderId) -> String {
    format!("order/{order_id}")
}

pub fn control_topic(order_id: &OrderId) -> String {
    format!("control/{order_id}")
}

pub fn data_topic(order_id: &OrderId) -> String {
    format!("data/{order_id}")
}

pub fn alert_topic(order_id: &OrderId) -> String {
    format!("alertLevel/{order_id}")
}

pub fn lifecycle_topic(order_id: &OrderId) -> String {
    format!("lifecycle/{order_id}")
}

pub fn negligence_topic(courier: &CourierId) -> String {
    format!("negligenceReports/{courier}")
}

/// Rejected inbound payload
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown sync value: {0:?}")]
    UnknownSync(String),
    #[error("unknown driving mode: {0:?}")]
    UnknownMode(String),
    #[error("unknown move directive: {0:?}")]
    UnknownMove(String),
    #[error("{0}")]
    Shape(&'static str),
}

/// Delivery assignment addressed to this drone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub order_id: OrderId,
    pub courier: CourierId,
}

/// Operator command on the control topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Mode(DrivingMode),
    Proceed,
    Halt,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignmentWire {
    sync: String,
    #[serde(alias = "id")]
    order_id: OrderId,
    courier: CourierId,
}

#[derive(Debug, Deserialize)]
struct SyncWire {
    sync: String,
}

#[derive(Debug, Deserialize)]
struct ControlWire {
    mode: Option<String>,
    #[serde(rename = "move")]
    movement: Option<String>,
}

fn text(payload: &[u8]) -> Result<&str, DecodeError> {
    Ok(std::str::from_utf8(payload)?)
}

pub fn parse_assignment(payload: &[u8]) -> Result<Assignment, DecodeError> {
    let wire: AssignmentWire = serde_json::from_str(text(payload)?)?;
    if !wire.sync.trim().eq_ignore_ascii_case(PERFORM_DELIVERY) {
        return Err(DecodeError::UnknownSync(wire.sync));
    }
    if wire.courier.as_str().trim().is_empty() {
        return Err(DecodeError::Shape("courier must not be empty"));
    }
    if !is_topic_level(wire.courier.as_str()) {
        return Err(DecodeError::Shape("courier must be usable as a topic level"));
    }
    Ok(Assignment { order_id: wire.order_id, courier: wire.courier })
}

pub fn parse_callback(payload: &[u8]) -> Result<(), DecodeError> {
    let wire: SyncWire = serde_json::from_str(text(payload)?)?;
    if wire.sync.trim().eq_ignore_ascii_case(CALLBACK) {
        Ok(())
    } else {
        Err(DecodeError::UnknownSync(wire.sync))
    }
}

pub fn parse_control(payload: &[u8]) -> Result<ControlCommand, DecodeError> {
    let wire: ControlWire = serde_json::from_str(text(payload)?)?;
    match (wire.mode, wire.movement) {
        (Some(mode), None) => parse_mode(&mode).map(ControlCommand::Mode),
        (None, Some(movement)) => {
            let value = movement.trim();
            if value.eq_ignore_ascii_case(PROCEED) {
                Ok(ControlCommand::Proceed)
            } else if value.eq_ignore_ascii_case(HALT) {
                Ok(ControlCommand::Halt)
            } else {
                Err(DecodeError::UnknownMove(movement))
            }
        }
        (Some(_), Some(_)) => Err(DecodeError::Shape("control carries both mode and move")),
        (None, None) => Err(DecodeError::Shape("control carries neither mode nor move")),
    }
}

fn parse_mode(value: &str) -> Result<DrivingMode, DecodeError> {
    [DrivingMode::Automatic, DrivingMode::Manual]
        .into_iter()
        .find(|mode| value.trim().eq_ignore_ascii_case(mode.as_str()))
        .ok_or_else(|| DecodeError::UnknownMode(value.to_string()))
}

/// `alertLevel/{orderId}` payload
#[derive(Debug, Serialize)]
pub struct AlertPayload {
    pub level: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl AlertPayload {
    pub fn new(level: AlertLevel, kind: AlertType) -> Self {
        Self { level: level.as_str(), kind: kind.as_str() }
    }
}

/// `lifecycle/{orderId}` status payload
#[derive(Debug, Serialize)]
pub struct StatusPayload {
    pub status: &'static str,
}

impl StatusPayload {
    pub fn new(status: LifecycleStatus) -> Self {
        Self { status: status.as_str() }
    }
}

/// `lifecycle/{orderId}` moving-state payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovingStatePayload {
    pub moving_state: &'static str,
}

impl MovingStatePayload {
    pub fn new(motion: Motion) -> Self {
        Self { moving_state: motion.as_str() }
    }
}

/// Outbound payloads the dispatch tool sends to a drone
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentPayload<'a> {
    pub sync: &'static str,
    pub order_id: &'a OrderId,
    pub courier: &'a CourierId,
}

impl<'a> AssignmentPayload<'a> {
    pub fn new(order_id: &'a OrderId, courier: &'a CourierId) -> Self {
        Self { sync: PERFORM_DELIVERY, order_id, courier }
    }
}

#[derive(Debug, Serialize)]
pub struct SyncPayload {
    pub sync: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ControlPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<&'static str>,
    #[serde(rename = "move", skip_serializing_if = "Option::is_none")]
    pub movement: Option<&'static str>,
}

impl ControlPayload {
    pub fn from_command(command: ControlCommand) -> Self {
        match command {
            ControlCommand::Mode(mode) => Self { mode: Some(mode.as_str()), movement: None },
            ControlCommand::Proceed => Self { mode: None, movement: Some(PROCEED) },
            ControlCommand::Halt => Self { mode: None, movement: Some(HALT) },
        }
    }
}
