//! Domain models - the drone, its readings and the records it produces
//!
//! - `Drone` - aggregate owning the three sensors and the drive state
//! - `NegligenceReport` - snapshot raised on a critical halt
//! - `types` - identifiers, alert levels, driving modes, readings

pub mod drone;
pub mod negligence;
pub mod types;

pub use drone::{DriveState, Drone};
pub use negligence::NegligenceReport;
pub use types::{
    Acceleration, AlertLevel, AlertType, Angles, CourierId, DrivingMode, DroneId,
    LifecycleStatus, Motion, OrderId, SensorSnapshot,
};
