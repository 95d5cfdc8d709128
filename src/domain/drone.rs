//! Drone aggregate: three sensors plus a single tagged drive state
//!
//! Driving mode and motion live in one `DriveState` value so that the two
//! kinds of motion changes cannot be confused:
//! - self-governed changes (`proceed`, `halt`) come from travel completion and
//!   critical alerts and only apply in automatic mode
//! - operator directives (`operator_proceed`, `operator_halt`) apply in any mode
//!
//! Every mutator reports whether the motion actually changed, so callers
//! publish moving-state updates only on real transitions.

use crate::domain::types::{Acceleration, DrivingMode, DroneId, Motion};
use crate::sensors::{Accelerometer, Camera, ProximitySensor, Sensor, SensorBuffer, SensorSource};
use tracing::debug;

/// Driving mode tagged with the current motion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveState {
    Automatic(Motion),
    Manual(Motion),
}

impl Default for DriveState {
    fn default() -> Self {
        DriveState::Automatic(Motion::Stopped)
    }
}

impl DriveState {
    pub fn mode(&self) -> DrivingMode {
        match self {
            DriveState::Automatic(_) => DrivingMode::Automatic,
            DriveState::Manual(_) => DrivingMode::Manual,
        }
    }

    pub fn motion(&self) -> Motion {
        match self {
            DriveState::Automatic(motion) | DriveState::Manual(motion) => *motion,
        }
    }

    fn with_motion(self, motion: Motion) -> Self {
        match self {
            DriveState::Automatic(_) => DriveState::Automatic(motion),
            DriveState::Manual(_) => DriveState::Manual(motion),
        }
    }

    /// Self-governed transition; manual mode ignores it
    fn self_governed(self, motion: Motion) -> Self {
        match self {
            DriveState::Automatic(_) => DriveState::Automatic(motion),
            manual @ DriveState::Manual(_) => manual,
        }
    }

    /// Switch mode; entering manual mode always stops the drone
    fn switch_mode(self, mode: DrivingMode) -> Self {
        match mode {
            DrivingMode::Automatic => DriveState::Automatic(self.motion()),
            DrivingMode::Manual => DriveState::Manual(Motion::Stopped),
        }
    }
}

pub struct Drone {
    id: DroneId,
    proximity: ProximitySensor,
    accelerometer: Accelerometer,
    camera: Camera,
    drive: DriveState,
}

impl Drone {
    pub fn new(
        id: DroneId,
        proximity: Box<dyn SensorSource>,
        accelerometer: Box<dyn SensorSource>,
        camera: Box<dyn SensorSource>,
    ) -> Self {
        Self {
            id,
            proximity: ProximitySensor::new(proximity),
            accelerometer: Accelerometer::new(accelerometer),
            camera: Camera::new(camera),
            drive: DriveState::default(),
        }
    }

    pub fn id(&self) -> &DroneId {
        &self.id
    }

    /// Switch every sensor on and start moving
    pub fn activate(&mut self) -> bool {
        self.proximity.activate();
        self.accelerometer.activate();
        self.camera.activate();
        self.proceed()
    }

    /// Stop moving regardless of mode and switch every sensor off
    pub fn deactivate(&mut self) -> bool {
        let changed = self.set_drive(self.drive.with_motion(Motion::Stopped));
        self.proximity.deactivate();
        self.accelerometer.deactivate();
        self.camera.deactivate();
        changed
    }

    pub fn sensors_on(&self) -> bool {
        self.proximity.is_on() && self.accelerometer.is_on() && self.camera.is_on()
    }

    /// Self-governed proceed (automatic mode only)
    pub fn proceed(&mut self) -> bool {
        self.set_drive(self.drive.self_governed(Motion::Moving))
    }

    /// Self-governed halt (automatic mode only)
    pub fn halt(&mut self) -> bool {
        self.set_drive(self.drive.self_governed(Motion::Stopped))
    }

    pub fn operator_proceed(&mut self) -> bool {
        self.set_drive(self.drive.with_motion(Motion::Moving))
    }

    pub fn operator_halt(&mut self) -> bool {
        self.set_drive(self.drive.with_motion(Motion::Stopped))
    }

    /// Change driving mode; returns whether the motion changed as a result
    pub fn change_mode(&mut self, mode: DrivingMode) -> bool {
        self.set_drive(self.drive.switch_mode(mode))
    }

    pub fn is_operating(&self) -> bool {
        self.drive.motion() == Motion::Moving
    }

    pub fn driving_mode(&self) -> DrivingMode {
        self.drive.mode()
    }

    pub fn motion(&self) -> Motion {
        self.drive.motion()
    }

    pub fn drive_state(&self) -> DriveState {
        self.drive
    }

    /// Poll every sensor once
    pub fn read_all_data(&mut self) {
        self.proximity.read_data();
        self.accelerometer.read_data();
        self.camera.read_data();
    }

    pub fn proximity_data(&self) -> f64 {
        self.proximity.get_data()
    }

    pub fn accelerometer_data(&self) -> Option<Acceleration> {
        self.accelerometer.get_data()
    }

    pub fn camera_data(&self) -> usize {
        self.camera.get_data()
    }

    /// Buffers of the three sensors, in (proximity, accelerometer, camera) order
    pub fn sensor_buffers(&self) -> (SensorBuffer, SensorBuffer, SensorBuffer) {
        (self.proximity.buffer(), self.accelerometer.buffer(), self.camera.buffer())
    }

    fn set_drive(&mut self, next: DriveState) -> bool {
        let changed = next.motion() != self.drive.motion();
        if next != self.drive {
            debug!(drone_id = %self.id, from = ?self.drive, to = ?next, "drive_state_changed");
        }
        self.drive = next;
        changed
    }
}
