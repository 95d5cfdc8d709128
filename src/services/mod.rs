//! Services - business logic and state management
//!
//! - `drone_service` - delivery session orchestrator (single-task actor)
//! - `travel` - pausable travel countdown per leg
//! - `alerts` - per-dimension alert change detection and critical episodes
//! - `analyzer` - distance/angle classification into alert levels
//! - `processor` - accelerometer vector to orientation angles

pub mod alerts;
pub mod analyzer;
pub mod drone_service;
pub mod processor;
pub mod travel;

pub use analyzer::DataAnalyzer;
pub use drone_service::{DroneService, Phase, Session};
pub use travel::{TravelSimulator, TravelTick};
