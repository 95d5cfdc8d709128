//! Delivery session orchestration
//!
//! The DroneService owns every piece of session state (the drone, alert
//! tracker, travel leg, phase) and is driven from a single task, so inbound
//! messages, sensor polls and travel ticks never interleave:
//! - inbound messages dispatch on topic to assignment, callback or control handlers
//! - the poll tick reads sensors, publishes telemetry and re-classifies alerts
//! - the travel tick advances the active leg and handles arrivals
//!
//! Phases: `Idle -> Delivering -> {Succeeded | Failed} -> Returning -> Returned`.

mod handlers;
#[cfg(test)]
mod tests;

use crate::domain::types::{CourierId, LifecycleStatus, OrderId, SensorSnapshot};
use crate::domain::Drone;
use crate::infra::config::Config;
use crate::infra::metrics::{self, Metrics};
use crate::io::bus::BusSender;
use crate::io::messages::{control_topic, order_topic, order_topic_for_drone};
use crate::io::mqtt::InboundMessage;
use crate::io::reporter::NegligenceReporter;
use crate::services::alerts::AlertTracker;
use crate::services::analyzer::DataAnalyzer;
use crate::services::travel::TravelSimulator;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Delivering,
    Succeeded,
    Failed,
    Returning,
    Returned,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Delivering => "delivering",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
            Phase::Returning => "returning",
            Phase::Returned => "returned",
        }
    }

    /// Lifecycle status announced on entering this phase
    pub fn status(&self) -> Option<LifecycleStatus> {
        match self {
            Phase::Idle => None,
            Phase::Delivering => Some(LifecycleStatus::Delivering),
            Phase::Succeeded => Some(LifecycleStatus::Succeeded),
            Phase::Failed => Some(LifecycleStatus::Failed),
            Phase::Returning => Some(LifecycleStatus::Returning),
            Phase::Returned => Some(LifecycleStatus::Returned),
        }
    }

    fn gauge(&self) -> u64 {
        match self {
            Phase::Idle => metrics::PHASE_IDLE,
            Phase::Delivering => metrics::PHASE_DELIVERING,
            Phase::Succeeded => metrics::PHASE_SUCCEEDED,
            Phase::Failed => metrics::PHASE_FAILED,
            Phase::Returning => metrics::PHASE_RETURNING,
            Phase::Returned => metrics::PHASE_RETURNED,
        }
    }

    /// An order is assigned and its topics are live
    pub fn in_session(&self) -> bool {
        !matches!(self, Phase::Idle | Phase::Returned)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The order being served
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub order_id: OrderId,
    pub courier: CourierId,
}

impl Session {
    pub fn order_topic(&self) -> String {
        order_topic(&self.order_id)
    }

    pub fn control_topic(&self) -> String {
        control_topic(&self.order_id)
    }
}

pub struct DroneService {
    pub(crate) config: Config,
    pub(crate) drone: Drone,
    pub(crate) analyzer: DataAnalyzer,
    pub(crate) alerts: AlertTracker,
    pub(crate) phase: Phase,
    pub(crate) session: Option<Session>,
    /// Active travel leg (outbound while delivering, inbound while returning)
    pub(crate) travel: Option<TravelSimulator>,
    pub(crate) polling: bool,
    pub(crate) last_snapshot: SensorSnapshot,
    pub(crate) bus: BusSender,
    pub(crate) reporter: Box<dyn NegligenceReporter>,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) rng: StdRng,
}

impl DroneService {
    pub fn new(
        config: Config,
        drone: Drone,
        bus: BusSender,
        reporter: Box<dyn NegligenceReporter>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            analyzer: DataAnalyzer::from_config(&config),
            config,
            drone,
            alerts: AlertTracker::new(),
            phase: Phase::Idle,
            session: None,
            travel: None,
            polling: false,
            last_snapshot: SensorSnapshot::default(),
            bus,
            reporter,
            metrics,
            rng: StdRng::from_entropy(),
        }
    }

    /// Use a deterministic outcome draw
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Subscribe to this drone's assignment topic
    pub fn start(&mut self) {
        let topic = order_topic_for_drone(self.drone.id());
        info!(drone_id = %self.drone.id(), topic = %topic, "drone_service_started");
        self.bus.subscribe(topic);
        self.set_phase(Phase::Idle);
    }

    /// Run until the session returns, the inbound channel closes or shutdown is signalled
    pub async fn run(
        mut self,
        mut inbound_rx: mpsc::Receiver<InboundMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Self {
        self.start();

        let mut poll_interval = interval(self.config.poll_interval());
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut travel_interval = interval(self.config.travel_tick());
        travel_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(phase = %self.phase, "drone_service_shutdown");
                        self.shutdown();
                        break;
                    }
                }
                message = inbound_rx.recv() => {
                    match message {
                        Some(m) => self.handle_message(&m.topic, &m.payload, now()),
                        None => {
                            info!("drone_service_inbound_closed");
                            self.shutdown();
                            break;
                        }
                    }
                }
                _ = poll_interval.tick(), if self.polling => {
                    self.poll_sensors();
                }
                _ = travel_interval.tick(), if self.travel.is_some() => {
                    self.tick_travel(now());
                }
            }

            if self.phase == Phase::Returned {
                info!(drone_id = %self.drone.id(), "drone_service_finished");
                break;
            }
        }
        self
    }

    /// Dispatch one inbound publish by topic
    pub fn handle_message(&mut self, topic: &str, payload: &[u8], now: Instant) {
        self.metrics.record_inbound();
        debug!(topic = %topic, bytes = %payload.len(), "inbound_message");

        let session_topics = self.session.as_ref().map(|s| (s.order_topic(), s.control_topic()));
        match session_topics {
            Some((order, _)) if topic == order => self.handle_callback(payload, now),
            Some((_, control)) if topic == control => self.handle_control(payload),
            _ if topic == order_topic_for_drone(self.drone.id()) => {
                self.handle_assignment(payload, now)
            }
            _ => self.reject(topic, "unexpected_topic"),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn drone(&self) -> &Drone {
        &self.drone
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn travel(&self) -> Option<&TravelSimulator> {
        self.travel.as_ref()
    }

    pub fn last_snapshot(&self) -> SensorSnapshot {
        self.last_snapshot
    }

    pub fn alerts(&self) -> &AlertTracker {
        &self.alerts
    }

    /// Stop sensors on an early exit; the connection owner closes the bus
    fn shutdown(&mut self) {
        self.polling = false;
        self.travel = None;
        let changed = self.drone.deactivate();
        self.on_motion_change(changed);
    }
}

/// Current instant on the tokio clock, so paused-time tests drive travel legs
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
