//! Handlers for the DroneService
//!
//! Each handler applies one inbound message or timer tick to the session and
//! queues the resulting publications. Nothing here blocks or fails: rejected
//! input is logged and counted, publish failures are counted by the bus.

use super::{DroneService, Phase, Session};
use crate::domain::types::{AlertLevel, Motion, SensorSnapshot};
use crate::domain::NegligenceReport;
use crate::io::messages::{
    order_topic_for_drone, parse_assignment, parse_callback, parse_control, Assignment,
    ControlCommand,
};
use crate::services::processor::process_accelerometer;
use crate::services::travel::{TravelSimulator, TravelTick};
use rand::Rng;
use std::time::Instant;
use tracing::{debug, error, info, warn};

impl DroneService {
    /// `order/{droneId}`: begin a delivery
    pub(crate) fn handle_assignment(&mut self, payload: &[u8], now: Instant) {
        if self.phase != Phase::Idle {
            self.reject("assignment", "duplicate_assignment");
            return;
        }
        let Assignment { order_id, courier } = match parse_assignment(payload) {
            Ok(assignment) => assignment,
            Err(e) => {
                warn!(error = %e, "assignment_decode_failed");
                self.metrics.record_inbound_rejected();
                return;
            }
        };

        info!(
            drone_id = %self.drone.id(),
            order_id = %order_id,
            courier = %courier,
            "delivery_started"
        );
        self.session = Some(Session { order_id, courier });
        self.alerts.reset();

        let motion_changed = self.drone.activate();
        self.set_phase(Phase::Delivering);
        self.on_motion_change(motion_changed);

        self.travel = Some(TravelSimulator::start(self.config.travel_duration(), now));
        self.polling = true;

        if let Some(session) = &self.session {
            self.bus.subscribe(session.control_topic());
            self.bus.subscribe(session.order_topic());
        }
        self.bus.unsubscribe(order_topic_for_drone(self.drone.id()));
    }

    /// `order/{orderId}`: head back once the outcome is known
    pub(crate) fn handle_callback(&mut self, payload: &[u8], now: Instant) {
        if let Err(e) = parse_callback(payload) {
            warn!(error = %e, "callback_decode_failed");
            self.metrics.record_inbound_rejected();
            return;
        }
        if !matches!(self.phase, Phase::Succeeded | Phase::Failed) {
            self.reject("callback", "callback_before_arrival");
            return;
        }

        info!(order_id = %self.order_label(), "return_started");
        self.set_phase(Phase::Returning);
        let changed = self.drone.proceed();
        self.on_motion_change(changed);
        self.travel = Some(TravelSimulator::start(self.config.travel_duration(), now));
    }

    /// `control/{orderId}`: operator mode switch or move directive
    pub(crate) fn handle_control(&mut self, payload: &[u8]) {
        let command = match parse_control(payload) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "control_decode_failed");
                self.metrics.record_inbound_rejected();
                return;
            }
        };
        if !self.phase.in_session() {
            self.reject("control", "control_without_session");
            return;
        }

        let changed = match command {
            ControlCommand::Mode(mode) => {
                info!(order_id = %self.order_label(), mode = %mode.as_str(), "driving_mode_changed");
                self.drone.change_mode(mode)
            }
            ControlCommand::Proceed => {
                info!(order_id = %self.order_label(), "operator_proceed");
                self.drone.operator_proceed()
            }
            ControlCommand::Halt => {
                info!(order_id = %self.order_label(), "operator_halt");
                self.drone.operator_halt()
            }
        };
        self.on_motion_change(changed);
    }

    /// Poll tick: snapshot sensors, publish telemetry, re-classify alerts
    pub fn poll_sensors(&mut self) {
        if !self.polling {
            return;
        }
        let started = Instant::now();

        self.drone.read_all_data();
        let snapshot = SensorSnapshot {
            proximity: self.drone.proximity_data(),
            angles: process_accelerometer(self.drone.accelerometer_data()),
            camera_bytes: self.drone.camera_data(),
        };
        self.last_snapshot = snapshot;

        if let Some(session) = &self.session {
            if self.bus.publish_telemetry(&session.order_id, &snapshot) {
                self.metrics.record_telemetry();
            }
        }

        if self.phase.in_session() {
            self.classify(snapshot);
        }

        self.metrics.record_poll(started.elapsed().as_micros() as u64);
    }

    fn classify(&mut self, snapshot: SensorSnapshot) {
        let distance = self.analyzer.classify_proximity(snapshot.proximity);
        let angle = self.analyzer.classify_angles(snapshot.angles);
        let update = self.alerts.update(distance, angle);
        if update.is_empty() {
            return;
        }

        if let Some(session) = &self.session {
            for &(kind, level) in &update.changed {
                info!(order_id = %session.order_id, kind = %kind, level = %level, "alert_level_changed");
                if self.bus.publish_alert(&session.order_id, kind, level) {
                    self.metrics.record_alert();
                }
            }
        }

        // Only a drone that was moving can be forced to halt; a parked drone files nothing
        let was_moving = self.drone.is_operating();
        if update.escalated {
            let changed = self.drone.halt();
            if changed {
                warn!(order_id = %self.order_label(), "critical_halt");
            }
            self.on_motion_change(changed);
        }

        if update.episode_started && was_moving {
            self.report_negligence(snapshot);
        }
    }

    fn report_negligence(&mut self, snapshot: SensorSnapshot) {
        let Some(session) = &self.session else {
            return;
        };
        let report =
            NegligenceReport::new(session.courier.clone(), session.order_id.clone(), snapshot);
        warn!(
            report_id = %report.id(),
            order_id = %session.order_id,
            courier = %session.courier,
            level = %AlertLevel::Critical,
            detected_at = %report.instant(),
            "negligence_detected"
        );
        self.metrics.record_negligence_report();
        if let Err(e) = self.reporter.report(&report) {
            error!(report_id = %report.id(), error = %e, "negligence_report_failed");
        }
    }

    /// Travel tick: advance the active leg
    pub fn tick_travel(&mut self, now: Instant) {
        let moving = self.drone.is_operating();
        let Some(travel) = self.travel.as_mut() else {
            return;
        };
        let tick = travel.tick(now, moving);
        let remaining = travel.remaining(now);

        match tick {
            TravelTick::Moving | TravelTick::Halted | TravelTick::Finished => {}
            TravelTick::Paused => {
                self.metrics.record_travel_pause();
                debug!(
                    order_id = %self.order_label(),
                    remaining_ms = %remaining.as_millis(),
                    "travel_paused"
                );
            }
            TravelTick::Resumed => {
                debug!(order_id = %self.order_label(), "travel_resumed");
            }
            TravelTick::Arrived => {
                self.travel = None;
                match self.phase {
                    Phase::Delivering => self.on_destination_reached(),
                    Phase::Returning => self.on_home_reached(),
                    phase => warn!(phase = %phase, "arrival_in_unexpected_phase"),
                }
            }
        }
    }

    fn on_destination_reached(&mut self) {
        let roll = self.rng.gen_range(0..100u8);
        let succeeded = roll < self.config.success_percentage();
        self.metrics.record_delivery_outcome(succeeded);
        info!(
            order_id = %self.order_label(),
            succeeded = %succeeded,
            "delivery_outcome"
        );

        self.set_phase(if succeeded { Phase::Succeeded } else { Phase::Failed });
        let changed = self.drone.halt();
        self.on_motion_change(changed);
    }

    fn on_home_reached(&mut self) {
        self.polling = false;
        self.set_phase(Phase::Returned);
        info!(drone_id = %self.drone.id(), order_id = %self.order_label(), "delivery_returned");

        let changed = self.drone.deactivate();
        self.on_motion_change(changed);

        if let Some(session) = &self.session {
            self.bus.unsubscribe(session.control_topic());
            self.bus.unsubscribe(session.order_topic());
        }
        self.bus.disconnect();
    }

    /// Enter `phase`, announcing it on the lifecycle topic
    pub(crate) fn set_phase(&mut self, phase: Phase) {
        if phase != self.phase {
            debug!(from = %self.phase, to = %phase, "phase_changed");
        }
        self.phase = phase;
        self.metrics.set_phase(phase.gauge());

        let (Some(session), Some(status)) = (&self.session, phase.status()) else {
            return;
        };
        if self.bus.publish_status(&session.order_id, status) {
            self.metrics.record_lifecycle();
        }
    }

    /// Publish the moving state after a motion transition
    pub(crate) fn on_motion_change(&mut self, changed: bool) {
        if !changed {
            return;
        }
        let motion = self.drone.motion();
        self.metrics.set_moving(motion == Motion::Moving);
        if let Some(session) = &self.session {
            if self.bus.publish_moving_state(&session.order_id, motion) {
                self.metrics.record_lifecycle();
            }
        }
    }

    pub(crate) fn reject(&self, what: &str, reason: &str) {
        self.metrics.record_inbound_rejected();
        warn!(what = %what, reason = %reason, phase = %self.phase, "inbound_rejected");
    }

    fn order_label(&self) -> &str {
        self.session.as_ref().map_or("-", |s| s.order_id.as_str())
    }
}
