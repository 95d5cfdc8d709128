//! Tests for the DroneService module

use super::*;
use crate::domain::types::{AlertLevel, AlertType, DrivingMode, DroneId, Motion};
use crate::domain::NegligenceReport;
use crate::io::bus::{create_bus_channel, BusMessage};
use crate::io::reporter::ReportError;
use crate::sensors::{ExternalSource, SensorBuffer};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::time::Duration;

/// Reporter that keeps every report for inspection
#[derive(Clone, Default)]
struct RecordingReporter {
    reports: Arc<Mutex<Vec<(CourierId, OrderId, SensorSnapshot)>>>,
}

impl NegligenceReporter for RecordingReporter {
    fn report(&mut self, report: &NegligenceReport) -> Result<(), ReportError> {
        self.reports.lock().push((report.negligent().clone(), report.order_id().clone(), report.data()));
        Ok(())
    }
}

/// Test harness that keeps the bus receiver alive so `try_send` succeeds
struct TestService {
    service: DroneService,
    bus_rx: mpsc::Receiver<BusMessage>,
    reports: Arc<Mutex<Vec<(CourierId, OrderId, SensorSnapshot)>>>,
    proximity: SensorBuffer,
    accelerometer: SensorBuffer,
    camera: SensorBuffer,
    t0: Instant,
}

impl std::ops::Deref for TestService {
    type Target = DroneService;
    fn deref(&self) -> &Self::Target {
        &self.service
    }
}

impl std::ops::DerefMut for TestService {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.service
    }
}

impl TestService {
    fn at(&self, ms: u64) -> Instant {
        self.t0 + Duration::from_millis(ms)
    }

    fn assign(&mut self, order: &str, courier: &str) {
        let payload = json!({"sync": "perform delivery", "orderId": order, "courier": courier});
        let now = self.t0;
        self.service.handle_message("order/drone-7", payload.to_string().as_bytes(), now);
    }

    fn send(&mut self, topic: &str, payload: Value, ms: u64) {
        let now = self.at(ms);
        self.service.handle_message(topic, payload.to_string().as_bytes(), now);
    }

    fn poll_with(&mut self, proximity: f64, accel: (f64, f64, f64)) {
        self.proximity.write(json!({"proximity": proximity}).to_string());
        self.accelerometer
            .write(json!({"accelerometer": {"x": accel.0, "y": accel.1, "z": accel.2}}).to_string());
        self.camera.write(vec![0u8; 64]);
        self.service.poll_sensors();
    }

    fn tick(&mut self, ms: u64) {
        let now = self.at(ms);
        self.service.tick_travel(now);
    }

    /// Run the outbound leg to arrival
    fn arrive(&mut self) {
        let arrival = self.at(self.config.travel_duration().as_millis() as u64);
        self.service.tick_travel(arrival);
    }

    fn drain(&mut self) -> Vec<BusMessage> {
        let mut out = Vec::new();
        while let Ok(message) = self.bus_rx.try_recv() {
            out.push(message);
        }
        out
    }

    /// Publishes as (topic, json) pairs, other bus traffic skipped
    fn publishes(&mut self) -> Vec<(String, Value)> {
        self.drain()
            .into_iter()
            .filter_map(|m| match m {
                BusMessage::Publish { topic, payload, .. } => {
                    Some((topic, serde_json::from_slice(&payload).unwrap()))
                }
                _ => None,
            })
            .collect()
    }

    fn publishes_on(&mut self, prefix: &str) -> Vec<Value> {
        self.publishes().into_iter().filter(|(t, _)| t.starts_with(prefix)).map(|(_, v)| v).collect()
    }
}

fn create_test_service() -> TestService {
    create_test_service_with_config(Config::default().with_success_percentage(100))
}

fn create_test_service_with_config(config: Config) -> TestService {
    let config = config.with_drone_id("drone-7").with_travel_duration_ms(6000);
    let metrics = Arc::new(Metrics::new());
    let (bus, bus_rx) = create_bus_channel(256, metrics.clone());
    let drone = Drone::new(
        DroneId::new("drone-7"),
        Box::new(ExternalSource),
        Box::new(ExternalSource),
        Box::new(ExternalSource),
    );
    let (proximity, accelerometer, camera) = drone.sensor_buffers();
    let reporter = RecordingReporter::default();
    let reports = reporter.reports.clone();
    let service =
        DroneService::new(config, drone, bus, Box::new(reporter), metrics).with_rng_seed(7);
    TestService {
        service,
        bus_rx,
        reports,
        proximity,
        accelerometer,
        camera,
        t0: Instant::now(),
    }
}

/// Assigned, outbound and with the startup traffic drained
fn delivering_service() -> TestService {
    let mut t = create_test_service();
    t.start();
    t.assign("1017", "mario");
    t.drain();
    t
}

// ============================================================================
// Assignment
// ============================================================================

#[test]
fn test_start_subscribes_to_drone_order_topic() {
    let mut t = create_test_service();
    t.start();

    assert_eq!(t.drain(), vec![BusMessage::Subscribe { topic: "order/drone-7".to_string() }]);
    assert_eq!(t.phase(), Phase::Idle);
    assert!(!t.is_polling());
}

#[test]
fn test_assignment_starts_delivery() {
    let mut t = create_test_service();
    t.start();
    t.drain();
    t.assign("1017", "mario");

    assert_eq!(t.phase(), Phase::Delivering);
    assert_eq!(
        t.session(),
        Some(&Session { order_id: OrderId::new("1017"), courier: CourierId::new("mario") })
    );
    assert!(t.is_polling());
    assert!(t.drone().sensors_on());
    assert!(t.drone().is_operating());
    assert!(t.travel().is_some());

    let messages = t.drain();
    let publish = |topic: &str, body: Value| BusMessage::Publish {
        topic: topic.to_string(),
        payload: serde_json::to_vec(&body).unwrap(),
        qos: rumqttc::QoS::AtLeastOnce,
    };
    assert_eq!(
        messages,
        vec![
            publish("lifecycle/1017", json!({"status": "delivering"})),
            publish("lifecycle/1017", json!({"movingState": "moving"})),
            BusMessage::Subscribe { topic: "control/1017".to_string() },
            BusMessage::Subscribe { topic: "order/1017".to_string() },
            BusMessage::Unsubscribe { topic: "order/drone-7".to_string() },
        ]
    );
}

#[test]
fn test_assignment_accepts_id_alias_and_numeric_order() {
    let mut t = create_test_service();
    t.start();
    t.send("order/drone-7", json!({"sync": "PERFORM DELIVERY", "id": 55, "courier": "luigi"}), 0);

    assert_eq!(t.phase(), Phase::Delivering);
    assert_eq!(t.session().map(|s| s.order_id.as_str()), Some("55"));
}

#[test]
fn test_malformed_assignment_keeps_idle() {
    let mut t = create_test_service();
    t.start();
    t.drain();

    t.send("order/drone-7", json!({"sync": "perform delivery", "orderId": "1"}), 0);
    t.send("order/drone-7", json!({"sync": "dance", "orderId": "1", "courier": "x"}), 0);
    let now = t.at(0);
    t.handle_message("order/drone-7", b"not json", now);

    assert_eq!(t.phase(), Phase::Idle);
    assert!(t.session().is_none());
    assert!(t.drain().is_empty());
    assert_eq!(t.metrics.inbound_rejected(), 3);
}

#[test]
fn test_assignment_with_wildcard_ids_keeps_idle() {
    let mut t = create_test_service();
    t.start();
    t.drain();

    t.send("order/drone-7", json!({"sync": "perform delivery", "orderId": "1/#", "courier": "m"}), 0);
    t.send("order/drone-7", json!({"sync": "perform delivery", "orderId": "1", "courier": "+"}), 0);

    assert_eq!(t.phase(), Phase::Idle);
    assert!(t.session().is_none());
    assert!(!t.drone().sensors_on());
    assert!(t.drain().is_empty());
    assert_eq!(t.metrics.inbound_rejected(), 2);
}

#[test]
fn test_duplicate_assignment_ignored() {
    let mut t = delivering_service();
    t.send("order/drone-7", json!({"sync": "perform delivery", "orderId": "2000", "courier": "x"}), 0);

    assert_eq!(t.session().map(|s| s.order_id.as_str()), Some("1017"));
    assert_eq!(t.phase(), Phase::Delivering);
    assert!(t.drain().is_empty());
}

#[test]
fn test_idle_ignores_session_topics() {
    let mut t = create_test_service();
    t.start();
    t.drain();

    t.send("order/1017", json!({"sync": "callback"}), 0);
    t.send("control/1017", json!({"move": "proceed"}), 0);
    t.send("somewhere/else", json!({}), 0);

    assert_eq!(t.phase(), Phase::Idle);
    assert!(t.drain().is_empty());
    assert!(!t.drone().is_operating());
}

// ============================================================================
// Travel and outcome
// ============================================================================

#[test]
fn test_callback_before_arrival_rejected() {
    let mut t = delivering_service();
    t.send("order/1017", json!({"sync": "callback"}), 1000);

    assert_eq!(t.phase(), Phase::Delivering);
    assert!(t.publishes_on("lifecycle/").is_empty());
}

#[test]
fn test_arrival_with_full_success_rate() {
    let mut t = delivering_service();
    t.tick(5999);
    assert_eq!(t.phase(), Phase::Delivering);

    t.arrive();

    assert_eq!(t.phase(), Phase::Succeeded);
    assert!(t.travel().is_none());
    assert!(!t.drone().is_operating());
    assert!(t.is_polling());
    assert_eq!(
        t.publishes_on("lifecycle/"),
        vec![json!({"status": "succeeded"}), json!({"movingState": "stopped"})]
    );
    assert_eq!(t.metrics.deliveries_succeeded(), 1);
}

#[test]
fn test_arrival_with_zero_success_rate() {
    let mut t = create_test_service_with_config(Config::default().with_success_percentage(0));
    t.start();
    t.assign("9", "peach");
    t.drain();
    t.arrive();

    assert_eq!(t.phase(), Phase::Failed);
    assert_eq!(t.publishes_on("lifecycle/")[0], json!({"status": "failed"}));
    assert_eq!(t.metrics.deliveries_failed(), 1);
}

#[test]
fn test_callback_returns_home_and_disconnects() {
    let mut t = delivering_service();
    t.arrive();
    t.drain();

    t.send("order/1017", json!({"sync": "callback"}), 6000);
    assert_eq!(t.phase(), Phase::Returning);
    assert!(t.drone().is_operating());
    assert_eq!(
        t.publishes_on("lifecycle/"),
        vec![json!({"status": "returning"}), json!({"movingState": "moving"})]
    );

    t.tick(9000);
    assert_eq!(t.phase(), Phase::Returning);
    t.tick(12000);

    assert_eq!(t.phase(), Phase::Returned);
    assert!(!t.is_polling());
    assert!(!t.drone().sensors_on());

    let messages = t.drain();
    assert_eq!(messages.len(), 5);
    assert!(matches!(&messages[0], BusMessage::Publish { topic, .. } if topic == "lifecycle/1017"));
    assert!(matches!(&messages[1], BusMessage::Publish { topic, .. } if topic == "lifecycle/1017"));
    assert_eq!(messages[2], BusMessage::Unsubscribe { topic: "control/1017".to_string() });
    assert_eq!(messages[3], BusMessage::Unsubscribe { topic: "order/1017".to_string() });
    assert_eq!(messages[4], BusMessage::Disconnect);
}

#[test]
fn test_second_callback_ignored_while_returning() {
    let mut t = delivering_service();
    t.arrive();
    t.send("order/1017", json!({"sync": "callback"}), 6000);
    t.drain();

    t.send("order/1017", json!({"sync": "callback"}), 7000);
    assert_eq!(t.phase(), Phase::Returning);
    assert!(t.drain().is_empty());
}

// ============================================================================
// Operator control
// ============================================================================

#[test]
fn test_manual_mode_stops_and_blocks_travel() {
    let mut t = delivering_service();
    t.send("control/1017", json!({"mode": "manual"}), 1000);

    assert_eq!(t.drone().driving_mode(), DrivingMode::Manual);
    assert_eq!(t.drone().motion(), Motion::Stopped);
    assert_eq!(t.publishes_on("lifecycle/"), vec![json!({"movingState": "stopped"})]);

    t.tick(2000);
    assert!(t.travel().is_some_and(|travel| travel.is_paused()));
    t.tick(20000);
    assert_eq!(t.phase(), Phase::Delivering);
}

#[test]
fn test_operator_proceed_in_manual_mode_resumes_travel() {
    let mut t = delivering_service();
    t.tick(2000);
    t.send("control/1017", json!({"mode": "manual"}), 2000);
    t.tick(2000);
    t.send("control/1017", json!({"move": "proceed"}), 3000);

    assert!(t.drone().is_operating());
    assert_eq!(t.drone().driving_mode(), DrivingMode::Manual);

    // Travel resumes on the first tick after the proceed; 4000ms of moving remain
    t.tick(3000);
    t.tick(6999);
    assert_eq!(t.phase(), Phase::Delivering);
    t.tick(7000);
    assert_eq!(t.phase(), Phase::Succeeded);
    // Manual mode ignores the self-governed halt on arrival
    assert!(t.drone().is_operating());
}

#[test]
fn test_operator_halt_is_idempotent() {
    let mut t = delivering_service();
    t.send("control/1017", json!({"move": "halt"}), 500);
    t.send("control/1017", json!({"move": "HALT"}), 600);

    assert_eq!(t.publishes_on("lifecycle/"), vec![json!({"movingState": "stopped"})]);
}

#[test]
fn test_malformed_control_rejected() {
    let mut t = delivering_service();
    t.send("control/1017", json!({"mode": "turbo"}), 0);
    t.send("control/1017", json!({"mode": "manual", "move": "halt"}), 0);

    assert_eq!(t.drone().driving_mode(), DrivingMode::Automatic);
    assert!(t.drone().is_operating());
    assert_eq!(t.metrics.inbound_rejected(), 2);
}

// ============================================================================
// Telemetry and alerts
// ============================================================================

#[test]
fn test_poll_publishes_telemetry() {
    let mut t = delivering_service();
    t.poll_with(120.0, (0.0, 0.0, 1.0));

    assert_eq!(
        t.publishes_on("data/"),
        vec![json!({
            "proximity": 120.0,
            "accelerometer": {"roll": 0, "pitch": 0, "yaw": 0},
            "camera": 64
        })]
    );
    assert_eq!(t.last_snapshot().camera_bytes, 64);
    assert_eq!(t.metrics.telemetry_published(), 1);
}

#[test]
fn test_poll_before_first_reading_reports_no_alert() {
    let mut t = delivering_service();
    t.poll_sensors();

    let published = t.publishes();
    assert_eq!(published.len(), 1);
    assert_eq!(
        published[0],
        ("data/1017".to_string(), json!({"proximity": 0.0, "accelerometer": {}, "camera": 0}))
    );
    assert_eq!(t.alerts().combined(), AlertLevel::None);
}

#[test]
fn test_distance_sequence_publishes_only_changes() {
    let mut t = delivering_service();
    for distance in [80.0, 45.0, 25.0] {
        t.poll_with(distance, (0.0, 0.0, 1.0));
    }

    assert_eq!(
        t.publishes_on("alertLevel/"),
        vec![
            json!({"level": "warning", "type": "distance"}),
            json!({"level": "critical", "type": "distance"}),
        ]
    );
}

#[test]
fn test_persistent_critical_yields_one_report() {
    let mut t = delivering_service();
    for _ in 0..10 {
        t.poll_with(10.0, (0.0, 0.0, 1.0));
    }

    assert!(!t.drone().is_operating());
    let reports = t.reports.lock().clone();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, CourierId::new("mario"));
    assert_eq!(reports[0].1, OrderId::new("1017"));
    assert_eq!(reports[0].2.proximity, 10.0);
    assert_eq!(t.metrics.negligence_reports(), 1);
    assert_eq!(t.publishes_on("alertLevel/").len(), 1);
}

#[test]
fn test_new_critical_episode_reports_again() {
    let mut t = delivering_service();
    t.poll_with(10.0, (0.0, 0.0, 1.0));
    t.poll_with(100.0, (0.0, 0.0, 1.0));
    t.send("control/1017", json!({"move": "proceed"}), 1000);
    t.poll_with(10.0, (0.0, 0.0, 1.0));

    assert_eq!(t.reports.lock().len(), 2);
}

#[test]
fn test_critical_while_halted_does_not_report() {
    let mut t = delivering_service();
    t.send("control/1017", json!({"move": "halt"}), 500);
    t.poll_with(10.0, (0.0, 0.0, 1.0));

    assert_eq!(t.alerts().combined(), AlertLevel::Critical);
    assert!(t.reports.lock().is_empty());
}

#[test]
fn test_critical_while_parked_at_destination_does_not_report() {
    let mut t = delivering_service();
    t.arrive();
    assert_eq!(t.phase(), Phase::Succeeded);
    assert!(!t.drone().is_operating());
    t.drain();

    t.poll_with(10.0, (0.0, 0.0, 1.0));

    assert!(t.reports.lock().is_empty());
    assert_eq!(t.metrics.negligence_reports(), 0);
    assert_eq!(
        t.publishes_on("alertLevel/"),
        vec![json!({"level": "critical", "type": "distance"})]
    );
    assert!(!t.drone().is_operating());
}

#[test]
fn test_angle_critical_while_distance_critical_stays_one_episode() {
    let mut t = delivering_service();
    t.poll_with(10.0, (0.0, 0.0, 1.0));
    // roll = atan2(1, 0.5) ~ 63 degrees
    t.poll_with(10.0, (0.0, 1.0, 0.5));

    assert_eq!(t.alerts().level(AlertType::Angle), AlertLevel::Critical);
    assert_eq!(t.reports.lock().len(), 1);
}

#[test]
fn test_critical_halt_pauses_travel_until_operator_proceeds() {
    let mut t = delivering_service();
    t.tick(1000);
    t.poll_with(10.0, (0.0, 0.0, 1.0));
    assert!(!t.drone().is_operating());

    t.tick(1000);
    assert!(t.travel().is_some_and(|travel| travel.is_paused()));
    t.tick(30000);
    assert_eq!(t.phase(), Phase::Delivering);

    // Clearing the alert does not restart the drone by itself
    t.poll_with(100.0, (0.0, 0.0, 1.0));
    assert!(!t.drone().is_operating());

    t.send("control/1017", json!({"move": "proceed"}), 30000);
    t.tick(30000);
    t.tick(35000);
    assert_eq!(t.phase(), Phase::Succeeded);
}

#[test]
fn test_alert_state_resets_between_sessions() {
    let mut t = delivering_service();
    t.poll_with(10.0, (0.0, 0.0, 1.0));
    assert_eq!(t.alerts().combined(), AlertLevel::Critical);

    t.service.phase = Phase::Idle;
    t.assign("2000", "luigi");
    assert_eq!(t.alerts().combined(), AlertLevel::None);
}

#[test]
fn test_phase_strings_and_session_membership() {
    assert_eq!(Phase::Returning.to_string(), "returning");
    assert_eq!(Phase::Idle.status(), None);
    assert_eq!(Phase::Failed.status(), Some(LifecycleStatus::Failed));
    assert!(Phase::Succeeded.in_session());
    assert!(!Phase::Returned.in_session());
}
