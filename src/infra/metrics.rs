//! Lock-free metrics collection and periodic reporting
//!
//! Counters are plain atomics updated from the service actor, the MQTT
//! dispatcher and the bus sender. `report()` is the only operation that resets
//! anything (the poll latency window), using atomic swap.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only; do not use them for coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Poll cycle latency bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Session phase gauge values
pub const PHASE_IDLE: u64 = 0;
pub const PHASE_DELIVERING: u64 = 1;
pub const PHASE_SUCCEEDED: u64 = 2;
pub const PHASE_FAILED: u64 = 3;
pub const PHASE_RETURNING: u64 = 4;
pub const PHASE_RETURNED: u64 = 5;

pub fn phase_name(phase: u64) -> &'static str {
    match phase {
        PHASE_IDLE => "idle",
        PHASE_DELIVERING => "delivering",
        PHASE_SUCCEEDED => "succeeded",
        PHASE_FAILED => "failed",
        PHASE_RETURNING => "returning",
        PHASE_RETURNED => "returned",
        _ => "unknown",
    }
}

#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }
    let target = (total as f64 * percentile).ceil() as u64;
    let mut cumulative = 0;
    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_BOUNDS.get(i).copied().unwrap_or(BUCKET_BOUNDS[9] * 2);
        }
    }
    BUCKET_BOUNDS[9] * 2
}

pub struct Metrics {
    /// Inbound MQTT publishes dispatched to the service (monotonic)
    inbound_total: AtomicU64,
    /// Inbound payloads rejected by decoding or state checks (monotonic)
    inbound_rejected: AtomicU64,
    /// Inbound since last report (reset on report)
    inbound_since_report: AtomicU64,
    telemetry_published: AtomicU64,
    alerts_published: AtomicU64,
    lifecycle_published: AtomicU64,
    negligence_reports: AtomicU64,
    /// Outbound bus messages dropped because the channel was full or closed
    bus_dropped: AtomicU64,
    travel_pauses: AtomicU64,
    deliveries_succeeded: AtomicU64,
    deliveries_failed: AtomicU64,
    /// Poll cycle latency histogram (reset on report)
    poll_latency_buckets: [AtomicU64; NUM_BUCKETS],
    poll_latency_sum_us: AtomicU64,
    poll_latency_max_us: AtomicU64,
    polls_since_report: AtomicU64,
    /// Current session phase (see `PHASE_*`)
    phase: AtomicU64,
    /// 1 while the drone is moving
    moving: AtomicU64,
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inbound_total: AtomicU64::new(0),
            inbound_rejected: AtomicU64::new(0),
            inbound_since_report: AtomicU64::new(0),
            telemetry_published: AtomicU64::new(0),
            alerts_published: AtomicU64::new(0),
            lifecycle_published: AtomicU64::new(0),
            negligence_reports: AtomicU64::new(0),
            bus_dropped: AtomicU64::new(0),
            travel_pauses: AtomicU64::new(0),
            deliveries_succeeded: AtomicU64::new(0),
            deliveries_failed: AtomicU64::new(0),
            poll_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            poll_latency_sum_us: AtomicU64::new(0),
            poll_latency_max_us: AtomicU64::new(0),
            polls_since_report: AtomicU64::new(0),
            phase: AtomicU64::new(PHASE_IDLE),
            moving: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_inbound(&self) {
        self.inbound_total.fetch_add(1, Ordering::Relaxed);
        self.inbound_since_report.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_inbound_rejected(&self) {
        self.inbound_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_telemetry(&self) {
        self.telemetry_published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alert(&self) {
        self.alerts_published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_lifecycle(&self) {
        self.lifecycle_published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_negligence_report(&self) {
        self.negligence_reports.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_bus_dropped(&self) {
        self.bus_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_travel_pause(&self) {
        self.travel_pauses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery_outcome(&self, succeeded: bool) {
        if succeeded {
            self.deliveries_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.deliveries_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record one sensor poll cycle's processing time
    #[inline]
    pub fn record_poll(&self, latency_us: u64) {
        self.polls_since_report.fetch_add(1, Ordering::Relaxed);
        self.poll_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.poll_latency_max_us, latency_us);
        self.poll_latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_phase(&self, phase: u64) {
        self.phase.store(phase, Ordering::Relaxed);
    }

    pub fn set_moving(&self, moving: bool) {
        self.moving.store(u64::from(moving), Ordering::Relaxed);
    }

    pub fn phase(&self) -> u64 {
        self.phase.load(Ordering::Relaxed)
    }

    pub fn is_moving(&self) -> bool {
        self.moving.load(Ordering::Relaxed) == 1
    }

    pub fn inbound_total(&self) -> u64 {
        self.inbound_total.load(Ordering::Relaxed)
    }

    pub fn inbound_rejected(&self) -> u64 {
        self.inbound_rejected.load(Ordering::Relaxed)
    }

    pub fn telemetry_published(&self) -> u64 {
        self.telemetry_published.load(Ordering::Relaxed)
    }

    pub fn alerts_published(&self) -> u64 {
        self.alerts_published.load(Ordering::Relaxed)
    }

    pub fn lifecycle_published(&self) -> u64 {
        self.lifecycle_published.load(Ordering::Relaxed)
    }

    pub fn negligence_reports(&self) -> u64 {
        self.negligence_reports.load(Ordering::Relaxed)
    }

    pub fn bus_dropped(&self) -> u64 {
        self.bus_dropped.load(Ordering::Relaxed)
    }

    pub fn travel_pauses(&self) -> u64 {
        self.travel_pauses.load(Ordering::Relaxed)
    }

    pub fn deliveries_succeeded(&self) -> u64 {
        self.deliveries_succeeded.load(Ordering::Relaxed)
    }

    pub fn deliveries_failed(&self) -> u64 {
        self.deliveries_failed.load(Ordering::Relaxed)
    }

    /// Snapshot every counter and reset the poll latency window
    pub fn report(&self) -> MetricsSummary {
        let polls = self.polls_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.poll_latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.poll_latency_max_us.swap(0, Ordering::Relaxed);
        let mut buckets = [0u64; NUM_BUCKETS];
        for (slot, bucket) in buckets.iter_mut().zip(&self.poll_latency_buckets) {
            *slot = bucket.swap(0, Ordering::Relaxed);
        }
        let inbound_window = self.inbound_since_report.swap(0, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };
        let inbound_per_sec = if elapsed.as_secs_f64() > 0.0 {
            inbound_window as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            phase: self.phase(),
            moving: self.is_moving(),
            inbound_total: self.inbound_total(),
            inbound_per_sec,
            inbound_rejected: self.inbound_rejected(),
            telemetry_published: self.telemetry_published(),
            alerts_published: self.alerts_published(),
            lifecycle_published: self.lifecycle_published(),
            negligence_reports: self.negligence_reports(),
            bus_dropped: self.bus_dropped(),
            travel_pauses: self.travel_pauses(),
            deliveries_succeeded: self.deliveries_succeeded(),
            deliveries_failed: self.deliveries_failed(),
            polls,
            poll_lat_buckets: buckets,
            poll_lat_avg_us: if polls > 0 { latency_sum / polls } else { 0 },
            poll_lat_max_us: latency_max,
            poll_lat_p99_us: percentile_from_buckets(&buckets, 0.99),
        }
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub phase: u64,
    pub moving: bool,
    pub inbound_total: u64,
    pub inbound_per_sec: f64,
    pub inbound_rejected: u64,
    pub telemetry_published: u64,
    pub alerts_published: u64,
    pub lifecycle_published: u64,
    pub negligence_reports: u64,
    pub bus_dropped: u64,
    pub travel_pauses: u64,
    pub deliveries_succeeded: u64,
    pub deliveries_failed: u64,
    /// Poll cycles since the previous report
    pub polls: u64,
    pub poll_lat_buckets: [u64; NUM_BUCKETS],
    pub poll_lat_avg_us: u64,
    pub poll_lat_max_us: u64,
    pub poll_lat_p99_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            phase = %phase_name(self.phase),
            moving = %self.moving,
            inbound_total = %self.inbound_total,
            inbound_per_sec = format!("{:.1}", self.inbound_per_sec),
            rejected = %self.inbound_rejected,
            telemetry = %self.telemetry_published,
            alerts = %self.alerts_published,
            lifecycle = %self.lifecycle_published,
            reports = %self.negligence_reports,
            bus_dropped = %self.bus_dropped,
            polls = %self.polls,
            poll_avg_us = %self.poll_lat_avg_us,
            poll_p99_us = %self.poll_lat_p99_us,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.inbound_total(), 0);
        assert_eq!(metrics.phase(), PHASE_IDLE);
        assert!(!metrics.is_moving());
    }

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.record_inbound();
        metrics.record_inbound();
        metrics.record_inbound_rejected();
        metrics.record_alert();
        metrics.record_bus_dropped();
        metrics.record_delivery_outcome(true);
        metrics.record_delivery_outcome(false);

        assert_eq!(metrics.inbound_total(), 2);
        assert_eq!(metrics.inbound_rejected(), 1);
        assert_eq!(metrics.alerts_published(), 1);
        assert_eq!(metrics.bus_dropped(), 1);
        assert_eq!(metrics.deliveries_succeeded(), 1);
        assert_eq!(metrics.deliveries_failed(), 1);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(51200), 9);
        assert_eq!(bucket_index(51201), 10);
    }

    #[test]
    fn test_report_resets_poll_window_only() {
        let metrics = Metrics::new();
        metrics.record_poll(50);
        metrics.record_poll(150);
        metrics.record_poll(900);
        metrics.record_telemetry();

        let summary = metrics.report();
        assert_eq!(summary.polls, 3);
        assert_eq!(summary.poll_lat_avg_us, 366);
        assert_eq!(summary.poll_lat_max_us, 900);
        assert_eq!(summary.poll_lat_buckets[0], 1);
        assert_eq!(summary.poll_lat_buckets[1], 1);
        assert_eq!(summary.poll_lat_buckets[4], 1);
        assert_eq!(summary.poll_lat_p99_us, 1600);

        let next = metrics.report();
        assert_eq!(next.polls, 0);
        assert_eq!(next.poll_lat_max_us, 0);
        assert_eq!(next.telemetry_published, 1);
    }

    #[test]
    fn test_phase_gauge() {
        let metrics = Metrics::new();
        metrics.set_phase(PHASE_RETURNING);
        metrics.set_moving(true);
        assert_eq!(phase_name(metrics.phase()), "returning");
        assert!(metrics.is_moving());
        assert_eq!(phase_name(99), "unknown");
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(Metrics::new());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let m = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        m.record_inbound();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(metrics.inbound_total(), 10_000);
    }
}
