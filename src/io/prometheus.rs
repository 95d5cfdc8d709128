//! Prometheus metrics HTTP endpoint
//!
//! Exposes drone metrics in Prometheus text format at /metrics and a liveness
//! probe at /health. Uses hyper for the HTTP server.

use crate::infra::metrics::{
    phase_name, Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS,
};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, drone: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{drone=\"{drone}\"}} {val}");
}

fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    drone: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    avg: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{drone=\"{drone}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{drone=\"{drone}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let _ = writeln!(output, "{name}_sum{{drone=\"{drone}\"}} {}", avg * count);
    let _ = writeln!(output, "{name}_count{{drone=\"{drone}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, drone: &str) -> String {
    let summary = metrics.report();
    let mut output = String::with_capacity(4096);
    write_counters(&mut output, drone, &summary);
    write_state(&mut output, drone, &summary);
    write_histogram(
        &mut output,
        "drone_poll_latency_us",
        "Sensor poll cycle processing time in microseconds",
        drone,
        &summary.poll_lat_buckets,
        summary.poll_lat_avg_us,
    );
    output
}

fn write_counters(output: &mut String, drone: &str, summary: &MetricsSummary) {
    let counters = [
        ("drone_inbound_total", "Inbound MQTT messages", summary.inbound_total),
        ("drone_inbound_rejected_total", "Inbound messages rejected", summary.inbound_rejected),
        ("drone_telemetry_published_total", "Telemetry snapshots published", summary.telemetry_published),
        ("drone_alerts_published_total", "Alert level changes published", summary.alerts_published),
        ("drone_lifecycle_published_total", "Lifecycle messages published", summary.lifecycle_published),
        ("drone_negligence_reports_total", "Negligence reports raised", summary.negligence_reports),
        ("drone_bus_dropped_total", "Outbound bus messages dropped", summary.bus_dropped),
        ("drone_travel_pauses_total", "Travel legs paused by a halt", summary.travel_pauses),
        ("drone_deliveries_succeeded_total", "Deliveries reported successful", summary.deliveries_succeeded),
        ("drone_deliveries_failed_total", "Deliveries reported failed", summary.deliveries_failed),
    ];
    for (name, help, value) in counters {
        write_metric(output, name, help, MetricType::Counter, drone, value);
    }
}

fn write_state(output: &mut String, drone: &str, summary: &MetricsSummary) {
    let _ = writeln!(output, "# HELP drone_phase Current delivery phase (1 for the active phase)");
    let _ = writeln!(output, "# TYPE drone_phase gauge");
    for phase in 0..=5u64 {
        let active = u64::from(phase == summary.phase);
        let _ = writeln!(
            output,
            "drone_phase{{drone=\"{drone}\",phase=\"{}\"}} {active}",
            phase_name(phase)
        );
    }
    write_metric(
        output,
        "drone_moving",
        "1 while the drone is moving",
        MetricType::Gauge,
        drone,
        u64::from(summary.moving),
    );
}

fn text_response(status: StatusCode, body: impl Into<Bytes>, content_type: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    drone_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => text_response(
            StatusCode::OK,
            format_prometheus_metrics(&metrics, &drone_id),
            "text/plain; version=0.0.4; charset=utf-8",
        ),
        (&Method::GET, "/health") => text_response(StatusCode::OK, "ok", "text/plain"),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found", "text/plain"),
    };
    Ok(response)
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    drone_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let drone_id = Arc::new(drone_id);

    info!(port = %port, drone_id = %drone_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let drone_id = drone_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let drone_id = drone_id.clone();
                                async move { handle_request(req, metrics, drone_id).await }
                            });

                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
