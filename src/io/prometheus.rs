//! Prometheus metrics and control HTTP endpoint
//!
//! - `GET /metrics` - Prometheus text exposition
//! - `GET /health` - liveness plus scheduler state
//! - `GET /rooms` - registry snapshot as JSON
//! - `POST /sync` - request an immediate cycle
//!
//! Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use crate::services::reconciler::RoomStateRegistry;
use crate::services::scheduler::{SchedulerState, SyncHandle};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Prometheus metric type
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

/// Write a simple metric (counter or gauge) with hotel label
fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, hotel: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{hotel=\"{hotel}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    hotel: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{hotel=\"{hotel}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{hotel=\"{hotel}\",le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(output, "{name}_sum{{hotel=\"{hotel}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{hotel=\"{hotel}\"}} {cumulative}");
}

/// Format metrics in Prometheus text exposition format
pub fn format_prometheus_metrics(summary: &MetricsSummary, running: bool, hotel_id: &str) -> String {
    let mut output = String::with_capacity(4096);

    write_cycle_metrics(&mut output, hotel_id, summary, running);
    write_fetch_metrics(&mut output, hotel_id, summary);
    write_room_metrics(&mut output, hotel_id, summary);

    output
}

fn write_cycle_metrics(output: &mut String, hotel: &str, summary: &MetricsSummary, running: bool) {
    write_metric(
        output,
        "ohip_sync_cycles_started_total",
        "Sync cycles started",
        MetricType::Counter,
        hotel,
        summary.cycles_started,
    );
    write_metric(
        output,
        "ohip_sync_cycles_succeeded_total",
        "Sync cycles that reconciled at least one page",
        MetricType::Counter,
        hotel,
        summary.cycles_succeeded,
    );
    write_metric(
        output,
        "ohip_sync_cycles_failed_total",
        "Sync cycles that ended in an error",
        MetricType::Counter,
        hotel,
        summary.cycles_failed,
    );
    write_metric(
        output,
        "ohip_sync_cycles_aborted_total",
        "Sync cycles aborted by shutdown",
        MetricType::Counter,
        hotel,
        summary.cycles_aborted,
    );
    write_metric(
        output,
        "ohip_sync_triggers_skipped_total",
        "Triggers skipped because a cycle was queued or running",
        MetricType::Counter,
        hotel,
        summary.triggers_skipped,
    );
    write_metric(
        output,
        "ohip_sync_running",
        "Whether a cycle is currently running (0/1)",
        MetricType::Gauge,
        hotel,
        running as u64,
    );
    write_metric(
        output,
        "ohip_sync_last_success_epoch_ms",
        "Epoch ms of the last successful cycle (0 = never)",
        MetricType::Gauge,
        hotel,
        summary.last_success_epoch_ms,
    );

    write_histogram(
        output,
        "ohip_sync_cycle_duration_ms",
        "Sync cycle duration in milliseconds",
        hotel,
        &summary.cycle_buckets,
        summary.cycle_duration_sum_ms,
    );
    write_metric(
        output,
        "ohip_sync_cycle_duration_p50_ms",
        "50th percentile cycle duration",
        MetricType::Gauge,
        hotel,
        summary.cycle_p50_ms,
    );
    write_metric(
        output,
        "ohip_sync_cycle_duration_p99_ms",
        "99th percentile cycle duration",
        MetricType::Gauge,
        hotel,
        summary.cycle_p99_ms,
    );
}

fn write_fetch_metrics(output: &mut String, hotel: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "ohip_auth_failures_total",
        "Token requests that failed",
        MetricType::Counter,
        hotel,
        summary.auth_failures,
    );
    write_metric(
        output,
        "ohip_pages_fetched_total",
        "Pages fetched successfully",
        MetricType::Counter,
        hotel,
        summary.pages_ok,
    );
    write_metric(
        output,
        "ohip_page_failures_total",
        "Pages that failed and were skipped",
        MetricType::Counter,
        hotel,
        summary.page_failures,
    );
    write_metric(
        output,
        "ohip_page_timeouts_total",
        "Page failures caused by a timeout",
        MetricType::Counter,
        hotel,
        summary.page_timeouts,
    );
}

fn write_room_metrics(output: &mut String, hotel: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "ohip_rooms",
        "Rooms in the registry",
        MetricType::Gauge,
        hotel,
        summary.registry_size,
    );
    write_metric(
        output,
        "ohip_rooms_created_total",
        "Rooms created in the registry",
        MetricType::Counter,
        hotel,
        summary.rooms_created,
    );
    write_metric(
        output,
        "ohip_room_updates_total",
        "Room updates pushed to sinks",
        MetricType::Counter,
        hotel,
        summary.rooms_updated,
    );
    write_metric(
        output,
        "ohip_room_status_changes_total",
        "Room updates whose status changed",
        MetricType::Counter,
        hotel,
        summary.rooms_changed,
    );
    write_metric(
        output,
        "ohip_room_events_dropped_total",
        "Room events dropped because the sink channel was full",
        MetricType::Counter,
        hotel,
        summary.sink_events_dropped,
    );
}

/// Shared state for request handlers
pub struct ServerState {
    pub metrics: Arc<Metrics>,
    pub registry: Arc<RoomStateRegistry>,
    pub handle: SyncHandle,
    pub hotel_id: String,
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn state_str(state: SchedulerState) -> &'static str {
    match state {
        SchedulerState::Idle => "idle",
        SchedulerState::Running => "running",
    }
}

/// Route a request to its handler
pub fn route(method: &Method, path: &str, state: &ServerState) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/metrics") => {
            let running = state.handle.state() == SchedulerState::Running;
            let body = format_prometheus_metrics(&state.metrics.summary(), running, &state.hotel_id);
            respond(StatusCode::OK, PROMETHEUS_CONTENT_TYPE, body)
        }
        (&Method::GET, "/health") => {
            let body = json!({
                "status": "ok",
                "state": state_str(state.handle.state()),
                "rooms": state.registry.len(),
                "last_success_epoch_ms": state.metrics.summary().last_success_epoch_ms,
            });
            respond(StatusCode::OK, JSON_CONTENT_TYPE, body.to_string())
        }
        (&Method::GET, "/rooms") => match serde_json::to_string(&state.registry.snapshot()) {
            Ok(body) => respond(StatusCode::OK, JSON_CONTENT_TYPE, body),
            Err(e) => {
                error!(error = %e, "rooms_encode_failed");
                respond(StatusCode::INTERNAL_SERVER_ERROR, JSON_CONTENT_TYPE, r#"{"ok":false}"#)
            }
        },
        (&Method::POST, "/sync") => {
            if state.handle.trigger() {
                info!("manual_sync_triggered");
                respond(StatusCode::ACCEPTED, JSON_CONTENT_TYPE, r#"{"ok":true}"#)
            } else {
                respond(
                    StatusCode::CONFLICT,
                    JSON_CONTENT_TYPE,
                    r#"{"ok":false,"error":"sync_in_progress"}"#,
                )
            }
        }
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<ServerState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(route(req.method(), req.uri().path(), &state))
}

/// Start the metrics/control HTTP server
pub async fn start_metrics_server(
    port: u16,
    state: ServerState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let state = Arc::new(state);

    info!(port = %port, hotel = %state.hotel_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| handle_request(req, state.clone()));

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
