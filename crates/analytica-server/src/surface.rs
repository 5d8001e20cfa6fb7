//! Read-only metrics and health surface.
//!
//! Bound to loopback only. `GET /metrics` serves the Prometheus text
//! exposition (or a JSON snapshot with `?format=json`); `GET /health`
//! answers a liveness ping. Admission is limited per client IP and response
//! bodies are size-capped.

use crate::shell::InvocationShell;
use analytica_resilience::CircuitState;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Shared state behind the metrics endpoint.
pub struct SurfaceState {
    shell: Arc<InvocationShell>,
    prometheus: Option<PrometheusHandle>,
    started: Instant,
    enabled: AtomicBool,
    limit_per_window: u32,
    window: Duration,
    max_body_bytes: usize,
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
}

struct Bucket {
    window_start: Instant,
    used: u32,
}

impl SurfaceState {
    pub fn new(
        shell: Arc<InvocationShell>,
        prometheus: Option<PrometheusHandle>,
        limit_per_minute: u32,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            shell,
            prometheus,
            started: Instant::now(),
            enabled: AtomicBool::new(true),
            limit_per_window: limit_per_minute.max(1),
            window: Duration::from_secs(60),
            max_body_bytes,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Fixed-window admission per client IP. `Err` carries the seconds to
    /// wait before the window resets.
    fn admit(&self, ip: IpAddr) -> Result<(), u64> {
        let mut buckets = self.buckets.lock().unwrap();
        let now = Instant::now();
        let bucket = buckets.entry(ip).or_insert(Bucket {
            window_start: now,
            used: 0,
        });
        if now.duration_since(bucket.window_start) >= self.window {
            bucket.window_start = now;
            bucket.used = 0;
        }
        if bucket.used < self.limit_per_window {
            bucket.used += 1;
            Ok(())
        } else {
            let elapsed = now.duration_since(bucket.window_start);
            let remaining = self.window.saturating_sub(elapsed).as_secs().max(1);
            Err(remaining)
        }
    }

    fn snapshot_json(&self) -> Value {
        let resilience: Vec<Value> = self
            .shell
            .resilience_metrics()
            .into_iter()
            .map(|m| {
                json!({
                    "name": m.name,
                    "state": circuit_state_label(m.circuit.state),
                    "totalCalls": m.total_calls,
                    "successes": m.successes,
                    "failures": m.failures,
                    "rejected": m.rejected,
                    "timeouts": m.timeouts,
                    "retries": m.retries,
                    "failuresInWindow": m.circuit.failures_in_window,
                })
            })
            .collect();
        let rate = self.shell.ratelimit_stats();
        json!({
            "uptimeMs": self.started.elapsed().as_millis() as u64,
            "cache": self.shell.cache_stats(),
            "rateLimit": {
                "admitted": rate.admitted,
                "budgetWaits": rate.budget_waits,
                "keyRotations": rate.key_rotations,
                "keysInvalidated": rate.keys_invalidated,
                "retries": rate.retries,
                "exhausted": rate.exhausted,
            },
            "resilience": resilience,
        })
    }
}

fn circuit_state_label(state: CircuitState) -> &'static str {
    match state {
        CircuitState::Closed => "closed",
        CircuitState::Open => "open",
        CircuitState::HalfOpen => "half_open",
    }
}

pub fn router(state: Arc<SurfaceState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the surface on loopback until the process exits.
pub async fn serve(state: Arc<SurfaceState>, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((IpAddr::from([127, 0, 0, 1]), port)).await?;
    tracing::info!(port, "metrics surface listening on loopback");
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

async fn health_handler(State(state): State<Arc<SurfaceState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptimeMs": state.started.elapsed().as_millis() as u64,
    }))
}

async fn metrics_handler(
    State(state): State<Arc<SurfaceState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    if !state.enabled.load(Ordering::Relaxed) {
        return (StatusCode::SERVICE_UNAVAILABLE, "metrics disabled\n").into_response();
    }
    let ip = client_ip(&headers, addr);
    if let Err(retry_after) = state.admit(ip) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after.to_string())],
            "rate limit exceeded\n",
        )
            .into_response();
    }

    let (body, content_type) = if params.get("format").map(String::as_str) == Some("json") {
        (state.snapshot_json().to_string(), "application/json")
    } else {
        let rendered = state
            .prometheus
            .as_ref()
            .map(|handle| handle.render())
            .unwrap_or_default();
        (rendered, "text/plain; version=0.0.4")
    };

    if body.len() > state.max_body_bytes {
        return (StatusCode::PAYLOAD_TOO_LARGE, "response too large\n").into_response();
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        body,
    )
        .into_response()
}

/// `X-Forwarded-For` (first entry), then `X-Real-IP`, then the socket peer.
fn client_ip(headers: &HeaderMap, addr: SocketAddr) -> IpAddr {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            if let Ok(ip) = first.trim().parse() {
                return ip;
            }
        }
    }
    if let Some(real) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if let Ok(ip) = real.trim().parse() {
            return ip;
        }
    }
    addr.ip()
}
