//! Prometheus metrics definitions and HTTP server

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Total number of reconciliations
    pub static ref RECONCILIATIONS: CounterVec = register_counter_vec!(
        "banana_operator_reconciliations_total",
        "Total number of reconciliations",
        &["kind"]
    ).unwrap();

    /// Total number of reconciliation errors by error kind
    pub static ref RECONCILIATION_ERRORS: CounterVec = register_counter_vec!(
        "banana_operator_reconciliation_errors_total",
        "Total number of reconciliation errors",
        &["kind", "error"]
    ).unwrap();

    /// Reconciliation duration histogram
    pub static ref RECONCILE_DURATION: HistogramVec = register_histogram_vec!(
        "banana_operator_reconcile_duration_seconds",
        "Duration of reconciliations in seconds",
        &["kind"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    /// Reconcile passes by lifecycle outcome
    pub static ref OUTCOMES: CounterVec = register_counter_vec!(
        "banana_operator_outcomes_total",
        "Reconcile passes by outcome",
        &["outcome"]
    ).unwrap();

    /// Paint (apply) actions by outcome
    pub static ref PAINTS_TOTAL: CounterVec = register_counter_vec!(
        "banana_operator_paints_total",
        "Total number of paint actions by outcome",
        &["outcome"]
    ).unwrap();

    /// Paint action duration histogram
    pub static ref PAINT_DURATION: HistogramVec = register_histogram_vec!(
        "banana_operator_paint_duration_seconds",
        "Duration of paint actions",
        &["outcome"],
        vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    /// Total number of cleanup actions by outcome
    pub static ref CLEANUPS: CounterVec = register_counter_vec!(
        "banana_operator_cleanups_total",
        "Total number of cleanup operations by outcome",
        &["outcome"]
    ).unwrap();

    /// Finalizer additions and removals
    pub static ref FINALIZER_OPERATIONS: CounterVec = register_counter_vec!(
        "banana_operator_finalizer_operations_total",
        "Finalizer additions and removals",
        &["operation"]
    ).unwrap();

    /// Writes refused because the record changed since it was read
    pub static ref VERSION_CONFLICTS: prometheus::Counter = prometheus::register_counter!(
        "banana_operator_version_conflicts_total",
        "Writes rejected by optimistic concurrency"
    ).unwrap();

    /// Operator health (1 = healthy, 0 = unhealthy)
    pub static ref OPERATOR_HEALTH: prometheus::Gauge = prometheus::register_gauge!(
        "banana_operator_health",
        "Operator health status (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}

/// Set once the controller has verified the CRD and started watching
static READY: AtomicBool = AtomicBool::new(false);

/// Mark the operator ready (or not) for `/readyz`
pub fn set_ready(ready: bool) {
    READY.store(ready, Ordering::SeqCst);
    OPERATOR_HEALTH.set(if ready { 1.0 } else { 0.0 });
}

/// Start the metrics HTTP server
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    Ok(route(req.uri().path()))
}

fn route(path: &str) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => metrics_response(),
        "/healthz" | "/health" => respond(StatusCode::OK, "ok"),
        "/readyz" | "/ready" if READY.load(Ordering::SeqCst) => respond(StatusCode::OK, "ok"),
        "/readyz" | "/ready" => respond(StatusCode::SERVICE_UNAVAILABLE, "not ready"),
        _ => respond(StatusCode::NOT_FOUND, "Not Found"),
    }
}

fn metrics_response() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return respond(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics");
    }

    let mut response = respond(StatusCode::OK, buffer);
    if let Ok(content_type) = HeaderValue::from_str(encoder.format_type()) {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    response
}

fn respond(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}
