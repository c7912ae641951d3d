use actix_web::{HttpResponse, Responder};
use lazy_static::lazy_static;
use prometheus::core::Collector;
use prometheus::{Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Request metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).unwrap();

    pub static ref HTTP_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds"
        ),
        &["method", "endpoint"]
    ).unwrap();

    // Authentication metrics
    pub static ref AUTH_ATTEMPTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("auth_attempts_total", "Total authentication attempts"),
        &["result"] // "success", "unknown_user" or "bad_password"
    ).unwrap();

    // Audit metrics
    pub static ref AUDIT_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("audit_events_total", "Total audit rows written"),
        &["entity"]
    ).unwrap();

    // Report generation metrics
    pub static ref REPORTS_GENERATED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("reports_generated_total", "Total report generation attempts"),
        &["result"]
    ).unwrap();

    pub static ref REPORT_GENERATION_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "report_generation_duration_seconds",
            "Text-generation API latency in seconds"
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0])
    ).unwrap();
}

fn register(collector: Box<dyn Collector>) -> Result<(), prometheus::Error> {
    match REGISTRY.register(collector) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Register every collector with [`REGISTRY`]. Safe to call more than once.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;
    register(Box::new(HTTP_REQUEST_DURATION.clone()))?;
    register(Box::new(AUTH_ATTEMPTS_TOTAL.clone()))?;
    register(Box::new(AUDIT_EVENTS_TOTAL.clone()))?;
    register(Box::new(REPORTS_GENERATED_TOTAL.clone()))?;
    register(Box::new(REPORT_GENERATION_DURATION.clone()))?;

    Ok(())
}

/// Prometheus metrics endpoint handler
pub async fn metrics_handler() -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(format!("Failed to encode metrics: {}", e));
    }

    match String::from_utf8(buffer) {
        Ok(metrics) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(metrics),
        Err(e) => HttpResponse::InternalServerError().body(format!("Failed to convert metrics: {}", e)),
    }
}
