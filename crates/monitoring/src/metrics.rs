//! Prometheus metrics for the purchase service and their HTTP exposure

use axum::http::{header, StatusCode};
use axum::{response::Response, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{debug, warn};

struct EstateMetrics {
    registry: Registry,
    purchases_total: IntCounterVec,
    chips_assigned_total: IntCounter,
    badges_awarded_total: IntCounter,
    purchase_duration: HistogramVec,
    http_requests_total: IntCounterVec,
}

// None when registration failed; recording then becomes a no-op
static METRICS: OnceLock<Option<EstateMetrics>> = OnceLock::new();

impl EstateMetrics {
    fn register() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let purchases_total = IntCounterVec::new(
            Opts::new("estate_purchases_total", "Purchase attempts by outcome"),
            &["outcome"],
        )?;
        let chips_assigned_total = IntCounter::new(
            "estate_chips_assigned_total",
            "Total number of chips assigned to buyers",
        )?;
        let badges_awarded_total = IntCounter::new(
            "estate_badges_awarded_total",
            "Total number of badges awarded",
        )?;
        let purchase_duration = HistogramVec::new(
            HistogramOpts::new(
                "estate_purchase_duration_seconds",
                "End-to-end purchase duration in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["outcome"],
        )?;
        let http_requests_total = IntCounterVec::new(
            Opts::new("estate_http_requests_total", "HTTP requests by route and status"),
            &["route", "status"],
        )?;

        registry.register(Box::new(purchases_total.clone()))?;
        registry.register(Box::new(chips_assigned_total.clone()))?;
        registry.register(Box::new(badges_awarded_total.clone()))?;
        registry.register(Box::new(purchase_duration.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;

        Ok(Self {
            registry,
            purchases_total,
            chips_assigned_total,
            badges_awarded_total,
            purchase_duration,
            http_requests_total,
        })
    }
}

fn metrics() -> Option<&'static EstateMetrics> {
    METRICS
        .get_or_init(|| match EstateMetrics::register() {
            Ok(metrics) => {
                debug!("Registered estate metrics");
                Some(metrics)
            }
            Err(e) => {
                warn!("Failed to register estate metrics: {}", e);
                None
            }
        })
        .as_ref()
}

/// Register all metrics. Safe to call more than once.
pub fn init_metrics() {
    let _ = metrics();
}

/// Record one purchase attempt
pub fn record_purchase(outcome: &str, chips_assigned: u32, duration_seconds: f64) {
    if let Some(m) = metrics() {
        m.purchases_total.with_label_values(&[outcome]).inc();
        m.purchase_duration
            .with_label_values(&[outcome])
            .observe(duration_seconds);
        if chips_assigned > 0 {
            m.chips_assigned_total.inc_by(u64::from(chips_assigned));
        }
    }
}

pub fn record_badges_awarded(count: usize) {
    if let Some(m) = metrics() {
        m.badges_awarded_total.inc_by(count as u64);
    }
}

pub fn record_http_request(route: &str, status: u16) {
    if let Some(m) = metrics() {
        let status = status.to_string();
        m.http_requests_total
            .with_label_values(&[route, status.as_str()])
            .inc();
    }
}

/// Current metrics in the Prometheus text format
pub fn render_metrics() -> Option<String> {
    let m = metrics()?;
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&m.registry.gather(), &mut buffer).ok()?;
    String::from_utf8(buffer).ok()
}

/// Router exposing `GET /metrics`; mergeable into any application router
pub fn metrics_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/metrics", get(metrics_handler))
}

async fn metrics_handler() -> Result<Response<String>, StatusCode> {
    let body = render_metrics().ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, TextEncoder::new().format_type())
        .body(body)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
