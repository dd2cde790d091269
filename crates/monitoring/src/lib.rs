//! # ChipEstate Monitoring
//!
//! Logging setup and Prometheus metrics shared by the ChipEstate services.
//!
//! ## Available Metrics
//!
//! - `estate_purchases_total{outcome}` - Purchase attempts by outcome (`success` or an error code)
//! - `estate_chips_assigned_total` - Chips transferred to buyers
//! - `estate_badges_awarded_total` - Badges inserted after purchases
//! - `estate_purchase_duration_seconds{outcome}` - End-to-end purchase latency
//! - `estate_http_requests_total{route,status}` - HTTP requests by matched route and status
//!
//! ## Logging
//!
//! `LOG_DESTINATION` selects `console` (default) or `file`; file logging writes
//! daily rotating files to `LOG_DIR` with prefix `LOG_FILE_PREFIX`. The level is
//! taken from `RUST_LOG`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use monitoring::{init_logging, init_metrics, metrics_router};
//!
//! # fn main() -> anyhow::Result<()> {
//! let _guard = init_logging("info")?;
//! init_metrics();
//! let app: axum::Router = metrics_router();
//! # Ok(())
//! # }
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogDestination, LogSettings};
pub use metrics::{
    init_metrics, metrics_router, record_badges_awarded, record_http_request, record_purchase,
    render_metrics,
};
