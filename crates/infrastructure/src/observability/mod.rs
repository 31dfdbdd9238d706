//! Observability module
//!
//! - Metrics collection (`metrics` facade, optional Prometheus exporter)
//! - Structured logging helpers
//! - Dispatch spans
//! - Subscriber setup

pub mod dispatch_tracer;
pub mod metrics_collector;
pub mod structured_logger;
pub mod telemetry_setup;

pub use dispatch_tracer::DispatchTracer;
pub use metrics_collector::MetricsCollector;
pub use structured_logger::StructuredLogger;
pub use telemetry_setup::{init_logging, init_metrics, init_observability};
