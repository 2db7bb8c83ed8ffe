//! Telemetry for the query control core.
//!
//! Structured logging through `tracing`, one span per service operation, and
//! metrics emitted both to the `metrics` facade and to an in-process store
//! that callers can snapshot without installing a recorder.

mod logging;
mod metrics;
mod spans;
mod store;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{record_active_queries, record_operation, Operation, Outcome};
pub use spans::{ControlSpan, SpanExt};
pub use store::{LatencySummary, MetricsSnapshot, MetricsStore};
