//! Span helpers for service operations.

use tracing::{info_span, Span};

use super::metrics::Operation;
use crate::error::ControlError;
use crate::query::QueryId;

/// Extension trait for recording outcomes onto a span.
pub trait SpanExt {
    fn record_result<T>(&self, result: &Result<T, ControlError>);

    fn record_latency(&self, latency_ms: f64);
}

impl SpanExt for Span {
    fn record_result<T>(&self, result: &Result<T, ControlError>) {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.kind", e.kind());
                self.record("error.message", e.to_string().as_str());
            }
        }
    }

    fn record_latency(&self, latency_ms: f64) {
        self.record("latency_ms", latency_ms);
    }
}

/// Factory for per-operation spans.
pub struct ControlSpan;

impl ControlSpan {
    /// Span with `operation` and `query_id` set; `status`, `error.kind`,
    /// `error.message` and `latency_ms` are filled in when the call returns.
    pub fn new(operation: Operation, query_id: Option<&QueryId>) -> Span {
        let query_id = query_id.map(QueryId::as_str).unwrap_or("-");
        info_span!(
            "query_control",
            operation = operation.as_str(),
            query_id = %query_id,
            status = tracing::field::Empty,
            error.kind = tracing::field::Empty,
            error.message = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}
