//! Span helpers for the `tracing` feature.

use tracing::Span;

/// Span covering one executor round trip.
pub fn execute_query_span(sql: &str) -> Span {
    tracing::debug_span!("mooring.query", sql = %sql)
}

/// Span covering a record write (`save` or `delete`).
pub fn record_write_span(table: &str, operation: &'static str) -> Span {
    tracing::debug_span!("mooring.record", table = %table, operation)
}
