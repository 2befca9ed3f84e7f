//! Query and transaction observability.
//!
//! Enable the `tracing` feature to emit events via the `tracing` crate.
//! These macros no-op when the feature is disabled, avoiding `#[cfg]`
//! boilerplate at every call site.

/// Emit a debug-level event with the SQL text and bound argument count.
///
/// ```ignore
/// sqlair_trace_query!(stmt.sql(), args.len());
/// ```
#[macro_export]
macro_rules! sqlair_trace_query {
    ($sql:expr, $arg_count:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(sql = %$sql, args = $arg_count, "sqlair.query");
    };
}

/// Emit an info-level event for transaction lifecycle changes.
///
/// ```ignore
/// sqlair_trace_tx!("begin");
/// sqlair_trace_tx!("commit");
/// ```
#[macro_export]
macro_rules! sqlair_trace_tx {
    ($event:literal) => {
        #[cfg(feature = "tracing")]
        tracing::info!(event = $event, "sqlair.transaction");
    };
}
