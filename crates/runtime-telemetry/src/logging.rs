//! Structured logging helpers.
//!
//! Log lines carry consistent fields so that JSON output can be parsed by a
//! log shipper:
//! - `runtime`: name of the runtime instance
//! - `module`: module key, for module-related events
//! - `tx_id`: transaction correlation id, for commit-related events
//! - Additional context fields

/// Helper to create structured log entries with consistent formatting.
#[macro_export]
macro_rules! log_event {
    // Info level with runtime
    (info, $runtime:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::info!(
            runtime = $runtime,
            $($($field)*,)?
            $msg
        )
    };

    // Warn level with runtime
    (warn, $runtime:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::warn!(
            runtime = $runtime,
            $($($field)*,)?
            $msg
        )
    };

    // Debug level with runtime
    (debug, $runtime:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::debug!(
            runtime = $runtime,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a module-related event with standard fields.
#[macro_export]
macro_rules! log_module_event {
    ($level:ident, $runtime:expr, $msg:expr, $module:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            runtime = $runtime,
            module = %$module,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a transaction-related event with standard fields.
#[macro_export]
macro_rules! log_tx_event {
    ($level:ident, $runtime:expr, $msg:expr, $tx_id:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            runtime = $runtime,
            tx_id = %$tx_id,
            $($($field)*,)?
            $msg
        )
    };
}
