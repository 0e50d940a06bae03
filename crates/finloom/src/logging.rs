//! Structured JSON logging setup.
//!
//! Emits one JSON object per event with timestamp, level, target and the
//! event fields. Correlation and request ids travel as span fields so every
//! event inside an instrumented span carries them.

use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Install the process-wide JSON subscriber.
///
/// The filter is taken from `RUST_LOG`, defaulting to `info`. Calling this
/// twice is a no-op (the second install fails silently), so library tests
/// can call it freely.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(true)
        .with_span_list(false)
        .with_file(true)
        .with_line_number(true)
        .try_init();
}

/// Fresh correlation id for a unit of work (one company backfill, one query).
pub fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Fresh request id for a single outbound call.
pub fn request_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(correlation_id(), correlation_id());
        assert_ne!(request_id(), request_id());
    }
}
