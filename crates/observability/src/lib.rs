//! Tracing and logging setup shared by the binaries.

/// Initialize process-wide tracing from `config`.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(config: &tracing::LogConfig) {
    tracing::init(config);
}

/// Tracing configuration (filters, formats).
pub mod tracing;

pub use self::tracing::{LogConfig, LogFormat, ParseLogFormatError, RunId};
