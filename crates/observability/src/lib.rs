//! Tracing/logging setup shared by the engine binaries and tests.

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::from_env());
}

/// Initialize logging for test binaries: human-readable output captured by
/// the test harness, `debug` unless `RUST_LOG` says otherwise.
pub fn init_for_tests() {
    tracing::init_for_tests();
}

/// Subscriber configuration (filters, formats).
pub mod tracing;
