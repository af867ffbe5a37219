use tracing_subscriber::EnvFilter;

/// Install the global subscriber once; later calls are no-ops.
///
/// `RUST_LOG` wins over `default_filter` when set. Output goes through the
/// test writer so it is captured per test.
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
