use tracing_subscriber::EnvFilter;

/// Installs a test subscriber honouring `RUST_LOG`, e.g.
/// `RUST_LOG=hazstack=debug cargo test`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
