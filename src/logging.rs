use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber. Later calls keep the first subscriber.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_new(default_directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
