use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init() {
    let fmt_layer = fmt::layer().json().with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Stand-alone dispatcher for one importer's diagnostics, independent of the
/// global subscriber.
pub fn importer_dispatch(level: &str) -> tracing::Dispatch {
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new(level))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false));
    tracing::Dispatch::new(subscriber)
}
