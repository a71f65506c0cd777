use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the fmt subscriber; `RUST_LOG` wins over `level`
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}
