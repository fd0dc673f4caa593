//! Tracing subscriber setup for host apps.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "clinic_core=info,clinic_net=info";

/// Install the global subscriber. Later calls are no-ops and return `false`.
///
/// `filter` takes `EnvFilter` directives; `RUST_LOG` wins over the default
/// when no filter is passed.
pub fn init_logging(filter: Option<&str>) -> bool {
    let filter = match filter.map(str::trim).filter(|f| !f.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}
