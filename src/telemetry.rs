//! Logging setup and span constructors.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` picks the filter (default
/// `info`); `SLSVCD_LOG_FORMAT=json` switches to JSON lines.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("SLSVCD_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// One connection attempt to an uplink.
    pub fn uplink(name: &str, address: &str, protocol: &str) -> Span {
        info_span!("uplink", name = %name, address = %address, protocol = %protocol)
    }
}
