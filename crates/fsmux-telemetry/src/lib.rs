//! Tracing setup for fsmux binaries.
//!
//! Logs go to stderr so that stdout stays free for file contents. The
//! filter comes from `RUST_LOG`, falling back to the directive the caller
//! passes:
//!
//! ```bash
//! RUST_LOG=fsmux_kernel=trace fsmux --image dev.img ls
//! ```

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Build the filter: `RUST_LOG` if set and valid, otherwise `default_directive`.
pub fn filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init(default_directive: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(filter(default_directive))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .try_init()
}
