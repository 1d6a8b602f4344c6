//! Tracing setup for applications embedding the client

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber for the client's request and save logs.
///
/// `RUST_LOG` wins when set. Otherwise `debug` turns on request dispatch
/// logs from this crate while everything else stays at `info`. Calling it
/// when the application already installed a subscriber is a no-op.
pub fn init_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(debug));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(debug)
        .with_line_number(debug)
        .try_init();

    if installed.is_err() {
        tracing::debug!("Subscriber already installed, keeping it");
    }
}

fn default_filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new("info,restmodel_sdk=debug")
    } else {
        EnvFilter::new("info")
    }
}
