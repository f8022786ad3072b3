use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, prelude::*};

/// Install the global fmt subscriber
///
/// `RUST_LOG` wins over the defaults when set. HTTP client internals are
/// kept quiet so probe logs stay readable.
pub fn init(verbose: bool) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level = if verbose { "debug" } else { "info" };
            EnvFilter::new(level)
                .add_directive("hyper=warn".parse()?)
                .add_directive("h2=warn".parse()?)
                .add_directive("reqwest=warn".parse()?)
                .add_directive("rustls=warn".parse()?)
        }
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(verbose)
        .with_thread_names(verbose)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to install tracing subscriber")
}
