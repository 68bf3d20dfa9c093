//! Logging initialization for the CLI.

use tracing_subscriber::{
    EnvFilter, fmt, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

pub fn init_logging(verbose: bool) {
    // Quote feeds are chatty at the transport level; keep hyper/reqwest at
    // warn even in verbose runs unless RUST_LOG overrides.
    let level = if verbose {
        "debug,hyper=warn,reqwest=warn"
    } else {
        "off"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().pretty().without_time())
        .with(filter)
        .init();
}
