//! Tracing initialization
//!
//! Filter comes from `HRAG_LOG`, then `RUST_LOG`, e.g.
//! `HRAG_LOG=hrag::retrieval=debug,hrag=info`. Without either the default
//! is `warn`, or `hrag=debug` with `--verbose`. Logs go to stderr so
//! command output on stdout stays pipeable.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env("HRAG_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "hrag=debug,warn" } else { "warn" }))
}

/// Install the global subscriber; later calls are no-ops
pub fn init(verbose: bool, json: bool) {
    INIT.call_once(|| {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter(verbose))
            .with_writer(std::io::stderr)
            .with_target(true);

        // Another subscriber may already be installed (tests, embedding)
        let _ = if json {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
    });
}
