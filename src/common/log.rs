//! Logging setup emitting either human-readable lines or JSON lines.

use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

/// Install the global subscriber. `filter` uses `EnvFilter` syntax
/// (`info`, `takura_pricing=debug,warn`, ...). Calling this twice keeps the
/// first subscriber.
pub fn init(filter: &str, json_output: bool) {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if json_output {
        let fmt_layer = fmt::layer().json().with_target(true).with_current_span(false);
        Registry::default().with(env_filter).with(fmt_layer).try_init()
    } else {
        let fmt_layer = fmt::layer().with_target(false);
        Registry::default().with(env_filter).with(fmt_layer).try_init()
    };
    if let Err(err) = result {
        tracing::debug!(error = %err, "global subscriber already installed, keeping it");
    }
}
