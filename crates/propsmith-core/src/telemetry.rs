//! Log setup for the `propsmith` command.
//!
//! Every stage prints its artifact (properties JSON, a test file, a review
//! document) to stdout unless `-o` is given, so `propsmith suggest calc >
//! props.json` must capture nothing but the document. Progress, unit
//! failures and retries therefore go to stderr.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the stderr subscriber. `level` comes from `-q`/`-v` and is
/// overridden by `RUST_LOG`; `json` is the `--json` flag.
///
/// Only the first call in a process takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}
