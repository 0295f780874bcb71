//! Tracing initialisation for the `designbuild` binary.
//!
//! A metabuild spawns each subsidiary build as `designbuild worker` with
//! inherited standard streams. Both processes initialise their own
//! subscriber, so the worker's events land on the metabuild's stderr,
//! interleaved with the parent's. The worker reports back through its
//! result file, never through its output.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// * `json`: newline-delimited JSON log lines instead of text.
/// * `level`: default verbosity when `RUST_LOG` is not set.
///
/// Logs go to stderr: stdout carries the nonconformity report and the
/// metabuild summary, which scripts read.
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
