//! Log targets and subscriber setup.
//!
//! Access lines go to [`LOG_TARGET_REQUEST`] at `debug`, fault records and
//! connection problems go to [`LOG_TARGET_SERVER`]. Embedders that already run
//! a `tracing` subscriber can skip [`init`] and filter on these targets.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_TARGET_REQUEST: &str = "portico::request";
pub const LOG_TARGET_SERVER: &str = "portico::server";

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, or by
/// `default_directives` when the variable is unset. Returns `false` if a
/// global subscriber was already installed.
pub fn init(default_directives: &str) -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directives.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
