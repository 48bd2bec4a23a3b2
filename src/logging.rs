//! Diagnostics for the `skill-eval` binary.
//!
//! stdout belongs to the command's output: progress lines, the summary table,
//! and the JSON printed by `status --json`, so it can be piped. Everything the
//! library reports through `tracing` (rejected runs, failed calls, unreadable
//! or unsaved state, stale results being dropped) goes to stderr.

use std::io::IsTerminal;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset: per-call failures and persistence
/// problems only.
const DEFAULT_FILTER: &str = "warn";

/// Install the stderr subscriber. Call once, before any command runs.
///
/// `RUST_LOG=skill_eval=debug` also shows run ids and discarded late results.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .compact();

    tracing_subscriber::registry().with(filter).with(stderr).init();
}
