//! The only place in this workspace allowed to install a process-wide
//! `tracing` subscriber. Every other crate just calls `tracing::info!` etc.
//! and trusts whoever assembled the `Environment` to have called
//! [`install`] first.

use std::sync::Once;

use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Installs a `fmt` subscriber driven by `RUST_LOG` (defaulting to `info` if
/// unset). Safe to call more than once; only the first call takes effect.
pub fn install() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt().with_env_filter(filter).with_target(true).init();
    });
}

/// Mirrors one line written to a node's `log` fd into the process's own
/// tracing output, tagged with the node's name. `skein-runtime` has no
/// tracing dependency of its own reach into `skein-otel` (it only knows
/// about raw bytes on an fd); this is the seam `skein-host` wires the two
/// together through, one line at a time as the node's log pipe is drained.
pub fn mirror_log_line(node_name: &str, line: &str) {
    tracing::info!(node = node_name, "{line}");
}

/// Emitted once per node transition the scheduler observes, so a trace of
/// `RUST_LOG=skein_otel=debug` reconstructs the whole run's timeline without
/// needing a separate event store.
pub fn node_transitioned(node_name: &str, from: skein_core::NodeState, to: skein_core::NodeState) {
    tracing::debug!(node = node_name, %from, %to, "node state transition");
}
