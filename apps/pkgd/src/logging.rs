//! Tracing setup and structured logging of engine events

use pkgd_events::{AppEvent, TransactionEvent};
use tracing::{debug, error, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn,pkgd=info";
const DEBUG_FILTER: &str = "info,pkgd=debug,pkgd_ops=debug,pkgd_transaction=debug";

/// Initialise the global subscriber.
///
/// `RUST_LOG` wins over both defaults. In JSON mode log records go to stderr
/// as JSON so stdout carries nothing but transaction events.
pub fn init_tracing(json_mode: bool, debug_enabled: bool) {
    let fallback = if debug_enabled {
        DEBUG_FILTER
    } else {
        DEFAULT_FILTER
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    if json_mode {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(debug_enabled)
            .with_env_filter(filter)
            .init();
    }
}

/// Log an event at the level it asks for, with its domain as a field
pub fn log_event_with_tracing(event: &AppEvent) {
    let domain = event.log_target();
    let summary = summarize(event);
    match event.log_level() {
        Level::ERROR => error!(target: "pkgd::events", domain, "{summary}"),
        Level::WARN => warn!(target: "pkgd::events", domain, "{summary}"),
        Level::INFO => info!(target: "pkgd::events", domain, "{summary}"),
        Level::DEBUG => debug!(target: "pkgd::events", domain, "{summary}"),
        _ => trace!(target: "pkgd::events", domain, "{summary}"),
    }
}

fn summarize(event: &AppEvent) -> String {
    match event {
        AppEvent::Transaction(TransactionEvent::Finished {
            outcome,
            runtime_ms,
        }) => format!("transaction finished: {outcome} ({runtime_ms} ms)"),
        AppEvent::Transaction(TransactionEvent::Started { id, role }) => {
            format!("transaction {id} started: {role}")
        }
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{other:?}")),
    }
}
