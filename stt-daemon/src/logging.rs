//! Tracing setup, including a layer that mirrors emitted events into
//! `ServerStats`' bounded ring so the `logs` control-socket action has
//! something to return without shelling out to the OS logger.

use std::sync::Arc;

use stt_core::ipc::wire::LogEntry;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::server::unix_time_now;
use crate::stats::ServerStats;

/// `tracing_subscriber::Layer` that appends each event to `ServerStats`'
/// recent-log ring, independent of whatever formatter is writing to
/// stderr.
pub struct RecentLogLayer {
    stats: Arc<ServerStats>,
}

impl RecentLogLayer {
    pub fn new(stats: Arc<ServerStats>) -> Self {
        Self { stats }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for RecentLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let level = match *event.metadata().level() {
            Level::ERROR => "error",
            Level::WARN => "warn",
            Level::INFO => "info",
            Level::DEBUG => "debug",
            Level::TRACE => "trace",
        };

        self.stats.push_log(LogEntry {
            timestamp: unix_time_now(),
            level: level.to_string(),
            message: visitor.message,
        });
    }
}

/// Initialize the global tracing subscriber: an stderr formatter honoring
/// `RUST_LOG` (default `sttd=info`), layered with [`RecentLogLayer`].
pub fn init(stats: Arc<ServerStats>, verbose: bool) {
    use tracing_subscriber::prelude::*;

    let default_filter = if verbose { "sttd=debug,stt_core=debug" } else { "sttd=info,stt_core=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.parse().unwrap());

    let fmt_layer = tracing_subscriber::fmt::layer();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(RecentLogLayer::new(stats))
        .init();
}
