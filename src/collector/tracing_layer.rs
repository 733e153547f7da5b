use crate::buffer::{DelayedFlushCoordinator, is_delivering};
use crate::domain::{LogLevel, LogRecord};
use crate::sender::RecordHandler;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Events emitted by this crate are never buffered: the coordinator logs
/// while holding its lock, and feeding those events back would deadlock.
const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");

/// `tracing` layer that turns every event into a `LogRecord` and hands it to
/// a shared coordinator.
pub struct BufferedLayer<H: RecordHandler> {
    coordinator: Arc<DelayedFlushCoordinator<H>>,
}

impl<H: RecordHandler> BufferedLayer<H> {
    pub fn new(coordinator: Arc<DelayedFlushCoordinator<H>>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<DelayedFlushCoordinator<H>> {
        &self.coordinator
    }
}

impl<S, H> Layer<S> for BufferedLayer<H>
where
    S: Subscriber,
    H: RecordHandler,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target().starts_with(OWN_TARGET) {
            return;
        }
        // Emitted from inside a sink while a coordinator holds its lock
        if is_delivering() {
            return;
        }

        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let mut record = LogRecord::new(
            LogLevel::from(*metadata.level()),
            metadata.target(),
            visitor.message.unwrap_or_default(),
        );
        record.fields = visitor.fields;

        // A layer cannot report through the subscriber it is part of
        if let Err(e) = self.coordinator.record(record) {
            eprintln!("rask-burst-buffer: failed to buffer event: {e}");
        }
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: Option<String>,
    fields: BTreeMap<String, String>,
}

impl RecordVisitor {
    fn insert(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, format!("{value:?}"));
    }
}
