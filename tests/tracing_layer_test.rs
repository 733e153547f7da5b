// BufferedLayer: tracing events routed through a coordinator
use rask_burst_buffer::buffer::{CoordinatorConfig, DelayedFlushCoordinator, EncodePolicy};
use rask_burst_buffer::collector::BufferedLayer;
use rask_burst_buffer::domain::{LogLevel, LogRecord};
use rask_burst_buffer::sender::{MemorySink, RecordHandler, SinkError};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::prelude::*;

fn layered(config: CoordinatorConfig) -> (Arc<DelayedFlushCoordinator<MemorySink>>, MemorySink) {
    let sink = MemorySink::new();
    let coordinator = Arc::new(DelayedFlushCoordinator::new(sink.clone(), config).unwrap());
    (coordinator, sink)
}

#[test]
fn test_events_are_buffered_until_capacity() {
    let (coordinator, sink) = layered(CoordinatorConfig::new(3));
    let subscriber =
        tracing_subscriber::registry().with(BufferedLayer::new(Arc::clone(&coordinator)));

    tracing::subscriber::with_default(subscriber, || {
        tracing::info!("first");
        tracing::warn!(attempt = 2, "second");
        assert!(sink.is_empty());
        tracing::debug!("third");
    });

    let records = sink.records();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].message, "first");
    assert_eq!(records[1].level, LogLevel::Warn);
    assert_eq!(records[1].fields.get("attempt").map(String::as_str), Some("2"));
    assert_eq!(records[2].level, LogLevel::Debug);
    assert_eq!(records[0].target, "tracing_layer_test");
}

#[test]
fn test_error_event_triggers_flush() {
    let config = CoordinatorConfig::new(50).with_flush_level(LogLevel::Error);
    let (coordinator, sink) = layered(config);
    let subscriber =
        tracing_subscriber::registry().with(BufferedLayer::new(Arc::clone(&coordinator)));

    tracing::subscriber::with_default(subscriber, || {
        tracing::info!("context");
        tracing::error!("failure");
    });

    assert_eq!(sink.messages(), vec!["context", "failure"]);
}

#[test]
fn test_internal_events_are_not_buffered() {
    let config = CoordinatorConfig::new(1).with_encode_policy(EncodePolicy::Merge);
    let (coordinator, sink) = layered(config);
    let subscriber =
        tracing_subscriber::registry().with(BufferedLayer::new(Arc::clone(&coordinator)));

    // Each flush logs from inside the coordinator; those events are skipped
    // instead of re-entering it
    tracing::subscriber::with_default(subscriber, || {
        tracing::info!("one");
        tracing::info!("two");
    });

    assert_eq!(sink.messages(), vec!["one", "two"]);
}

#[test]
fn test_events_after_close_are_dropped() {
    let (coordinator, sink) = layered(CoordinatorConfig::new(10));
    let layer = BufferedLayer::new(Arc::clone(&coordinator));
    coordinator.close().unwrap();

    let subscriber = tracing_subscriber::registry().with(layer);
    tracing::subscriber::with_default(subscriber, || {
        tracing::info!("too late");
    });

    assert!(sink.is_empty());
    assert_eq!(coordinator.buffered_len(), 0);
}

/// Sink that logs through `tracing` under this test's own target on every
/// delivery.
struct ChattySink {
    inner: MemorySink,
}

impl RecordHandler for ChattySink {
    fn handle(&mut self, record: LogRecord) -> Result<(), SinkError> {
        tracing::info!(message_len = record.message.len(), "delivering record");
        self.inner.handle(record)
    }

    fn close(&mut self) -> Result<(), SinkError> {
        tracing::info!("sink closing");
        Ok(())
    }
}

#[test]
fn test_events_from_inside_sink_are_not_buffered() {
    let delivered = MemorySink::new();
    let sink = ChattySink {
        inner: delivered.clone(),
    };
    let coordinator = Arc::new(DelayedFlushCoordinator::new(sink, CoordinatorConfig::new(1)).unwrap());
    let layer_coordinator = Arc::clone(&coordinator);

    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        let subscriber =
            tracing_subscriber::registry().with(BufferedLayer::new(layer_coordinator));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("outer");
            tracing::info!("second");
        });
        done_tx.send(()).unwrap();
    });

    assert!(
        done_rx.recv_timeout(Duration::from_secs(3)).is_ok(),
        "event emitted by the sink re-entered the coordinator"
    );
    assert_eq!(delivered.messages(), vec!["outer", "second"]);
    assert_eq!(coordinator.buffered_len(), 0);

    coordinator.close().unwrap();
    assert_eq!(delivered.messages(), vec!["outer", "second"]);
}
