use super::encoder::{BatchEncoder, EncodePolicy};
use super::error::BufferError;
use super::record_buffer::BoundedRecordBuffer;
use super::stats::{FlushStats, FlushTrigger, StatsCollector};
use crate::domain::{LogLevel, LogRecord, MessageFormatter, RecordFormatter};
use crate::sender::{MailSettings, MailSink, MessageTransport, RecordHandler, SinkError};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cell::Cell;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

const WORKER_THREAD_NAME: &str = "burst-flush";

thread_local! {
    static DELIVERING: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is inside a sink call made by a coordinator.
/// The state lock is held for the whole call, so recording from here would
/// deadlock.
pub fn is_delivering() -> bool {
    DELIVERING.with(Cell::get)
}

/// Marks the current thread as delivering until dropped.
struct DeliveryScope {
    previous: bool,
}

impl DeliveryScope {
    fn enter() -> Self {
        Self {
            previous: DELIVERING.with(|flag| flag.replace(true)),
        }
    }
}

impl Drop for DeliveryScope {
    fn drop(&mut self) {
        DELIVERING.with(|flag| flag.set(self.previous));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Number of records that forces a flush. Must be at least 1.
    pub capacity: usize,
    /// Quiescence delay after the first record of a burst. `None` disables
    /// the delay trigger and no worker thread is started.
    pub delay: Option<Duration>,
    /// Records at or above this level flush the buffer immediately.
    pub flush_level: LogLevel,
    pub encode_policy: EncodePolicy,
    pub flush_on_close: bool,
}

impl CoordinatorConfig {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            delay: None,
            flush_level: LogLevel::HIGHEST,
            encode_policy: EncodePolicy::PassThrough,
            flush_on_close: true,
        }
    }

    /// Defaults for mail delivery: one merged message per burst, at most
    /// every ten seconds.
    pub fn mail_defaults() -> Self {
        Self {
            capacity: 32,
            delay: Some(Duration::from_secs(10)),
            flush_level: LogLevel::Fatal,
            encode_policy: EncodePolicy::Merge,
            flush_on_close: true,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn without_delay(mut self) -> Self {
        self.delay = None;
        self
    }

    pub fn with_delay_secs(mut self, secs: f64) -> Result<Self, BufferError> {
        self.delay = Some(delay_from_secs(secs)?);
        Ok(self)
    }

    pub fn with_flush_level(mut self, level: LogLevel) -> Self {
        self.flush_level = level;
        self
    }

    pub fn with_encode_policy(mut self, policy: EncodePolicy) -> Self {
        self.encode_policy = policy;
        self
    }

    pub fn with_flush_on_close(mut self, flush_on_close: bool) -> Self {
        self.flush_on_close = flush_on_close;
        self
    }

    pub fn validate(&self) -> Result<(), BufferError> {
        if self.capacity == 0 {
            return Err(BufferError::InvalidCapacity {
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

/// Converts a delay given in (possibly fractional) seconds, rejecting
/// negative, infinite and NaN values instead of clamping them.
pub fn delay_from_secs(secs: f64) -> Result<Duration, BufferError> {
    Duration::try_from_secs_f64(secs).map_err(|e| BufferError::InvalidDelay {
        reason: format!("{secs} seconds: {e}"),
    })
}

struct State<H> {
    buffer: BoundedRecordBuffer,
    encoder: BatchEncoder,
    sink: H,
    /// A delay window is active.
    armed: bool,
    /// A producer flushed while a window was armed and waits for the worker
    /// to acknowledge.
    pending_reset: bool,
    closing: bool,
    /// Bumped by the worker on every acknowledgement.
    epoch: u64,
    worker_alive: bool,
}

struct Shared<H> {
    state: Mutex<State<H>>,
    /// Worker wake-up: activity, pre-emption or close.
    wakeup: Condvar,
    /// Producer wake-up: the worker acknowledged a reset or exited.
    acknowledged: Condvar,
    flush_level: LogLevel,
    stats: StatsCollector,
}

impl<H: RecordHandler> Shared<H> {
    /// Flush with the state lock already held. The buffer is drained before
    /// the sink is called, so a failing sink never sees the same record twice.
    fn flush_locked(&self, state: &mut State<H>, trigger: FlushTrigger) -> Result<usize, SinkError> {
        if state.buffer.is_empty() {
            return Ok(0);
        }

        let records = state.buffer.drain();
        let count = records.len();
        let outbound = state.encoder.encode(records);
        let _scope = DeliveryScope::enter();

        let mut delivered = 0;
        let mut first_error = None;
        for record in outbound {
            match state.sink.handle(record) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    self.stats.record_sink_failure();
                    first_error.get_or_insert(e);
                }
            }
        }

        self.stats.record_flush(trigger, count, delivered);
        debug!(%trigger, records = count, batches = delivered, "Flushed buffer");

        match first_error {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    /// Rendezvous with the worker after a flush from a producer context, so
    /// the worker drops the delay window that flush already consumed.
    fn reset_window(&self, state: &mut MutexGuard<'_, State<H>>) {
        if !state.worker_alive || !state.armed {
            return;
        }

        state.pending_reset = true;
        self.wakeup.notify_one();

        let epoch = state.epoch;
        while state.epoch == epoch && state.worker_alive {
            self.acknowledged.wait(state);
        }
    }

    fn acknowledge(&self, state: &mut State<H>) {
        state.pending_reset = false;
        // Records that arrived while the producer waited start a new window
        state.armed = !state.buffer.is_empty();
        state.epoch = state.epoch.wrapping_add(1);
        self.acknowledged.notify_all();
    }

    fn run_worker(&self, delay: Duration) {
        // Declared before the lock guard so it runs after the lock is
        // released, on normal exit and on unwind alike
        let _exit = WorkerExit { shared: self };
        let mut state = self.state.lock();

        loop {
            while !state.armed && !state.closing {
                self.wakeup.wait(&mut state);
            }

            // The window is anchored here; later records do not extend it
            if !state.closing {
                let deadline = Instant::now() + delay;
                while !state.pending_reset && !state.closing {
                    if self.wakeup.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
            }

            if state.pending_reset {
                self.acknowledge(&mut state);
                continue;
            }
            if state.closing {
                break;
            }

            if let Err(e) = self.flush_locked(&mut state, FlushTrigger::Delay) {
                error!(error = %e, "Delayed flush failed");
            }
            state.armed = false;
        }
    }
}

/// Releases producers waiting on the worker once it stops, including when a
/// sink panics on the worker thread.
struct WorkerExit<'a, H: RecordHandler> {
    shared: &'a Shared<H>,
}

impl<H: RecordHandler> Drop for WorkerExit<'_, H> {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.worker_alive = false;
            state.armed = false;
            state.pending_reset = false;
            self.shared.acknowledged.notify_all();
        }

        if thread::panicking() {
            error!("Flush worker panicked; delay flushes are disabled");
        } else {
            debug!("Flush worker stopped");
        }
    }
}

/// Buffers records and flushes them to a sink on capacity, severity or
/// after a quiescence delay.
///
/// `record` and `flush_now` may be called from any number of threads; the
/// delay trigger runs on a dedicated worker thread. `close` (or dropping the
/// coordinator) stops the worker and closes the sink.
pub struct DelayedFlushCoordinator<H: RecordHandler> {
    shared: Arc<Shared<H>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    config: CoordinatorConfig,
}

impl<H: RecordHandler> DelayedFlushCoordinator<H> {
    pub fn new(sink: H, config: CoordinatorConfig) -> Result<Self, BufferError> {
        let encoder = BatchEncoder::new(config.encode_policy);
        Self::build(sink, config, encoder)
    }

    /// Like `new`, with `formatter` rendering each record when merging.
    pub fn with_formatter(
        sink: H,
        config: CoordinatorConfig,
        formatter: Arc<dyn RecordFormatter>,
    ) -> Result<Self, BufferError> {
        let encoder = BatchEncoder::with_formatter(config.encode_policy, formatter);
        Self::build(sink, config, encoder)
    }

    fn build(sink: H, config: CoordinatorConfig, encoder: BatchEncoder) -> Result<Self, BufferError> {
        config.validate()?;

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                buffer: BoundedRecordBuffer::new(config.capacity),
                encoder,
                sink,
                armed: false,
                pending_reset: false,
                closing: false,
                epoch: 0,
                worker_alive: config.delay.is_some(),
            }),
            wakeup: Condvar::new(),
            acknowledged: Condvar::new(),
            flush_level: config.flush_level,
            stats: StatsCollector::default(),
        });

        let worker = match config.delay {
            Some(delay) => {
                let worker_shared = Arc::clone(&shared);
                let handle = thread::Builder::new()
                    .name(WORKER_THREAD_NAME.to_string())
                    .spawn(move || worker_shared.run_worker(delay))
                    .map_err(BufferError::WorkerSpawn)?;
                Some(handle)
            }
            None => None,
        };

        debug!(
            capacity = config.capacity,
            delay_ms = config.delay.map(|d| d.as_millis() as u64),
            flush_level = %config.flush_level,
            policy = ?config.encode_policy,
            "Delayed flush coordinator started"
        );

        Ok(Self {
            shared,
            worker: Mutex::new(worker),
            config,
        })
    }

    /// Buffers `record`, flushing synchronously when the buffer reaches
    /// capacity or the record is at or above the flush level.
    ///
    /// A sink failure during that flush is returned here; the records it
    /// concerned are not retried.
    pub fn record(&self, record: LogRecord) -> Result<(), BufferError> {
        let mut state = self.shared.state.lock();
        if state.closing {
            return Err(BufferError::Closed);
        }

        let severe = record.level >= self.shared.flush_level;
        state.buffer.append(record);

        if state.worker_alive && !state.armed {
            state.armed = true;
            self.shared.wakeup.notify_one();
        }

        let trigger = if severe {
            FlushTrigger::Severity
        } else if state.buffer.is_full() {
            FlushTrigger::Capacity
        } else {
            return Ok(());
        };

        let flushed = self.shared.flush_locked(&mut state, trigger);
        self.shared.reset_window(&mut state);
        flushed?;
        Ok(())
    }

    /// Flushes whatever is buffered. Returns the number of records flushed.
    pub fn flush_now(&self) -> Result<usize, BufferError> {
        let mut state = self.shared.state.lock();
        if state.closing {
            return Err(BufferError::Closed);
        }

        let flushed = self.shared.flush_locked(&mut state, FlushTrigger::Manual);
        self.shared.reset_window(&mut state);
        Ok(flushed?)
    }

    /// Flushes (or discards, when `flush_on_close` is off) the buffer, stops
    /// the worker and closes the sink. Later calls to `record`, `flush_now`
    /// and `close` fail with `BufferError::Closed`.
    pub fn close(&self) -> Result<(), BufferError> {
        let flushed = {
            let mut state = self.shared.state.lock();
            if state.closing {
                return Err(BufferError::Closed);
            }

            let flushed = if self.config.flush_on_close {
                self.shared.flush_locked(&mut state, FlushTrigger::Close)
            } else {
                let discarded = state.buffer.clear();
                if discarded > 0 {
                    self.shared.stats.record_discarded(discarded);
                    debug!(discarded, "Discarded buffered records on close");
                }
                Ok(0)
            };

            state.closing = true;
            self.shared.wakeup.notify_one();
            flushed
        };

        let joined = match self.worker.lock().take() {
            Some(handle) => handle.join().map_err(|_| BufferError::WorkerPanicked),
            None => Ok(()),
        };

        let closed = {
            let mut state = self.shared.state.lock();
            let _scope = DeliveryScope::enter();
            state.sink.close()
        };
        joined?;
        flushed?;
        closed?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closing
    }

    pub fn buffered_len(&self) -> usize {
        self.shared.state.lock().buffer.len()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn stats(&self) -> FlushStats {
        self.shared.stats.snapshot()
    }
}

impl<T: MessageTransport> DelayedFlushCoordinator<MailSink<T>> {
    /// Coordinator that delivers each burst as a single message. The encode
    /// policy is forced to `Merge`; see `CoordinatorConfig::mail_defaults`.
    pub fn for_mail(
        settings: MailSettings,
        transport: T,
        config: CoordinatorConfig,
    ) -> Result<Self, BufferError> {
        let sink = MailSink::with_formatter(settings, transport, Arc::new(MessageFormatter))?;
        let config = config.with_encode_policy(EncodePolicy::Merge);
        Self::new(sink, config)
    }
}

impl<H: RecordHandler> Drop for DelayedFlushCoordinator<H> {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close flush coordinator on drop");
        }
    }
}

impl<H: RecordHandler> std::fmt::Debug for DelayedFlushCoordinator<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayedFlushCoordinator")
            .field("config", &self.config)
            .field("buffered", &self.buffered_len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::{MemorySink, MockRecordHandler};

    fn info(message: &str) -> LogRecord {
        LogRecord::new(LogLevel::Info, "test", message)
    }

    #[test]
    fn test_config_rejects_zero_capacity() {
        let result = DelayedFlushCoordinator::new(MemorySink::new(), CoordinatorConfig::new(0));
        assert!(matches!(
            result,
            Err(BufferError::InvalidCapacity { capacity: 0 })
        ));
    }

    #[test]
    fn test_config_rejects_negative_delay() {
        assert!(matches!(
            CoordinatorConfig::new(4).with_delay_secs(-1.0),
            Err(BufferError::InvalidDelay { .. })
        ));
        assert!(CoordinatorConfig::new(4).with_delay_secs(f64::NAN).is_err());

        let config = CoordinatorConfig::new(4).with_delay_secs(0.25).unwrap();
        assert_eq!(config.delay, Some(Duration::from_millis(250)));
        assert_eq!(config.without_delay().delay, None);
    }

    #[test]
    fn test_config_defaults() {
        let config = CoordinatorConfig::new(8);
        assert_eq!(config.flush_level, LogLevel::HIGHEST);
        assert_eq!(config.encode_policy, EncodePolicy::PassThrough);
        assert!(config.flush_on_close);
        assert!(config.delay.is_none());

        let mail = CoordinatorConfig::mail_defaults();
        assert_eq!(mail.capacity, 32);
        assert_eq!(mail.delay, Some(Duration::from_secs(10)));
        assert_eq!(mail.encode_policy, EncodePolicy::Merge);
    }

    #[test]
    fn test_calls_after_close_are_rejected() {
        let sink = MemorySink::new();
        let coordinator =
            DelayedFlushCoordinator::new(sink.clone(), CoordinatorConfig::new(4)).unwrap();

        coordinator.record(info("before")).unwrap();
        coordinator.close().unwrap();

        assert!(coordinator.is_closed());
        assert_eq!(sink.messages(), vec!["before"]);
        assert!(matches!(
            coordinator.record(info("after")),
            Err(BufferError::Closed)
        ));
        assert!(matches!(coordinator.flush_now(), Err(BufferError::Closed)));
        assert!(matches!(coordinator.close(), Err(BufferError::Closed)));
    }

    #[test]
    fn test_sink_failure_is_returned_without_redelivery() {
        let mut sink = MockRecordHandler::new();
        sink.expect_handle()
            .times(2)
            .returning(|_| Err(SinkError::Transport("unreachable".to_string())));
        sink.expect_close().times(1).returning(|| Ok(()));

        let coordinator = DelayedFlushCoordinator::new(sink, CoordinatorConfig::new(2)).unwrap();

        coordinator.record(info("a")).unwrap();
        let result = coordinator.record(info("b"));
        assert!(matches!(result, Err(BufferError::Sink(SinkError::Transport(_)))));

        // Drained before the sink was called: nothing left to retry
        assert_eq!(coordinator.buffered_len(), 0);
        assert_eq!(coordinator.flush_now().unwrap(), 0);

        let stats = coordinator.stats();
        assert_eq!(stats.sink_failures, 2);
        assert_eq!(stats.capacity_flushes, 1);
        assert_eq!(stats.batches_delivered, 0);

        coordinator.close().unwrap();
    }

    #[test]
    fn test_sink_is_closed_once() {
        let mut sink = MockRecordHandler::new();
        sink.expect_handle().times(0);
        sink.expect_close().times(1).returning(|| Ok(()));

        let coordinator = DelayedFlushCoordinator::new(
            sink,
            CoordinatorConfig::new(2).with_delay(Duration::from_millis(10)),
        )
        .unwrap();
        coordinator.close().unwrap();
        drop(coordinator);
    }

    #[test]
    fn test_flush_now_without_worker_returns_count() {
        let sink = MemorySink::new();
        let coordinator =
            DelayedFlushCoordinator::new(sink.clone(), CoordinatorConfig::new(10)).unwrap();

        coordinator.record(info("a")).unwrap();
        coordinator.record(info("b")).unwrap();
        assert_eq!(coordinator.buffered_len(), 2);

        assert_eq!(coordinator.flush_now().unwrap(), 2);
        assert_eq!(coordinator.flush_now().unwrap(), 0);
        assert_eq!(sink.len(), 2);
        assert_eq!(coordinator.stats().manual_flushes, 1);
    }

    #[test]
    fn test_drop_closes_and_flushes() {
        let sink = MemorySink::new();
        {
            let coordinator = DelayedFlushCoordinator::new(
                sink.clone(),
                CoordinatorConfig::new(10).with_delay(Duration::from_secs(60)),
            )
            .unwrap();
            coordinator.record(info("pending")).unwrap();
        }
        assert_eq!(sink.messages(), vec!["pending"]);
    }
}
