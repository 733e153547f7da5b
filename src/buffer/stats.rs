use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// What caused a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushTrigger {
    Capacity,
    Severity,
    Delay,
    Manual,
    Close,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlushTrigger::Capacity => "capacity",
            FlushTrigger::Severity => "severity",
            FlushTrigger::Delay => "delay",
            FlushTrigger::Manual => "manual",
            FlushTrigger::Close => "close",
        };
        f.write_str(name)
    }
}

/// Point-in-time copy of the coordinator counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushStats {
    pub capacity_flushes: u64,
    pub severity_flushes: u64,
    pub delay_flushes: u64,
    pub manual_flushes: u64,
    pub close_flushes: u64,
    pub records_flushed: u64,
    pub batches_delivered: u64,
    pub sink_failures: u64,
    pub records_discarded: u64,
}

impl FlushStats {
    pub fn total_flushes(&self) -> u64 {
        self.capacity_flushes
            + self.severity_flushes
            + self.delay_flushes
            + self.manual_flushes
            + self.close_flushes
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCollector {
    capacity_flushes: AtomicU64,
    severity_flushes: AtomicU64,
    delay_flushes: AtomicU64,
    manual_flushes: AtomicU64,
    close_flushes: AtomicU64,
    records_flushed: AtomicU64,
    batches_delivered: AtomicU64,
    sink_failures: AtomicU64,
    records_discarded: AtomicU64,
}

impl StatsCollector {
    pub(crate) fn record_flush(&self, trigger: FlushTrigger, records: usize, delivered: usize) {
        let counter = match trigger {
            FlushTrigger::Capacity => &self.capacity_flushes,
            FlushTrigger::Severity => &self.severity_flushes,
            FlushTrigger::Delay => &self.delay_flushes,
            FlushTrigger::Manual => &self.manual_flushes,
            FlushTrigger::Close => &self.close_flushes,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.records_flushed
            .fetch_add(records as u64, Ordering::Relaxed);
        self.batches_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self, records: usize) {
        self.records_discarded
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> FlushStats {
        FlushStats {
            capacity_flushes: self.capacity_flushes.load(Ordering::Relaxed),
            severity_flushes: self.severity_flushes.load(Ordering::Relaxed),
            delay_flushes: self.delay_flushes.load(Ordering::Relaxed),
            manual_flushes: self.manual_flushes.load(Ordering::Relaxed),
            close_flushes: self.close_flushes.load(Ordering::Relaxed),
            records_flushed: self.records_flushed.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            records_discarded: self.records_discarded.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_snapshot() {
        let stats = StatsCollector::default();
        stats.record_flush(FlushTrigger::Capacity, 10, 10);
        stats.record_flush(FlushTrigger::Delay, 3, 1);
        stats.record_sink_failure();
        stats.record_discarded(2);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.capacity_flushes, 1);
        assert_eq!(snapshot.delay_flushes, 1);
        assert_eq!(snapshot.total_flushes(), 2);
        assert_eq!(snapshot.records_flushed, 13);
        assert_eq!(snapshot.batches_delivered, 11);
        assert_eq!(snapshot.sink_failures, 1);
        assert_eq!(snapshot.records_discarded, 2);
    }

    #[test]
    fn test_trigger_display() {
        assert_eq!(FlushTrigger::Severity.to_string(), "severity");
        assert_eq!(FlushTrigger::Close.to_string(), "close");
    }
}
