use crate::domain::LogRecord;

/// Ordered, capacity-bounded record storage.
///
/// Holds no lock of its own: the coordinator only touches it while holding
/// its state mutex, and flushes as soon as `is_full` becomes true.
#[derive(Debug)]
pub struct BoundedRecordBuffer {
    records: Vec<LogRecord>,
    capacity: usize,
}

impl BoundedRecordBuffer {
    /// `capacity` is validated by `CoordinatorConfig`; it is always >= 1 here.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, record: LogRecord) {
        debug_assert!(
            self.records.len() < self.capacity,
            "buffer must be flushed before it exceeds capacity"
        );
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn snapshot(&self) -> &[LogRecord] {
        &self.records
    }

    /// Takes every buffered record, oldest first, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<LogRecord> {
        std::mem::replace(&mut self.records, Vec::with_capacity(self.capacity))
    }

    /// Discards the contents and returns how many records were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.records.len();
        self.records.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LogLevel;

    fn record(message: &str) -> LogRecord {
        LogRecord::new(LogLevel::Info, "test", message)
    }

    #[test]
    fn test_append_until_full() {
        let mut buffer = BoundedRecordBuffer::new(2);
        assert!(buffer.is_empty());
        assert!(!buffer.is_full());

        buffer.append(record("a"));
        assert_eq!(buffer.len(), 1);
        assert!(!buffer.is_full());

        buffer.append(record("b"));
        assert!(buffer.is_full());
        assert_eq!(buffer.capacity(), 2);
    }

    #[test]
    fn test_drain_preserves_order_and_empties() {
        let mut buffer = BoundedRecordBuffer::new(3);
        buffer.append(record("a"));
        buffer.append(record("b"));
        buffer.append(record("c"));

        let messages: Vec<_> = buffer.snapshot().iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["a", "b", "c"]);

        let drained = buffer.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].message, "a");
        assert_eq!(drained[2].message, "c");
        assert!(buffer.is_empty());

        // Usable again after a drain
        buffer.append(record("d"));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_clear_reports_discarded_count() {
        let mut buffer = BoundedRecordBuffer::new(4);
        buffer.append(record("a"));
        buffer.append(record("b"));

        assert_eq!(buffer.clear(), 2);
        assert!(buffer.is_empty());
        assert_eq!(buffer.clear(), 0);
    }
}
