use super::{RecordHandler, SinkError};
use crate::domain::{LogRecord, MessageFormatter, RecordFormatter};
use parking_lot::Mutex;
use std::sync::Arc;

/// In-memory capture sink. Clones share the same storage, so one handle can
/// be given to a coordinator while another inspects what was delivered.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Number of `handle` calls received.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Lines a stream consumer would have seen: every delivered record
    /// rendered with `MessageFormatter`, newline-terminated unless the text
    /// already ends with one (merged records do).
    pub fn line_count(&self) -> usize {
        self.records
            .lock()
            .iter()
            .map(|record| {
                let text = MessageFormatter.format(record);
                let newlines = text.matches('\n').count();
                if text.ends_with('\n') {
                    newlines
                } else {
                    newlines + 1
                }
            })
            .sum()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .map(|record| record.message.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl RecordHandler for MemorySink {
    fn handle(&mut self, record: LogRecord) -> Result<(), SinkError> {
        self.records.lock().push(record);
        Ok(())
    }
}
