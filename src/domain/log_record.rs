use super::log_level::LogLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single buffered log event.
///
/// Records are moved into the coordinator's buffer by `record()` and moved out
/// to the downstream sink by a flush; nothing mutates them in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: LogLevel,
    /// Logger name or module path the event originated from.
    pub target: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,

    // Structured key/value pairs attached by the producer
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    /// Record-specific rendering that takes precedence over the sink's
    /// formatter. Cleared on merged records.
    #[serde(default)]
    pub rendered: Option<String>,
}

impl LogRecord {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            target: target.into(),
            message: message.into(),
            timestamp: Utc::now(),
            fields: BTreeMap::new(),
            rendered: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_rendered(mut self, rendered: impl Into<String>) -> Self {
        self.rendered = Some(rendered.into());
        self
    }
}
