use super::log_record::LogRecord;
use std::fmt::Write as _;

/// Renders a record into the text a sink writes or sends.
pub trait RecordFormatter: Send + Sync {
    fn format(&self, record: &LogRecord) -> String;
}

/// Emits the message text only (or the record's own rendering, if set).
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageFormatter;

impl RecordFormatter for MessageFormatter {
    fn format(&self, record: &LogRecord) -> String {
        match &record.rendered {
            Some(rendered) => rendered.clone(),
            None => record.message.clone(),
        }
    }
}

/// `2024-01-01T12:00:00.000Z ERROR app::db: connection lost attempt=3`
#[derive(Debug, Clone, Copy, Default)]
pub struct LineFormatter {
    pub include_fields: bool,
}

impl LineFormatter {
    pub fn new() -> Self {
        Self {
            include_fields: true,
        }
    }
}

impl RecordFormatter for LineFormatter {
    fn format(&self, record: &LogRecord) -> String {
        if let Some(rendered) = &record.rendered {
            return rendered.clone();
        }

        let mut line = format!(
            "{} {:<5} {}: {}",
            record
                .timestamp
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            record.level.label(),
            record.target,
            record.message
        );

        if self.include_fields {
            for (key, value) in &record.fields {
                // Writing to a String cannot fail
                let _ = write!(line, " {key}={value}");
            }
        }

        line
    }
}

/// One JSON object per record; timestamps in RFC 3339.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl RecordFormatter for JsonFormatter {
    fn format(&self, record: &LogRecord) -> String {
        serde_json::to_string(record).unwrap_or_else(|e| {
            serde_json::json!({
                "level": record.level,
                "message": record.message,
                "serialization_error": e.to_string(),
            })
            .to_string()
        })
    }
}
