use crate::domain::{LogRecord, MessageFormatter, RecordFormatter};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a drained buffer is turned into outbound records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncodePolicy {
    /// Forward every record individually, in buffer order.
    #[default]
    PassThrough,
    /// Concatenate every record's formatted text into one synthetic record.
    Merge,
}

const TERMINATOR: &str = "\n";

#[derive(Clone)]
pub struct BatchEncoder {
    policy: EncodePolicy,
    formatter: Arc<dyn RecordFormatter>,
}

impl BatchEncoder {
    pub fn new(policy: EncodePolicy) -> Self {
        Self::with_formatter(policy, Arc::new(MessageFormatter))
    }

    /// `formatter` renders each record's text when merging.
    pub fn with_formatter(policy: EncodePolicy, formatter: Arc<dyn RecordFormatter>) -> Self {
        Self { policy, formatter }
    }

    pub fn policy(&self) -> EncodePolicy {
        self.policy
    }

    pub fn encode(&self, records: Vec<LogRecord>) -> Vec<LogRecord> {
        match self.policy {
            EncodePolicy::PassThrough => records,
            EncodePolicy::Merge if records.len() <= 1 => records,
            EncodePolicy::Merge => self.merge(records),
        }
    }

    /// The merged record carries the first record's metadata.
    fn merge(&self, records: Vec<LogRecord>) -> Vec<LogRecord> {
        let text_len: usize = records.iter().map(|r| r.message.len() + 1).sum();
        let mut text = String::with_capacity(text_len);
        for record in &records {
            text.push_str(&self.formatter.format(record));
            text.push_str(TERMINATOR);
        }

        records
            .into_iter()
            .next()
            .map(|mut first| {
                first.message = text;
                first.rendered = None;
                first
            })
            .into_iter()
            .collect()
    }
}

impl std::fmt::Debug for BatchEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchEncoder")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LineFormatter, LogLevel};
    use chrono::{TimeZone, Utc};

    fn records(messages: &[&str]) -> Vec<LogRecord> {
        messages
            .iter()
            .map(|m| LogRecord::new(LogLevel::Info, "test", *m))
            .collect()
    }

    #[test]
    fn test_pass_through_preserves_records_and_order() {
        let encoder = BatchEncoder::new(EncodePolicy::PassThrough);
        let out = encoder.encode(records(&["a", "b", "c"]));

        let messages: Vec<_> = out.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_merge_joins_with_trailing_newline() {
        let encoder = BatchEncoder::new(EncodePolicy::Merge);
        let out = encoder.encode(records(&["A", "B", "C"]));

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].message, "A\nB\nC\n");
    }

    #[test]
    fn test_merge_single_record_is_pass_through() {
        let encoder = BatchEncoder::new(EncodePolicy::Merge);
        let out = encoder.encode(records(&["only"]).into_iter().map(|r| r.with_rendered("R")).collect());

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].message, "only");
        assert_eq!(out[0].rendered.as_deref(), Some("R"));
    }

    #[test]
    fn test_merge_copies_first_metadata_and_clears_override() {
        let first_ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let batch = vec![
            LogRecord::new(LogLevel::Warn, "first", "one")
                .with_timestamp(first_ts)
                .with_rendered("ONE"),
            LogRecord::new(LogLevel::Error, "second", "two"),
        ];

        let out = BatchEncoder::new(EncodePolicy::Merge).encode(batch);

        assert_eq!(out.len(), 1);
        let merged = &out[0];
        assert_eq!(merged.level, LogLevel::Warn);
        assert_eq!(merged.target, "first");
        assert_eq!(merged.timestamp, first_ts);
        assert!(merged.rendered.is_none());
        // The override of the first record still drives its own rendering
        assert_eq!(merged.message, "ONE\ntwo\n");
    }

    #[test]
    fn test_merge_uses_configured_formatter() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let batch = vec![
            LogRecord::new(LogLevel::Info, "app", "up").with_timestamp(ts),
            LogRecord::new(LogLevel::Error, "app", "down").with_timestamp(ts),
        ];

        let encoder =
            BatchEncoder::with_formatter(EncodePolicy::Merge, Arc::new(LineFormatter::new()));
        let out = encoder.encode(batch);

        assert_eq!(
            out[0].message,
            "2024-01-01T00:00:00.000Z INFO  app: up\n2024-01-01T00:00:00.000Z ERROR app: down\n"
        );
    }

    #[test]
    fn test_empty_batch_encodes_to_nothing() {
        assert!(BatchEncoder::new(EncodePolicy::Merge).encode(Vec::new()).is_empty());
        assert!(
            BatchEncoder::new(EncodePolicy::PassThrough)
                .encode(Vec::new())
                .is_empty()
        );
    }
}
