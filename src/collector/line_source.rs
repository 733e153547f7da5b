use super::CollectorError;
use crate::buffer::{BufferError, DelayedFlushCoordinator};
use crate::domain::{LogLevel, LogRecord};
use crate::sender::RecordHandler;
use std::io::BufRead;
use tracing::warn;

/// Splits a leading level token (`ERROR`, `[warn]`, `Info:`) off a line.
/// Lines without one get `default_level` and keep their full text.
pub fn parse_line(line: &str, default_level: LogLevel, target: &str) -> Option<LogRecord> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    let trimmed = line.trim_start();
    let (first, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim_start()),
        None => (trimmed, ""),
    };
    let token = first
        .trim_start_matches('[')
        .trim_end_matches(':')
        .trim_end_matches(']');

    let record = match token.parse::<LogLevel>() {
        Ok(level) if !rest.is_empty() => LogRecord::new(level, target, rest),
        _ => LogRecord::new(default_level, target, line),
    };
    Some(record)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpSummary {
    pub lines_read: u64,
    pub records_accepted: u64,
    pub sink_failures: u64,
}

/// Feeds every line of `reader` into `coordinator` until EOF or until the
/// coordinator is closed underneath it.
pub fn pump_lines<R, H>(
    reader: R,
    coordinator: &DelayedFlushCoordinator<H>,
    default_level: LogLevel,
    target: &str,
) -> Result<PumpSummary, CollectorError>
where
    R: BufRead,
    H: RecordHandler,
{
    let mut summary = PumpSummary::default();

    for line in reader.lines() {
        let line = line?;
        summary.lines_read += 1;

        let Some(record) = parse_line(&line, default_level, target) else {
            continue;
        };

        match coordinator.record(record) {
            Ok(()) => summary.records_accepted += 1,
            Err(BufferError::Sink(e)) => {
                // The record was accepted; only its delivery failed
                summary.records_accepted += 1;
                summary.sink_failures += 1;
                warn!(error = %e, "Downstream sink rejected a flush");
            }
            Err(BufferError::Closed) => return Err(CollectorError::CollectionStopped),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(summary)
}
