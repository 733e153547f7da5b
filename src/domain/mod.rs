//! Domain layer for rask-burst-buffer.
//!
//! Contains the canonical types shared across all modules:
//! - `LogRecord`: one buffered event
//! - `LogLevel`: record severity (Trace/Debug/Info/Warn/Error/Fatal)
//! - `RecordFormatter`: record → text rendering used by sinks and the merge encoder

pub mod formatter;
pub mod log_level;
pub mod log_record;

pub use formatter::{JsonFormatter, LineFormatter, MessageFormatter, RecordFormatter};
pub use log_level::{LogLevel, UnknownLevel};
pub use log_record::LogRecord;
