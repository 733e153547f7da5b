pub mod mail;
pub mod memory;
pub mod relay;
pub mod smtp;
pub mod stream;

pub use mail::{MailSettings, MailSink, MessageTransport, OutboundMessage};
pub use memory::MemorySink;
pub use relay::{Credentials, HttpRelayTransport, RelayConfig};
pub use smtp::{SmtpConfig, SmtpSecurity, SmtpTransport};
pub use stream::StreamSink;

use crate::domain::LogRecord;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Rejected by downstream: {status} - {body}")]
    Rejected { status: u16, body: String },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Downstream consumer of flushed records.
///
/// The coordinator calls `handle` with its lock held, once per outbound
/// record, and `close` exactly once after its worker has stopped.
#[cfg_attr(test, automock)]
pub trait RecordHandler: Send + 'static {
    fn handle(&mut self, record: LogRecord) -> Result<(), SinkError>;

    fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl RecordHandler for Box<dyn RecordHandler> {
    fn handle(&mut self, record: LogRecord) -> Result<(), SinkError> {
        (**self).handle(record)
    }

    fn close(&mut self) -> Result<(), SinkError> {
        (**self).close()
    }
}
