use super::{RecordHandler, SinkError};
use crate::domain::{LineFormatter, LogLevel, LogRecord, RecordFormatter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

/// Envelope settings shared by every message a `MailSink` sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailSettings {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
}

impl MailSettings {
    pub fn new(from: impl Into<String>, to: Vec<String>, subject: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to,
            subject: subject.into(),
        }
    }

    pub fn validate(&self) -> Result<(), SinkError> {
        if self.from.trim().is_empty() {
            return Err(SinkError::InvalidConfig(
                "Sender address must not be empty".to_string(),
            ));
        }
        if self.to.iter().all(|addr| addr.trim().is_empty()) {
            return Err(SinkError::InvalidConfig(
                "At least one recipient is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// A fully addressed message ready for a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
}

/// Delivers an outbound message, e.g. over SMTP or to an HTTP mail relay.
#[cfg_attr(test, automock)]
pub trait MessageTransport: Send + Sync + 'static {
    fn send(&self, message: &OutboundMessage) -> Result<(), SinkError>;
}

/// Sends one message per handled record. Paired with the merge encode
/// policy, a whole burst arrives as a single message.
pub struct MailSink<T: MessageTransport> {
    settings: MailSettings,
    transport: T,
    formatter: Arc<dyn RecordFormatter>,
}

impl<T: MessageTransport> MailSink<T> {
    pub fn new(settings: MailSettings, transport: T) -> Result<Self, SinkError> {
        Self::with_formatter(settings, transport, Arc::new(LineFormatter::new()))
    }

    pub fn with_formatter(
        settings: MailSettings,
        transport: T,
        formatter: Arc<dyn RecordFormatter>,
    ) -> Result<Self, SinkError> {
        settings.validate()?;
        Ok(Self {
            settings,
            transport,
            formatter,
        })
    }

    pub fn settings(&self) -> &MailSettings {
        &self.settings
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn compose(&self, record: &LogRecord) -> OutboundMessage {
        OutboundMessage {
            from: self.settings.from.clone(),
            to: self.settings.to.clone(),
            subject: self.settings.subject.clone(),
            body: self.formatter.format(record),
            level: record.level,
            timestamp: record.timestamp,
        }
    }
}

impl<T: MessageTransport> RecordHandler for MailSink<T> {
    fn handle(&mut self, record: LogRecord) -> Result<(), SinkError> {
        let message = self.compose(&record);
        self.transport.send(&message)
    }
}
