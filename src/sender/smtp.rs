use super::SinkError;
use super::mail::{MessageTransport, OutboundMessage};
use super::relay::Credentials;
use clap::ValueEnum;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{Message, SmtpTransport as Mailer, Transport};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Plain connection (local relays and tests only)
    None,
    /// Upgrade a plain connection with STARTTLS, port 587 by default
    #[default]
    #[value(name = "starttls")]
    #[serde(rename = "starttls")]
    StartTls,
    /// Implicit TLS, port 465 by default
    Tls,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    /// Overrides the default port of the security mode.
    pub port: Option<u16>,
    pub security: SmtpSecurity,
    pub credentials: Option<Credentials>,
    pub timeout: Duration,
}

impl SmtpConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: SmtpSecurity::default(),
            credentials: None,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_security(mut self, security: SmtpSecurity) -> Self {
        self.security = security;
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Delivers outbound messages over SMTP, one connection per message.
#[derive(Clone)]
pub struct SmtpTransport {
    mailer: Mailer,
    host: String,
}

impl SmtpTransport {
    pub fn new(config: SmtpConfig) -> Result<Self, SinkError> {
        if config.host.trim().is_empty() {
            return Err(SinkError::InvalidConfig(
                "SMTP host must not be empty".to_string(),
            ));
        }

        let mut builder = match config.security {
            SmtpSecurity::None => Mailer::builder_dangerous(&config.host),
            SmtpSecurity::StartTls => Mailer::starttls_relay(&config.host).map_err(|e| {
                SinkError::InvalidConfig(format!("Failed to set up STARTTLS for {}: {e}", config.host))
            })?,
            SmtpSecurity::Tls => Mailer::relay(&config.host).map_err(|e| {
                SinkError::InvalidConfig(format!("Failed to set up TLS for {}: {e}", config.host))
            })?,
        };

        if let Some(port) = config.port {
            builder = builder.port(port);
        }
        if let Some(credentials) = config.credentials {
            builder = builder.credentials(SmtpCredentials::new(
                credentials.username,
                credentials.password,
            ));
        }
        let mailer = builder.timeout(Some(config.timeout)).build();

        Ok(Self {
            mailer,
            host: config.host,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, SinkError> {
    address
        .trim()
        .parse()
        .map_err(|e| SinkError::InvalidConfig(format!("Invalid mail address '{address}': {e}")))
}

/// Builds the RFC 5322 message for an outbound message. Blank recipient
/// entries are skipped.
pub fn build_message(message: &OutboundMessage) -> Result<Message, SinkError> {
    let recipients = message
        .to
        .iter()
        .filter(|addr| !addr.trim().is_empty())
        .map(|addr| parse_mailbox(addr))
        .collect::<Result<Vec<_>, _>>()?;

    let mut builder = Message::builder()
        .from(parse_mailbox(&message.from)?)
        .subject(message.subject.clone())
        .date(message.timestamp.into())
        .header(ContentType::TEXT_PLAIN);
    for recipient in recipients {
        builder = builder.to(recipient);
    }

    builder
        .body(message.body.clone())
        .map_err(|e| SinkError::Serialization(format!("Failed to build mail message: {e}")))
}

impl MessageTransport for SmtpTransport {
    fn send(&self, message: &OutboundMessage) -> Result<(), SinkError> {
        let email = build_message(message)?;

        match self.mailer.send(&email) {
            Ok(response) => {
                tracing::debug!(
                    code = %response.code(),
                    recipients = message.to.len(),
                    "SMTP server accepted message"
                );
                Ok(())
            }
            Err(e) => {
                let status = e
                    .status()
                    .and_then(|code| code.to_string().parse::<u16>().ok());
                match status {
                    Some(status) if e.is_permanent() => Err(SinkError::Rejected {
                        status,
                        body: e.to_string(),
                    }),
                    _ => {
                        let kind = if e.is_timeout() { "timed out" } else { "failed" };
                        Err(SinkError::Transport(format!(
                            "SMTP delivery to {} {kind}: {e}",
                            self.host
                        )))
                    }
                }
            }
        }
    }
}
