use super::{ConfigError, OutputKind};
use crate::buffer::{CoordinatorConfig, EncodePolicy, delay_from_secs};
use crate::domain::LogLevel;
use crate::sender::{MailSettings, RelayConfig, SmtpConfig, SmtpSecurity};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding a complete TOML configuration.
pub const CONFIG_ENV_VAR: &str = "RASK_BURST_CONFIG";

#[derive(Parser, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Number of buffered records that forces a flush
    #[arg(long, env = "BURST_CAPACITY", default_value = "32")]
    pub capacity: usize,

    /// Seconds to wait after the first record of a burst before flushing (disabled if unset)
    #[arg(long, env = "BURST_DELAY_SECS", allow_negative_numbers = true)]
    pub delay_secs: Option<f64>,

    /// Records at or above this level are flushed immediately
    #[arg(long, env = "BURST_FLUSH_LEVEL", default_value = "fatal")]
    pub flush_level: LogLevel,

    /// How a flushed burst is handed to the output
    #[arg(long, env = "BURST_ENCODE_POLICY", default_value = "pass-through")]
    pub encode_policy: EncodePolicy,

    /// Discard buffered records on shutdown instead of flushing them
    #[arg(long, env = "BURST_NO_FLUSH_ON_CLOSE")]
    pub no_flush_on_close: bool,

    /// Level given to input lines that carry no level prefix
    #[arg(long, env = "BURST_INPUT_LEVEL", default_value = "info")]
    pub input_level: LogLevel,

    /// Output for flushed records
    #[arg(long, env = "BURST_OUTPUT", default_value = "stdout")]
    pub output: OutputKind,

    /// Write stdout records as JSON objects instead of text lines
    #[arg(long, env = "BURST_JSON_LINES")]
    pub json_lines: bool,

    /// Mail relay endpoint URL (output=relay)
    #[arg(long, env = "RELAY_ENDPOINT")]
    pub relay_endpoint: Option<String>,

    /// Sender address (output=relay or smtp)
    #[arg(long, env = "MAIL_FROM")]
    pub mail_from: Option<String>,

    /// Comma-separated recipient addresses (output=relay or smtp)
    #[arg(long, env = "MAIL_TO", value_delimiter = ',')]
    pub mail_to: Vec<String>,

    /// Subject of every mailed burst
    #[arg(long, env = "MAIL_SUBJECT", default_value = "Log burst")]
    pub subject: String,

    /// Relay basic-auth user
    #[arg(long, env = "RELAY_USER")]
    pub relay_user: Option<String>,

    /// Relay basic-auth password
    #[arg(long, env = "RELAY_PASSWORD", hide_env_values = true)]
    pub relay_password: Option<String>,

    /// Relay request timeout in seconds
    #[arg(long, env = "RELAY_TIMEOUT_SECS", default_value = "5")]
    pub relay_timeout_secs: u64,

    /// SMTP server host (output=smtp)
    #[arg(long, env = "SMTP_HOST")]
    pub smtp_host: Option<String>,

    /// SMTP server port (defaults to the port of the security mode)
    #[arg(long, env = "SMTP_PORT")]
    pub smtp_port: Option<u16>,

    /// SMTP connection security
    #[arg(long, env = "SMTP_SECURITY", default_value = "starttls")]
    pub smtp_security: SmtpSecurity,

    /// SMTP login user
    #[arg(long, env = "SMTP_USER")]
    pub smtp_user: Option<String>,

    /// SMTP login password
    #[arg(long, env = "SMTP_PASSWORD", hide_env_values = true)]
    pub smtp_password: Option<String>,

    /// SMTP connection timeout in seconds
    #[arg(long, env = "SMTP_TIMEOUT_SECS", default_value = "5")]
    pub smtp_timeout_secs: u64,

    /// Level of this process's own diagnostics (written to stderr)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Configuration file path (optional, replaces all other settings)
    #[arg(long, env = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: 32,
            delay_secs: None,
            flush_level: LogLevel::Fatal,
            encode_policy: EncodePolicy::PassThrough,
            no_flush_on_close: false,
            input_level: LogLevel::Info,
            output: OutputKind::Stdout,
            json_lines: false,
            relay_endpoint: None,
            mail_from: None,
            mail_to: Vec::new(),
            subject: "Log burst".to_string(),
            relay_user: None,
            relay_password: None,
            relay_timeout_secs: 5,
            smtp_host: None,
            smtp_port: None,
            smtp_security: SmtpSecurity::StartTls,
            smtp_user: None,
            smtp_password: None,
            smtp_timeout_secs: 5,
            log_level: LogLevel::Info,
            config_file: None,
        }
    }
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::try_parse_from(args)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// CLI arguments (clap also reads each argument's env var). A config file
    /// given with `--config-file`, or TOML in `RASK_BURST_CONFIG`, replaces the
    /// argument values entirely.
    pub fn from_args_and_env<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::try_parse_from(args)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

        if let Some(path) = &config.config_file {
            return Self::from_file(path);
        }
        if let Ok(toml) = std::env::var(CONFIG_ENV_VAR) {
            return Self::from_toml_str(&toml);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn delay(&self) -> Result<Option<Duration>, ConfigError> {
        self.delay_secs
            .map(delay_from_secs)
            .transpose()
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))
    }

    pub fn coordinator_config(&self) -> Result<CoordinatorConfig, ConfigError> {
        let config = CoordinatorConfig {
            capacity: self.capacity,
            delay: self.delay()?,
            flush_level: self.flush_level,
            encode_policy: self.encode_policy,
            flush_on_close: !self.no_flush_on_close,
        };
        config
            .validate()
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        Ok(config)
    }

    pub fn mail_settings(&self) -> Result<MailSettings, ConfigError> {
        let from = self.mail_from.clone().ok_or_else(|| {
            ConfigError::InvalidConfig("mail_from is required for mail output".to_string())
        })?;
        let settings = MailSettings::new(from, self.mail_to.clone(), self.subject.clone());
        settings
            .validate()
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        Ok(settings)
    }

    pub fn relay_config(&self) -> Result<RelayConfig, ConfigError> {
        let endpoint = self.relay_endpoint.as_deref().ok_or_else(|| {
            ConfigError::InvalidConfig("relay_endpoint is required for relay output".to_string())
        })?;

        let mut relay = RelayConfig::new(endpoint)
            .map_err(|e| ConfigError::InvalidUrl(e.to_string()))?
            .with_timeout(Duration::from_secs(self.relay_timeout_secs));
        if let (Some(user), Some(password)) = (&self.relay_user, &self.relay_password) {
            relay = relay.with_credentials(user.clone(), password.clone());
        }
        Ok(relay)
    }

    pub fn smtp_config(&self) -> Result<SmtpConfig, ConfigError> {
        let host = self
            .smtp_host
            .as_deref()
            .filter(|host| !host.trim().is_empty())
            .ok_or_else(|| {
                ConfigError::InvalidConfig("smtp_host is required for smtp output".to_string())
            })?;

        let mut smtp = SmtpConfig::new(host)
            .with_security(self.smtp_security)
            .with_timeout(Duration::from_secs(self.smtp_timeout_secs));
        if let Some(port) = self.smtp_port {
            smtp = smtp.with_port(port);
        }
        if let (Some(user), Some(password)) = (&self.smtp_user, &self.smtp_password) {
            smtp = smtp.with_credentials(user.clone(), password.clone());
        }
        Ok(smtp)
    }
}
