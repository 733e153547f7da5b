use super::{Config, ConfigError, OutputKind};
use url::Url;

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate buffer capacity
        if self.capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "Capacity must be greater than 0".to_string(),
            ));
        }

        // Validate flush delay (negative or non-finite values are rejected, never clamped)
        self.delay()?;

        if self.output == OutputKind::Relay {
            let endpoint = self.relay_endpoint.as_deref().ok_or_else(|| {
                ConfigError::InvalidConfig("relay_endpoint is required for relay output".to_string())
            })?;
            Url::parse(endpoint).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid relay endpoint URL '{endpoint}': {e}"))
            })?;

            self.mail_settings()?;

            if self.relay_timeout_secs == 0 {
                return Err(ConfigError::InvalidConfig(
                    "Relay timeout must be greater than 0".to_string(),
                ));
            }

            if self.relay_user.is_some() != self.relay_password.is_some() {
                return Err(ConfigError::InvalidConfig(
                    "relay_user and relay_password must be set together".to_string(),
                ));
            }
        }

        if self.output == OutputKind::Smtp {
            self.smtp_config()?;
            self.mail_settings()?;

            if self.smtp_timeout_secs == 0 {
                return Err(ConfigError::InvalidConfig(
                    "SMTP timeout must be greater than 0".to_string(),
                ));
            }

            if self.smtp_user.is_some() != self.smtp_password.is_some() {
                return Err(ConfigError::InvalidConfig(
                    "smtp_user and smtp_password must be set together".to_string(),
                ));
            }
        }

        Ok(())
    }
}
