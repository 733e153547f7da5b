use super::SinkError;
use super::mail::{MessageTransport, OutboundMessage};
use reqwest::blocking::Client;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub endpoint: Url,
    pub credentials: Option<Credentials>,
    pub timeout: Duration,
    pub user_agent: String,
}

impl RelayConfig {
    pub fn new(endpoint: &str) -> Result<Self, SinkError> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            SinkError::InvalidConfig(format!("Invalid relay endpoint URL '{endpoint}': {e}"))
        })?;

        Ok(Self {
            endpoint,
            credentials: None,
            timeout: Duration::from_secs(5),
            user_agent: format!("rask-burst-buffer/{}", env!("CARGO_PKG_VERSION")),
        })
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

#[derive(Debug, Default)]
pub struct RelayStats {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    total_response_time: AtomicU64,
}

impl RelayStats {
    fn record_request(&self, success: bool, response_time: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time
            .fetch_add(response_time.as_millis() as u64, Ordering::Relaxed);

        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn successful_requests(&self) -> u64 {
        self.successful_requests.load(Ordering::Relaxed)
    }

    pub fn failed_requests(&self) -> u64 {
        self.failed_requests.load(Ordering::Relaxed)
    }

    pub fn average_response_time(&self) -> Duration {
        let total = self.total_requests();
        if total == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.total_response_time.load(Ordering::Relaxed) / total)
    }
}

/// Posts each outbound message as JSON to an HTTP mail relay.
///
/// Uses a blocking client: the coordinator calls transports synchronously
/// from producer threads or its own worker thread, never from async code.
#[derive(Debug, Clone)]
pub struct HttpRelayTransport {
    client: Client,
    config: RelayConfig,
    stats: Arc<RelayStats>,
}

impl HttpRelayTransport {
    pub fn new(config: RelayConfig) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| SinkError::InvalidConfig(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            stats: Arc::new(RelayStats::default()),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.config.endpoint
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }
}

impl MessageTransport for HttpRelayTransport {
    fn send(&self, message: &OutboundMessage) -> Result<(), SinkError> {
        let start = Instant::now();

        let mut request = self
            .client
            .post(self.config.endpoint.clone())
            .json(message);
        if let Some(credentials) = &self.config.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = match request.send() {
            Ok(response) => response,
            Err(e) => {
                self.stats.record_request(false, start.elapsed());
                let kind = if e.is_timeout() { "timed out" } else { "failed" };
                return Err(SinkError::Transport(format!(
                    "Relay request to {} {kind}: {e}",
                    self.config.endpoint
                )));
            }
        };

        let status = response.status();
        let success = status.is_success();
        self.stats.record_request(success, start.elapsed());

        if success {
            tracing::debug!(
                status = status.as_u16(),
                recipients = message.to.len(),
                "Relay accepted message"
            );
            Ok(())
        } else {
            let body = response.text().unwrap_or_default();
            Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_config_rejects_bad_url() {
        assert!(matches!(
            RelayConfig::new("not a url"),
            Err(SinkError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_relay_config_builder() {
        let config = RelayConfig::new("http://localhost:8025/send")
            .unwrap()
            .with_credentials("user", "secret")
            .with_timeout(Duration::from_secs(2));

        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(
            config.credentials,
            Some(Credentials {
                username: "user".to_string(),
                password: "secret".to_string(),
            })
        );
        assert_eq!(config.endpoint.path(), "/send");
    }

    #[test]
    fn test_stats_average() {
        let stats = RelayStats::default();
        assert_eq!(stats.average_response_time(), Duration::ZERO);

        stats.record_request(true, Duration::from_millis(10));
        stats.record_request(false, Duration::from_millis(30));
        assert_eq!(stats.total_requests(), 2);
        assert_eq!(stats.successful_requests(), 1);
        assert_eq!(stats.failed_requests(), 1);
        assert_eq!(stats.average_response_time(), Duration::from_millis(20));
    }
}
