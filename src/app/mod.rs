pub mod config;
pub mod logging_system;
pub mod shutdown;

pub use config::{Config, ConfigError, OutputKind};
pub use logging_system::{InitializationError, LoggingSystem, setup_logging_safe};
pub use shutdown::{ShutdownReason, wait_for_signal};

use crate::buffer::{CoordinatorConfig, DelayedFlushCoordinator, EncodePolicy, FlushStats};
use crate::collector::{CollectorError, PumpSummary, pump_lines};
use crate::domain::{JsonFormatter, LineFormatter, MessageFormatter, RecordFormatter};
use crate::sender::{
    HttpRelayTransport, MailSink, MessageTransport, RecordHandler, SmtpTransport, StreamSink,
};
use anyhow::{Context, anyhow};
use clap::Parser;
use std::io::BufRead;
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// Target given to records read from the input stream.
pub const INPUT_TARGET: &str = "stdin";

const PUMP_THREAD_NAME: &str = "input-pump";

type Coordinator = DelayedFlushCoordinator<Box<dyn RecordHandler>>;

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub reason: ShutdownReason,
    /// `None` when a signal arrived before the input was exhausted.
    pub pump: Option<PumpSummary>,
    pub stats: FlushStats,
}

pub struct App {
    config: Config,
}

impl App {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::from_args_and_env(args)?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run(self) -> anyhow::Result<RunSummary> {
        self.run_with_input(std::io::BufReader::new(std::io::stdin()))
            .await
    }

    /// Pumps `input` through a coordinator until end of input or a shutdown
    /// signal, then closes it.
    ///
    /// The coordinator is built and closed on blocking threads: the relay
    /// transport owns a blocking HTTP client.
    pub async fn run_with_input<R>(self, input: R) -> anyhow::Result<RunSummary>
    where
        R: BufRead + Send + 'static,
    {
        let config = self.config;

        info!("Starting rask-burst-buffer v{}", get_version());
        info!(
            "Configuration: capacity={}, delay_secs={:?}, flush_level={}, policy={:?}, output={:?}",
            config.capacity,
            config.delay_secs,
            config.flush_level,
            config.encode_policy,
            config.output
        );

        let build_config = config.clone();
        let coordinator = tokio::task::spawn_blocking(move || build_coordinator(&build_config))
            .await
            .context("Coordinator setup task failed")??;
        let coordinator = Arc::new(coordinator);

        let (done_tx, done_rx) = oneshot::channel();
        let pump_coordinator = Arc::clone(&coordinator);
        let input_level = config.input_level;
        thread::Builder::new()
            .name(PUMP_THREAD_NAME.to_string())
            .spawn(move || {
                let result = pump_lines(input, &pump_coordinator, input_level, INPUT_TARGET);
                // The receiver is gone once a signal won the race
                let _ = done_tx.send(result);
            })
            .context("Failed to spawn input thread")?;

        info!("rask-burst-buffer is running. Press Ctrl+C to stop.");

        let (reason, pump_result) = tokio::select! {
            result = done_rx => match result {
                Ok(result) => (ShutdownReason::InputClosed, Some(result)),
                Err(_) => (ShutdownReason::InputClosed, None),
            },
            reason = wait_for_signal() => (reason, None),
        };

        let (close_result, stats) = tokio::task::spawn_blocking(move || {
            let result = coordinator.close();
            let stats = coordinator.stats();
            drop(coordinator);
            (result, stats)
        })
        .await
        .context("Coordinator shutdown task failed")?;

        info!(
            "Stopped ({reason}): {} flushes, {} records flushed, {} discarded, {} sink failures",
            stats.total_flushes(),
            stats.records_flushed,
            stats.records_discarded,
            stats.sink_failures
        );

        let pump = match pump_result {
            Some(Ok(summary)) => Some(summary),
            Some(Err(CollectorError::CollectionStopped)) | None => None,
            Some(Err(e)) => return Err(anyhow!(e).context("Input pump failed")),
        };

        close_result.context("Final flush failed")?;

        Ok(RunSummary {
            reason,
            pump,
            stats,
        })
    }
}

/// Stdout records are rendered by the sink, one line each; a merged burst
/// becomes one header line followed by its messages. Mail outputs always
/// merge so that each burst is one message.
fn build_coordinator(config: &Config) -> anyhow::Result<Coordinator> {
    let coordinator_config = config
        .coordinator_config()
        .context("Invalid coordinator configuration")?;

    let (sink, coordinator_config): (Box<dyn RecordHandler>, _) = match config.output {
        OutputKind::Stdout => {
            let formatter: Arc<dyn RecordFormatter> = if config.json_lines {
                Arc::new(JsonFormatter)
            } else {
                Arc::new(LineFormatter::new())
            };
            let sink = StreamSink::with_formatter(std::io::stdout(), formatter);
            (Box::new(sink), coordinator_config)
        }
        OutputKind::Relay => {
            let transport = HttpRelayTransport::new(config.relay_config()?)
                .context("Failed to create relay transport")?;
            mail_sink(config, transport, coordinator_config)?
        }
        OutputKind::Smtp => {
            let transport = SmtpTransport::new(config.smtp_config()?)
                .context("Failed to create SMTP transport")?;
            mail_sink(config, transport, coordinator_config)?
        }
    };

    Ok(DelayedFlushCoordinator::new(sink, coordinator_config)?)
}

fn mail_sink<T: MessageTransport>(
    config: &Config,
    transport: T,
    coordinator_config: CoordinatorConfig,
) -> anyhow::Result<(Box<dyn RecordHandler>, CoordinatorConfig)> {
    if config.encode_policy == EncodePolicy::PassThrough {
        warn!("Mail output merges every burst; ignoring pass-through policy");
    }
    let sink = MailSink::with_formatter(config.mail_settings()?, transport, Arc::new(MessageFormatter))?;
    Ok((
        Box::new(sink),
        coordinator_config.with_encode_policy(EncodePolicy::Merge),
    ))
}

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn log_directives_from_env() -> Vec<String> {
    std::env::var("RUST_LOG")
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|d| d.contains('='))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// Main entry point for the application
pub async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // Handle version flag specially
    if args.len() > 1 && (args[1] == "--version" || args[1] == "-V") {
        println!("rask-burst-buffer {}", get_version());
        return Ok(());
    }

    // Handle help flag
    if args.len() > 1 && (args[1] == "--help" || args[1] == "-h") {
        Config::parse_from(["rask-burst-buffer", "--help"]);
        return Ok(());
    }

    let app = match App::from_args(args) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    if let Err(e) = setup_logging_safe(app.config().log_level, &log_directives_from_env()) {
        eprintln!("Warning: {e}");
    }

    match app.run().await {
        Ok(summary) => {
            if let Some(pump) = summary.pump {
                info!(
                    "Read {} lines, accepted {} records",
                    pump.lines_read, pump.records_accepted
                );
            }
            Ok(())
        }
        Err(e) => {
            error!("Application error: {:#}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::SmtpSecurity;

    #[test]
    fn test_build_coordinator_for_stdout() {
        let config = Config {
            capacity: 4,
            ..Config::default()
        };
        let coordinator = build_coordinator(&config).unwrap();
        assert_eq!(coordinator.config().capacity, 4);
        assert!(coordinator.config().delay.is_none());
        coordinator.close().unwrap();
    }

    #[test]
    fn test_build_coordinator_for_relay_forces_merge() {
        let config = Config {
            output: OutputKind::Relay,
            relay_endpoint: Some("http://127.0.0.1:9/send".to_string()),
            mail_from: Some("alerts@example.com".to_string()),
            mail_to: vec!["ops@example.com".to_string()],
            ..Config::default()
        };
        let coordinator = build_coordinator(&config).unwrap();
        assert_eq!(coordinator.config().encode_policy, EncodePolicy::Merge);
        coordinator.close().unwrap();
    }

    #[test]
    fn test_build_coordinator_for_smtp_forces_merge() {
        let config = Config {
            output: OutputKind::Smtp,
            smtp_host: Some("127.0.0.1".to_string()),
            smtp_port: Some(9),
            smtp_security: SmtpSecurity::None,
            mail_from: Some("alerts@example.com".to_string()),
            mail_to: vec!["ops@example.com".to_string()],
            ..Config::default()
        };
        let coordinator = build_coordinator(&config).unwrap();
        assert_eq!(coordinator.config().encode_policy, EncodePolicy::Merge);
        coordinator.close().unwrap();
    }

    #[test]
    fn test_build_coordinator_for_smtp_requires_host() {
        let config = Config {
            output: OutputKind::Smtp,
            mail_from: Some("alerts@example.com".to_string()),
            mail_to: vec!["ops@example.com".to_string()],
            ..Config::default()
        };
        assert!(build_coordinator(&config).is_err());
    }

    #[test]
    fn test_build_coordinator_for_json_lines() {
        let config = Config {
            json_lines: true,
            encode_policy: EncodePolicy::Merge,
            ..Config::default()
        };
        let coordinator = build_coordinator(&config).unwrap();
        assert_eq!(coordinator.config().encode_policy, EncodePolicy::Merge);
        coordinator.close().unwrap();
    }

    #[test]
    fn test_build_coordinator_rejects_zero_capacity() {
        let config = Config {
            capacity: 0,
            ..Config::default()
        };
        assert!(build_coordinator(&config).is_err());
    }
}
