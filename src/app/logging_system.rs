use crate::domain::LogLevel;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Error, Debug)]
pub enum InitializationError {
    #[error("Invalid log level '{input}'")]
    InvalidLogLevel { input: String },

    #[error("Invalid directive format '{input}'. Expected: 'target=level'")]
    InvalidDirectiveFormat { input: String },

    #[error("Empty target in directive '{input}'")]
    EmptyTarget { input: String },

    #[error("Logging system initialization failed: {details}")]
    LoggingInitFailed {
        details: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// `target=level` filter directive for the diagnostic subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDirective {
    pub target: String,
    pub level: LogLevel,
}

impl LogDirective {
    pub fn new(target: impl Into<String>, level: LogLevel) -> Self {
        Self {
            target: target.into(),
            level,
        }
    }

    pub fn parse(input: &str) -> Result<Self, InitializationError> {
        let Some((target, level)) = input.split_once('=') else {
            return Err(InitializationError::InvalidDirectiveFormat {
                input: input.to_string(),
            });
        };

        let target = target.trim();
        if target.is_empty() {
            return Err(InitializationError::EmptyTarget {
                input: input.to_string(),
            });
        }

        let level = level
            .trim()
            .parse::<LogLevel>()
            .map_err(|_| InitializationError::InvalidLogLevel {
                input: level.to_string(),
            })?;

        Ok(Self::new(target, level))
    }

    pub fn to_filter_string(&self) -> String {
        format!("{}={}", self.target, self.level.as_filter_directive())
    }
}

/// Diagnostics for the process itself. Written to stderr: stdout belongs to
/// the stream sink.
pub struct LoggingSystem {
    directives: Arc<RwLock<Vec<LogDirective>>>,
}

impl LoggingSystem {
    pub fn new() -> Self {
        Self {
            directives: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Malformed directives are skipped with a warning on stderr; the
    /// subscriber is not installed yet, so there is nowhere else to report.
    pub fn add_directive(&self, directive_str: &str) -> Result<(), InitializationError> {
        match LogDirective::parse(directive_str) {
            Ok(directive) => {
                self.directives.write().push(directive);
                Ok(())
            }
            Err(e) => {
                eprintln!("Warning: {e}, skipping directive");
                Ok(())
            }
        }
    }

    pub fn add_default_directives(&self) {
        let defaults = [
            ("hyper", LogLevel::Warn),
            ("reqwest", LogLevel::Warn),
            ("rustls", LogLevel::Warn),
        ];

        let mut directives = self.directives.write();
        for (target, level) in defaults {
            directives.push(LogDirective::new(target, level));
        }
    }

    pub fn build_filter_string(&self, default_level: LogLevel) -> String {
        let directives = self.directives.read();

        let mut filter_parts = Vec::with_capacity(directives.len() + 1);
        filter_parts.push(default_level.as_filter_directive().to_string());
        for directive in &*directives {
            filter_parts.push(directive.to_filter_string());
        }

        filter_parts.join(",")
    }

    pub fn initialize_tracing(&self, default_level: LogLevel) -> Result<(), InitializationError> {
        let filter_string = self.build_filter_string(default_level);

        let env_filter = EnvFilter::try_new(&filter_string).map_err(|e| {
            InitializationError::LoggingInitFailed {
                details: format!("Failed to create EnvFilter with '{filter_string}'"),
                source: Box::new(e),
            }
        })?;

        let subscriber = tracing_subscriber::registry().with(env_filter).with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(true)
                .with_level(true)
                .compact(),
        );

        tracing::subscriber::set_global_default(subscriber).map_err(|e| {
            InitializationError::LoggingInitFailed {
                details: "Failed to set global tracing subscriber".to_string(),
                source: Box::new(e),
            }
        })
    }

    pub fn directive_count(&self) -> usize {
        self.directives.read().len()
    }
}

impl Default for LoggingSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the diagnostic subscriber once per process. `extra_directives`
/// come from `RUST_LOG`-style configuration.
pub fn setup_logging_safe(
    level: LogLevel,
    extra_directives: &[String],
) -> Result<(), InitializationError> {
    use std::sync::OnceLock;

    static INIT_RESULT: OnceLock<Result<(), String>> = OnceLock::new();

    let result = INIT_RESULT.get_or_init(|| {
        let logging_system = LoggingSystem::new();
        logging_system.add_default_directives();
        for directive in extra_directives {
            logging_system
                .add_directive(directive)
                .map_err(|e| e.to_string())?;
        }
        logging_system
            .initialize_tracing(level)
            .map_err(|e| e.to_string())
    });

    result
        .clone()
        .map_err(|details| InitializationError::LoggingInitFailed {
            details,
            source: Box::new(std::io::Error::other("Logging initialization error")),
        })
}
