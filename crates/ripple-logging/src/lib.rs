//! Structured logging for Ripple
//!
//! This crate sets up the `tracing` subscriber used by Ripple binaries and
//! tests.
//!
//! # Features
//!
//! - **JSONL Output**: Structured JSON lines format for log aggregation (default)
//! - **Pretty Output**: Human-readable console output for development
//! - **Node Context**: Attribute events to the flood node that produced them
//! - **File Rotation**: Daily/hourly log rotation via tracing-appender
//!
//! # Quick Start
//!
//! ```ignore
//! use ripple_logging::{LogConfig, RippleSubscriberBuilder};
//!
//! // JSONL to console
//! let _guard = RippleSubscriberBuilder::new().init()?;
//!
//! // Development mode with pretty human-readable output
//! let _guard = RippleSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init()?;
//! ```
//!
//! Keep the returned guard alive while logging to a file; dropping it flushes
//! the writer.

pub mod config;
pub mod context;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use context::{NodeContext, NodeContextGuard};
pub use tracing_appender::non_blocking::WorkerGuard;

use std::fs;

use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter::Directive, layer::SubscriberExt,
    util::SubscriberInitExt,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LogError {
    /// A global subscriber is already installed
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),

    /// A level or directive could not be parsed
    #[error("Invalid log filter {0:?}")]
    InvalidFilter(String),

    /// The log directory could not be prepared
    #[error("Log file error: {0}")]
    Io(#[from] std::io::Error),

    /// The rolling file appender could not be created
    #[error("Log appender error: {0}")]
    Appender(String),
}

/// Builder for configuring and initializing the Ripple logging subscriber
///
/// By default, console output uses JSONL format. Use `LogConfig::development()`
/// for human-readable pretty output during development.
pub struct RippleSubscriberBuilder {
    config: LogConfig,
}

impl RippleSubscriberBuilder {
    /// Create a new subscriber builder with default configuration
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Add a filter directive such as `ripple_flood=trace`
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.config.directives.push(directive.into());
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Use pretty console output instead of JSONL
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.config.console.pretty = pretty;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Install the subscriber globally
    ///
    /// Returns the file writer guard when file output is enabled.
    pub fn init(self) -> Result<Option<WorkerGuard>, LogError> {
        let filter = self.env_filter()?;
        let (layers, guard) = self.layers()?;

        tracing_subscriber::registry()
            .with(layers)
            .with(filter)
            .try_init()
            .map_err(|e| LogError::AlreadyInitialized(e.to_string()))?;

        Ok(guard)
    }

    /// RUST_LOG wins over the configured level
    fn env_filter(&self) -> Result<EnvFilter, LogError> {
        let mut filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&self.config.default_level)
                .map_err(|_| LogError::InvalidFilter(self.config.default_level.clone()))?,
        };
        for directive in &self.config.directives {
            let parsed = directive
                .parse::<Directive>()
                .map_err(|_| LogError::InvalidFilter(directive.clone()))?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }

    fn layers(&self) -> Result<(Vec<BoxedLayer>, Option<WorkerGuard>), LogError> {
        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        let console = &self.config.console;
        if console.enabled {
            let level = match &console.level {
                Some(level) => level
                    .parse::<LevelFilter>()
                    .map_err(|_| LogError::InvalidFilter(level.clone()))?,
                None => LevelFilter::TRACE,
            };
            let layer = match (console.pretty, console.test_writer) {
                (true, false) => tracing_subscriber::fmt::layer()
                    .with_ansi(console.ansi)
                    .with_target(true)
                    .boxed(),
                (true, true) => tracing_subscriber::fmt::layer()
                    .with_ansi(console.ansi)
                    .with_target(true)
                    .with_test_writer()
                    .boxed(),
                (false, false) => self.jsonl_layer(std::io::stdout),
                (false, true) => self.jsonl_layer(tracing_subscriber::fmt::TestWriter::new),
            };
            layers.push(layer.with_filter(level).boxed());
        }

        if let Some(file) = &self.config.file {
            let (writer, file_guard) = tracing_appender::non_blocking(file_appender(file)?);
            layers.push(self.jsonl_layer(writer));
            guard = Some(file_guard);
        }

        Ok((layers, guard))
    }

    fn jsonl_layer<W>(&self, writer: W) -> BoxedLayer
    where
        W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
    {
        let jsonl = &self.config.jsonl;
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(jsonl.include_current_span)
            .with_span_list(jsonl.include_spans)
            .flatten_event(jsonl.flatten_events)
            .with_file(jsonl.include_location)
            .with_line_number(jsonl.include_location)
            .with_thread_ids(jsonl.include_thread_info)
            .with_thread_names(jsonl.include_thread_info)
            .with_writer(writer)
            .boxed()
    }
}

impl Default for RippleSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn file_appender(config: &FileConfig) -> Result<RollingFileAppender, LogError> {
    fs::create_dir_all(&config.directory)?;

    let rotation = match config.rotation {
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
        RotationStrategy::Never => Rotation::NEVER,
    };
    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&config.prefix)
        .filename_suffix("log");
    if let Some(max_files) = config.max_files {
        builder = builder.max_log_files(max_files);
    }

    builder
        .build(&config.directory)
        .map_err(|e| LogError::Appender(e.to_string()))
}

/// Initialize logging with default settings (JSONL to console)
pub fn init_default() -> Result<(), LogError> {
    RippleSubscriberBuilder::new().init().map(|_| ())
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() -> Result<(), LogError> {
    RippleSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
        .map(|_| ())
}

/// Initialize logging for testing (minimal output)
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_testing() {
    let _ = RippleSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .init();
}
