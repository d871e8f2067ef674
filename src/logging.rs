//! Logging setup and the per-component logging context.
//!
//! Events go through `tracing`; backends are `tracing-subscriber` layers
//! (console always, a plain-text file when configured).

use std::borrow::Cow;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Backend selection for [`init`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Directive applied when `RUST_LOG` does not override it.
    pub default_directive: String,
    /// Also append log lines to this file.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_directive: "countertrail=info".to_string(),
            file: None,
        }
    }
}

/// Install the global subscriber. A file that cannot be opened is reported
/// on the console and skipped.
pub fn init(config: &LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::from_default_env().add_directive(config.default_directive.parse()?);

    let file_layer = match &config.file {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            Err(e) => {
                eprintln!("countertrail: cannot open log file {}: {}", path.display(), e);
                None
            }
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()?;

    Ok(())
}

/// Logging context handed to each component at construction.
///
/// Every event carries the component name as its `source` field.
#[derive(Debug, Clone)]
pub struct Logger {
    source: Cow<'static, str>,
}

impl Logger {
    pub fn new(source: impl Into<Cow<'static, str>>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn info(&self, message: &str) {
        tracing::info!(source = %self.source, "{}", message);
    }

    pub fn warning(&self, message: &str) {
        tracing::warn!(source = %self.source, "{}", message);
    }

    pub fn error(&self, message: &str) {
        tracing::error!(source = %self.source, "{}", message);
    }

    pub fn verbose(&self, message: &str) {
        tracing::debug!(source = %self.source, "{}", message);
    }
}
