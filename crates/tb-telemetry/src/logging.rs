use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::level_filters::LevelFilter;
use tracing::Dispatch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::console::LevelFormat;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Output format of the console sink. The file sink is always human-readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Console filter used when `RUST_LOG` is not set (e.g. "info", "tb_core=debug,warn").
    pub console_level: String,
    pub console_format: LogFormat,
    /// File sink path. Truncated on every start; records everything at debug and above.
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            console_level: "info".into(),
            console_format: LogFormat::Human,
            file: Some(PathBuf::from("turbo.log")),
        }
    }
}

// ---------------------------------------------------------------------------
// LogContext
// ---------------------------------------------------------------------------

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Process-wide logging configuration, built once at startup.
///
/// Holds the assembled dispatcher rather than registering it globally; code
/// that should log through it runs inside [`LogContext::scope`].
#[derive(Clone)]
pub struct LogContext {
    dispatch: Dispatch,
    log_file: Option<PathBuf>,
}

impl LogContext {
    /// Build the console sink and, if configured, the file sink.
    pub fn new(service_name: &str, settings: &LogSettings) -> Result<Self, TelemetryError> {
        let mut layers: Vec<BoxedLayer> = vec![console_layer(settings)];

        if let Some(path) = &settings.file {
            layers.push(file_layer(path)?);
        }

        let ctx = Self {
            dispatch: Dispatch::new(Registry::default().with(layers)),
            log_file: settings.file.clone(),
        };
        ctx.scope(|| {
            tracing::debug!(
                service = service_name,
                log_file = ?ctx.log_file,
                "logging has started"
            );
        });
        Ok(ctx)
    }

    /// Console sink only, no file. Used by read-only subcommands.
    pub fn console_only(service_name: &str, level: &str) -> Self {
        let settings = LogSettings {
            console_level: level.to_string(),
            console_format: LogFormat::Human,
            file: None,
        };
        let ctx = Self {
            dispatch: Dispatch::new(Registry::default().with(vec![console_layer(&settings)])),
            log_file: None,
        };
        ctx.scope(|| tracing::debug!(service = service_name, "logging has started"));
        ctx
    }

    /// Wrap an already-built dispatcher (e.g. a capture subscriber in tests).
    pub fn from_dispatch(dispatch: Dispatch) -> Self {
        Self {
            dispatch,
            log_file: None,
        }
    }

    /// Run `f` with this context's sinks as the default dispatcher.
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}

impl std::fmt::Debug for LogContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogContext")
            .field("log_file", &self.log_file)
            .finish_non_exhaustive()
    }
}

/// Color-coded console sink, laid out per level by [`LevelFormat`].
///
/// Uses the `RUST_LOG` environment variable if set, otherwise falls back
/// to `settings.console_level`.
fn console_layer(settings: &LogSettings) -> BoxedLayer {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.console_level));

    match settings.console_format {
        LogFormat::Human => fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(std::io::stdout().is_terminal())
            .event_format(LevelFormat)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_level(true)
            .with_filter(filter)
            .boxed(),
    }
}

/// Plain-text file sink at debug level with source locations.
fn file_layer(path: &Path) -> Result<BoxedLayer, TelemetryError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| TelemetryError::LogFile {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|source| TelemetryError::LogFile {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .with_filter(LevelFilter::DEBUG)
        .boxed())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
