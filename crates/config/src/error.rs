//! Error types and load result structures for metric configuration.

use std::path::PathBuf;

use pulse_core::WindowError;

/// Errors that make a metric configuration unusable.
///
/// These always propagate to the caller; the pipeline never turns them into
/// recorded errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse/deserialization error.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A `${NAME}` reference without a default names an unset variable.
    #[error("Required environment variable not set: {0}")]
    EnvVar(String),

    /// Malformed `${...}` reference.
    #[error("invalid environment variable reference: {0}")]
    EnvSyntax(String),

    /// Template rendering failed (syntax error or undefined variable).
    #[error("template rendering failed: {0}")]
    Template(String),

    /// Invalid window or interval expression.
    #[error(transparent)]
    Window(#[from] WindowError),

    /// One or more structural problems, each prefixed with its path.
    #[error("configuration validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A backtest was requested for a unit that does not enable it.
    #[error("backtesting is not enabled for metric '{0}'; set backtest.enabled: true")]
    BacktestDisabled(String),

    /// Error raised while loading a specific file.
    #[error("{}: {source}", path.display())]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<ConfigError>,
    },
}

impl ConfigError {
    /// Attach the file the error came from.
    pub fn in_file(self, path: impl Into<PathBuf>) -> Self {
        match self {
            already @ (ConfigError::InFile { .. } | ConfigError::Io { .. }) => already,
            other => ConfigError::InFile {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, skipping file context.
    pub fn root(&self) -> &ConfigError {
        match self {
            ConfigError::InFile { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Outcome of loading a single configuration file from a directory.
#[derive(Debug)]
pub struct LoadResult {
    /// Path to the file that was loaded.
    pub path: PathBuf,
    /// Status of the load attempt.
    pub status: LoadStatus,
}

/// Status of a single file load attempt.
#[derive(Debug)]
pub enum LoadStatus {
    /// The metric unit was loaded and validated.
    Loaded { name: String },
    /// File was skipped (dotfile, non-YAML, etc.).
    Skipped { reason: String },
    /// Parse or validation error occurred.
    Failed { error: String },
}
