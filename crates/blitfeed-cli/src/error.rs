//! Error handling for the blitfeed CLI

use thiserror::Error;

use blitfeed_core::{ConfigError, ReplayError};

/// Exit code for configuration and usage errors
pub const EXIT_USAGE: i32 = 2;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Replay(#[from] ReplayError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot import messages: {0:#}")]
    Import(anyhow::Error),

    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::Replay(ReplayError::Config(err))
    }
}

impl CliError {
    /// Process exit code for errors raised before the replay starts
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Replay(ReplayError::Transport(_)) => 1,
            _ => EXIT_USAGE,
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
