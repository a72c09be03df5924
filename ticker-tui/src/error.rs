use std::path::PathBuf;
use thiserror::Error;
use ticker_data::error::FeedError;

/// Startup failure, reported before the board takes over the terminal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ConfigurationError: invalid {var}={value:?}, expected {expected}")]
    InvalidValue {
        var: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("ConfigurationError: NUM must be at least 1")]
    ZeroLeaders,

    #[error("ConfigurationError: could not determine trading pairs to display")]
    NoPairs,

    #[error("ConfigurationError: failed to open LOGFILE {path:?}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Feed(#[from] FeedError),
}
