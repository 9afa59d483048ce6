//! Error handling for the console binary

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("console error: {0}")]
    Console(#[from] console_core::ConsoleError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
