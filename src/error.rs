//! Error types for the analyzer pipeline
//!
//! Only the surrounding I/O can fail hard. Missing or contradictory log data
//! never surfaces here: the correlator degrades those to warnings.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort an analysis run
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Log file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to render {format} report: {message}")]
    Render {
        format: &'static str,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for analyzer operations
pub type Result<T> = std::result::Result<T, AnalyzerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_not_found_message_names_path() {
        let err = AnalyzerError::InputNotFound(PathBuf::from("/var/log/ydb.log"));
        assert_eq!(err.to_string(), "Log file not found: /var/log/ydb.log");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: AnalyzerError = io.into();
        assert!(matches!(err, AnalyzerError::Io(_)));
        assert!(err.to_string().contains("pipe closed"));
    }
}
