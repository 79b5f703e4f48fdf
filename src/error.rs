use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CollectorError {
    #[error("missing required setting: {0}")]
    #[diagnostic(help("set it in the environment, a .env file or the config file"))]
    MissingSetting(&'static str),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid query descriptor: {0}")]
    InvalidQuery(String),

    #[error("invalid dimension value: {0:?}")]
    InvalidDimension(String),

    #[error("query {0} expands by dimension but no dimension value was supplied")]
    MissingDimension(String),

    #[error("query {0} uses the dimension placeholder but does not expand by dimension")]
    UnexpectedPlaceholder(String),

    #[error("invalid header {name}: {message}")]
    InvalidHeader { name: String, message: String },

    #[error("request failed: {0}")]
    Http(String),

    #[error("API returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("failed to decode response body: {0}")]
    Decode(String),

    #[error("unexpected payload from {query}: {message}")]
    UnexpectedPayload { query: String, message: String },

    #[error("failed to persist {path}: {message}")]
    Persistence { path: String, message: String },
}

impl CollectorError {
    /// Transport-level faults that the fetch executor retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CollectorError::Http(_) | CollectorError::HttpStatus { .. } | CollectorError::Decode(_)
        )
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CollectorError::MissingSetting(_)
                | CollectorError::ConfigRead(_)
                | CollectorError::ConfigParse(_)
                | CollectorError::InvalidQuery(_)
                | CollectorError::InvalidDimension(_)
                | CollectorError::MissingDimension(_)
                | CollectorError::UnexpectedPlaceholder(_)
                | CollectorError::InvalidHeader { .. }
        )
    }

    /// Process exit status for an error that ended the run.
    pub fn exit_code(&self) -> u8 {
        match self {
            err if err.is_configuration() => 2,
            CollectorError::UnexpectedPayload { .. } => 3,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_retryable() {
        assert!(CollectorError::Http("timed out".to_string()).is_retryable());
        assert!(
            CollectorError::HttpStatus {
                status: 503,
                message: "busy".to_string()
            }
            .is_retryable()
        );
        assert!(CollectorError::Decode("eof".to_string()).is_retryable());
        assert!(
            !CollectorError::UnexpectedPayload {
                query: "q".to_string(),
                message: "object".to_string()
            }
            .is_retryable()
        );
        assert!(!CollectorError::MissingSetting("API_TOKEN").is_retryable());
    }

    #[test]
    fn configuration_errors_are_classified() {
        assert!(CollectorError::MissingDimension("q".to_string()).is_configuration());
        assert!(!CollectorError::Http("refused".to_string()).is_configuration());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(CollectorError::MissingSetting("API_TOKEN").exit_code(), 2);
        assert_eq!(CollectorError::ConfigParse("bad".to_string()).exit_code(), 2);
        assert_eq!(
            CollectorError::UnexpectedPayload {
                query: "Consulta_1".to_string(),
                message: "body is an object".to_string()
            }
            .exit_code(),
            3
        );
        assert_eq!(
            CollectorError::Persistence {
                path: "data/Consulta_1.json".to_string(),
                message: "read-only".to_string()
            }
            .exit_code(),
            1
        );
        assert_eq!(CollectorError::Http("refused".to_string()).exit_code(), 1);
    }
}
