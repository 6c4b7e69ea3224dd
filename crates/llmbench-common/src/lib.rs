use std::time::Duration;

pub mod config;
pub mod model;

pub type Result<T> = core::result::Result<T, BenchError>;

#[derive(thiserror::Error, Debug)]
pub enum BenchError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("no response received from model")]
    EmptyResponse,
    #[error("no backend configured for provider {0}")]
    UnknownProvider(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Message(String),
}

impl BenchError {
    /// True for errors the caller made, as opposed to backend or local failures.
    pub fn is_client_error(&self) -> bool {
        matches!(self, BenchError::InvalidRequest(_) | BenchError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_mistakes_are_client_errors() {
        assert!(BenchError::InvalidRequest("prompt".into()).is_client_error());
        assert!(BenchError::NotFound("run x".into()).is_client_error());
        assert!(!BenchError::Status { status: 404, body: "no model".into() }.is_client_error());
        assert!(!BenchError::EmptyResponse.is_client_error());
    }
}
