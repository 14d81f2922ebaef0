use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("pdf load error: {0}")]
    Load(String),

    #[error("embedding request failed: {0}")]
    Embedding(String),

    #[error("generation request failed: {0}")]
    Generation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl RagError {
    /// Only failures of the remote API calls are worth another attempt; a bad
    /// document or a bad request will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Embedding(_) | Self::Generation(_))
    }
}

impl From<url::ParseError> for RagError {
    fn from(error: url::ParseError) -> Self {
        Self::InvalidConfig(format!("invalid base url: {error}"))
    }
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::RagError;

    #[test]
    fn only_remote_failures_are_retryable() {
        assert!(RagError::Embedding("rate limited".to_string()).is_retryable());
        assert!(RagError::Generation("timeout".to_string()).is_retryable());
        assert!(!RagError::Load("not a pdf".to_string()).is_retryable());
        assert!(!RagError::InvalidArgument("empty".to_string()).is_retryable());
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!RagError::from(io).is_retryable());
    }

    #[test]
    fn messages_carry_the_failure_description() {
        let error = RagError::Embedding("401 Unauthorized".to_string());
        assert_eq!(error.to_string(), "embedding request failed: 401 Unauthorized");
    }
}
