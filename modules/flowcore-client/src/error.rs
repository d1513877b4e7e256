use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlowcoreError>;

#[derive(Debug, Error)]
pub enum FlowcoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Failed to resolve data core \"{name}\": {reason}")]
    DataCoreResolution { name: String, reason: String },

    #[error("Safety check failed: {0}")]
    SafetyCheck(String),
}

impl FlowcoreError {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            FlowcoreError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Network failures and 5xx answers are worth another attempt.
    /// Auth and request-shape rejections never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            FlowcoreError::Network(_) => true,
            FlowcoreError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for FlowcoreError {
    fn from(err: reqwest::Error) -> Self {
        FlowcoreError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for FlowcoreError {
    fn from(err: serde_json::Error) -> Self {
        FlowcoreError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        let err = FlowcoreError::Api {
            status: 503,
            message: "unavailable".into(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn auth_errors_are_not_retryable() {
        for status in [401, 403, 422] {
            let err = FlowcoreError::Api {
                status,
                message: String::new(),
            };
            assert!(!err.is_retryable(), "status {status} should not retry");
        }
        assert!(!FlowcoreError::Parse("bad".into()).is_retryable());
    }
}
