use std::time::Duration;

/// Typed errors at the model-provider boundary.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GatewayError {
    // Fatal
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    // Retryable
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::ServerError { .. }
                | Self::NetworkError(_)
                | Self::StreamInterrupted(_)
        )
    }

    pub fn suggested_delay(&self) -> Option<Duration> {
        if let Self::RateLimited { retry_after } = self {
            *retry_after
        } else {
            None
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ModelNotFound(_) => "model_not_found",
            Self::MalformedResponse(_) => "malformed_response",
            Self::RateLimited { .. } => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::NetworkError(_) => "network_error",
            Self::StreamInterrupted(_) => "stream_interrupted",
        }
    }

    /// Classify an HTTP status code. `retry_after` is the parsed
    /// `Retry-After` header, if the response carried one.
    pub fn from_status(status: u16, body: String, retry_after: Option<Duration>) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            404 => Self::ModelNotFound(body),
            400 | 422 => Self::InvalidRequest(body),
            429 => Self::RateLimited { retry_after },
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(GatewayError::RateLimited { retry_after: None }.is_retryable());
        assert!(GatewayError::ServerError { status: 503, body: "busy".into() }.is_retryable());
        assert!(GatewayError::NetworkError("reset".into()).is_retryable());
        assert!(GatewayError::StreamInterrupted("eof".into()).is_retryable());

        assert!(!GatewayError::AuthenticationFailed("bad key".into()).is_retryable());
        assert!(!GatewayError::MalformedResponse("not json".into()).is_retryable());
        assert!(!GatewayError::ModelNotFound("gpt-x".into()).is_retryable());
    }

    #[test]
    fn from_status_mapping() {
        assert!(matches!(
            GatewayError::from_status(401, "no".into(), None),
            GatewayError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            GatewayError::from_status(404, "missing".into(), None),
            GatewayError::ModelNotFound(_)
        ));
        assert!(matches!(
            GatewayError::from_status(400, "bad".into(), None),
            GatewayError::InvalidRequest(_)
        ));
        assert!(GatewayError::from_status(502, "gateway".into(), None).is_retryable());
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let err = GatewayError::from_status(429, String::new(), Some(Duration::from_secs(7)));
        assert_eq!(err.suggested_delay(), Some(Duration::from_secs(7)));
        assert_eq!(err.error_kind(), "rate_limited");
    }
}
