use thiserror::Error;

/// Failure of an embedding or LLM provider call.
///
/// The variant decides what the caller does next: transient failures and
/// [`ProviderError::Validation`] are retried, [`ProviderError::Auth`] aborts
/// the whole stage, everything else fails the current item only.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("bad request ({status}): {message}")]
    BadRequest { status: u16, message: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("output failed validation: {0}")]
    Validation(String),

    #[error("provider misconfigured: {0}")]
    Config(String),
}

impl ProviderError {
    /// Classify a non-success HTTP status and its body.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = truncate(body, 500);
        match status {
            401 | 403 => Self::Auth(message),
            408 => Self::Timeout(message),
            429 => Self::RateLimited(message),
            500..=599 => Self::Server { status, message },
            _ => Self::BadRequest { status, message },
        }
    }

    /// Rate limits, timeouts, connection failures and 5xx responses.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Timeout(_) | Self::Connection(_) | Self::Server { .. }
        )
    }

    /// Whether another attempt may succeed: transient errors plus output that
    /// failed schema validation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.is_transient() || matches!(self, Self::Validation(_))
    }

    /// Errors that no later item can recover from either.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Config(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_status(status.as_u16(), &e.to_string())
        } else {
            Self::Connection(e.to_string())
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(ProviderError::from_status(401, ""), ProviderError::Auth(_)));
        assert!(matches!(ProviderError::from_status(403, ""), ProviderError::Auth(_)));
        assert!(matches!(
            ProviderError::from_status(429, ""),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            ProviderError::from_status(503, ""),
            ProviderError::Server { status: 503, .. }
        ));
        assert!(matches!(
            ProviderError::from_status(400, ""),
            ProviderError::BadRequest { status: 400, .. }
        ));
    }

    #[test]
    fn transient_and_permanent_split() {
        assert!(ProviderError::RateLimited(String::new()).is_transient());
        assert!(ProviderError::Timeout(String::new()).is_transient());
        assert!(ProviderError::Connection(String::new()).is_transient());
        assert!(!ProviderError::Auth(String::new()).is_transient());
        assert!(!ProviderError::Auth(String::new()).is_retryable());
        assert!(ProviderError::Auth(String::new()).is_fatal());
        assert!(!ProviderError::InvalidResponse(String::new()).is_retryable());
    }

    #[test]
    fn validation_is_retryable_but_not_transient() {
        let err = ProviderError::Validation("bad category".to_string());
        assert!(err.is_retryable());
        assert!(!err.is_transient());
        assert!(!err.is_fatal());
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(2_000);
        let ProviderError::BadRequest { message, .. } = ProviderError::from_status(422, &body)
        else {
            panic!("expected BadRequest");
        };
        assert_eq!(message.chars().count(), 503);
    }
}
