use thiserror::Error;

#[derive(Debug, Error)]
pub enum NiroError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Astro API error: {0}")]
    Astro(String),

    #[error("Geocoding error: {0}")]
    Geo(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl NiroError {
    /// Returns `true` when the error is likely transient and worth retrying
    /// (e.g. HTTP 429/5xx, network timeouts, connection refused).
    pub fn is_transient(&self) -> bool {
        match self {
            // reqwest errors are almost always network-level / transient
            Self::Http(_) => true,
            // Check embedded error messages for transient HTTP status codes
            Self::Astro(msg) | Self::Llm(msg) | Self::Geo(msg) => is_transient_message(msg),
            _ => false,
        }
    }
}

fn is_transient_message(msg: &str) -> bool {
    let msg_lower = msg.to_lowercase();
    // HTTP status codes that are retryable
    for code in ["429", "500", "502", "503", "504"] {
        if msg_lower.contains(code) {
            return true;
        }
    }
    // Network-level transient patterns
    let patterns = [
        "timeout",
        "timed out",
        "connection refused",
        "connection reset",
        "broken pipe",
        "temporarily unavailable",
    ];
    patterns.iter().any(|p| msg_lower.contains(p))
}

pub type Result<T> = std::result::Result<T, NiroError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_429() {
        let err = NiroError::Llm("API error 429: rate limit exceeded".into());
        assert!(err.is_transient());
    }

    #[test]
    fn test_transient_503() {
        let err = NiroError::Astro("API error 503: service unavailable".into());
        assert!(err.is_transient());
    }

    #[test]
    fn test_transient_timeout() {
        let err = NiroError::Geo("connection timed out".into());
        assert!(err.is_transient());
    }

    #[test]
    fn test_permanent_401() {
        let err = NiroError::Llm("API error 401: unauthorized".into());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_permanent_config() {
        let err = NiroError::Config("missing API key".into());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_permanent_not_found() {
        let err = NiroError::NotFound("session xyz".into());
        assert!(!err.is_transient());
    }
}
