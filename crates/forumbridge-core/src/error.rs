//! Error types shared by the bridge crates.
//!
//! Client failures ([`ApiError`]) are kept apart from configuration failures
//! ([`ConfigError`]) so the engine can decide per class whether to retry,
//! report to the operator, or abort startup.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by either network client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Quota exceeded; the request may be retried after the interval
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Interval requested by the server
        retry_after: Duration,
    },

    /// Server rejected the request
    #[error("request rejected ({code}): {description}")]
    Rejected {
        /// Status code reported by the server
        code: u16,
        /// Human-readable reason
        description: String,
    },

    /// Connection-level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Client has no live session
    #[error("client is not connected")]
    NotConnected,

    /// Media blob could not be fetched
    #[error("download failed: {0}")]
    Download(String),
}

impl ApiError {
    /// Classify a bot API error response.
    ///
    /// Code 429 with a `retry after N` description becomes
    /// [`ApiError::RateLimited`]; everything else is [`ApiError::Rejected`].
    pub fn from_response(code: u16, description: impl Into<String>) -> Self {
        let description = description.into();
        if code == 429
            && let Some(secs) = parse_retry_after(&description)
        {
            return Self::RateLimited { retry_after: Duration::from_secs(secs) };
        }
        Self::Rejected { code, description }
    }

    /// Whether retrying the same request can succeed.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

fn parse_retry_after(description: &str) -> Option<u64> {
    let lower = description.to_ascii_lowercase();
    let (_, rest) = lower.split_once("retry after")?;
    let digits: String =
        rest.trim_start().chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Errors loading or validating the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Path that was read
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// File is not valid TOML for the expected shape
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required key is missing or empty
    #[error("missing required config key `{0}`")]
    Missing(&'static str),

    /// A key has a value outside its allowed set
    #[error("invalid value for `{key}`: {reason}")]
    Invalid {
        /// Offending key
        key: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Transcoding failure. The caller falls back to the untranscoded payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("transcode failed: {0}")]
pub struct TranscodeError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_is_parsed_from_429() {
        let err = ApiError::from_response(429, "Too Many Requests: retry after 3");
        assert_eq!(err, ApiError::RateLimited { retry_after: Duration::from_secs(3) });
        assert!(err.is_rate_limit());
    }

    #[test]
    fn other_codes_are_rejections() {
        let err = ApiError::from_response(400, "Bad Request: message thread not found");
        assert!(matches!(err, ApiError::Rejected { code: 400, .. }));

        // 429 without an interval cannot be retried blindly
        let err = ApiError::from_response(429, "Too Many Requests");
        assert!(!err.is_rate_limit());
    }
}
