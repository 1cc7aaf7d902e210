//! Error kinds produced inside the fetch → normalize pipeline.
//!
//! None of these ever reach the presentation layer: adapters turn
//! [`NewsError::SourceUnavailable`] into an empty result set, and the normalizer
//! turns [`NewsError::MalformedResponse`] into the fallback mapping. Missing fields
//! on otherwise valid records are not errors at all; they get defaults.

/// Failure of one upstream call or one normalization attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NewsError {
    /// An adapter or model call failed (network, rate limit, timeout, missing key).
    #[error("source unavailable ({backend}): {message}")]
    SourceUnavailable { backend: String, message: String },

    /// Model output did not contain a decodable JSON array.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

pub type Result<T> = std::result::Result<T, NewsError>;

impl NewsError {
    pub fn unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// Short label used as a metrics/log tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_backend_and_message() {
        let e = NewsError::unavailable("brave", "HTTP 429");
        assert_eq!(e.to_string(), "source unavailable (brave): HTTP 429");
        assert_eq!(e.kind(), "source_unavailable");

        let m = NewsError::malformed("no JSON array found");
        assert!(m.to_string().contains("no JSON array"));
        assert_eq!(m.kind(), "malformed_response");
    }
}
