use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The credential expired before the request left the client.
    #[error("Session expired. Please login again.")]
    SessionExpired,
    /// The operation needs a signed-in identity and there is none.
    #[error("Not authenticated")]
    Unauthenticated,
    /// No response was received, or the response body could not be decoded.
    #[cfg(feature = "gateway")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with a failure status.
    #[error("API error: {0}")]
    Api(ApiError),
    /// The server answered successfully but declined the operation.
    #[error("Request rejected: {0}")]
    Rejected(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status of a failed response, if one was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api(api) => Some(api.status),
            _ => None,
        }
    }
}

/// Failure response as received from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ApiError {
    pub status: u16,
    pub message: Option<String>,
    /// Field-level validation messages (status 422), in server order.
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ApiError {
    #[must_use]
    pub fn new(status: u16, body: ErrorBody) -> Self {
        Self {
            status,
            message: body.message,
            errors: body.errors,
        }
    }

    #[must_use]
    pub fn is_validation(&self) -> bool {
        self.status == 422
    }

    /// Renders validation errors one field per line: `field: first, second`.
    #[must_use]
    pub fn validation_summary(&self) -> String {
        self.errors
            .iter()
            .map(|(field, messages)| format!("{field}: {}", messages.join(", ")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "status {}: {message}", self.status),
            None => write!(f, "status {}", self.status),
        }
    }
}

/// Conventional failure body: optional `message`, optional `errors` map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ErrorBody {
    /// Parses a failure body, tolerating empty or non-JSON payloads.
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Self {
        serde_json::from_slice(bytes).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_summary_joins_messages_per_field() {
        let body = ErrorBody::parse(
            br#"{"message":"invalid","errors":{"email":["is required","must be an email"],"name":["is required"]}}"#,
        );
        let err = ApiError::new(422, body);

        assert!(err.is_validation());
        assert_eq!(
            err.validation_summary(),
            "email: is required, must be an email\nname: is required"
        );
    }

    #[test]
    fn error_body_tolerates_garbage() {
        assert_eq!(ErrorBody::parse(b"<html>oops</html>"), ErrorBody::default());
        assert_eq!(ErrorBody::parse(b""), ErrorBody::default());
    }

    #[test]
    fn status_only_for_api_errors() {
        let err = Error::Api(ApiError::new(404, ErrorBody::default()));
        assert_eq!(err.status(), Some(404));
        assert_eq!(Error::SessionExpired.status(), None);
        assert_eq!(err.to_string(), "API error: status 404");
    }
}
