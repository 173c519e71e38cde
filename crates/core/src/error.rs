use serde::{Deserialize, Serialize};

/// Message used when neither the error body nor the status line says
/// anything useful.
pub const GENERIC_FAILURE_MESSAGE: &str = "Request failed";

/// Uniform, user-facing description of a failed request.
///
/// Produced by the REST client regardless of how well the backend follows
/// the `{message, code?, details?}` error body contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            details: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Build a record from a non-2xx response.
    ///
    /// Tries the JSON error body first, then the status text, then the
    /// generic failure message.
    pub fn from_response(body: &str, status_text: Option<&str>) -> Self {
        #[derive(Deserialize)]
        struct Body {
            message: Option<String>,
            code: Option<String>,
            details: Option<serde_json::Value>,
        }

        let parsed = serde_json::from_str::<Body>(body).ok();
        let (message, code, details) = match parsed {
            Some(b) => (b.message, b.code, b.details),
            None => (None, None, None),
        };

        let message = message
            .filter(|m| !m.trim().is_empty())
            .or_else(|| {
                status_text
                    .filter(|s| !s.trim().is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string());

        Self {
            message,
            code,
            details,
        }
    }
}

/// Errors raised while resolving configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a valid {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conforming_body_is_used() {
        let record = ErrorRecord::from_response(
            r#"{"message":"title is required","code":"VALIDATION","details":{"field":"title"}}"#,
            Some("Bad Request"),
        );
        assert_eq!(record.message, "title is required");
        assert_eq!(record.code.as_deref(), Some("VALIDATION"));
        assert_eq!(record.details.unwrap()["field"], "title");
    }

    #[test]
    fn body_without_message_falls_back_to_status_text() {
        let record = ErrorRecord::from_response(r#"{"code":"X"}"#, Some("Not Found"));
        assert_eq!(record.message, "Not Found");
        assert_eq!(record.code.as_deref(), Some("X"));
    }

    #[test]
    fn unparseable_body_falls_back_to_status_text() {
        let record = ErrorRecord::from_response("<html>oops</html>", Some("Bad Gateway"));
        assert_eq!(record.message, "Bad Gateway");
        assert!(record.code.is_none());
    }

    #[test]
    fn nothing_usable_gives_generic_message() {
        let record = ErrorRecord::from_response("", None);
        assert_eq!(record.message, GENERIC_FAILURE_MESSAGE);
    }
}
