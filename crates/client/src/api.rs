//! REST API client for the `/notes` endpoints.
//!
//! Every call runs through one retry loop: each attempt is bounded by the
//! policy timeout, transient failures (network, timeout, 502/503/504) are
//! retried with doubling delays, and the caller's [`CancellationToken`]
//! aborts both in-flight attempts and pending backoff sleeps.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode, Url};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use notekeep_core::backoff::RetryPolicy;
use notekeep_core::error::ErrorRecord;
use notekeep_core::query::NoteQuery;
use notekeep_core::types::{Note, NoteDraft, NotePatch, Paginated};

use crate::error::{ClientBuildError, ClientError};

/// Operations the store needs from the backend.
///
/// Implemented by [`ApiClient`] for real traffic and by in-memory fakes in
/// tests.
#[async_trait]
pub trait NotesApi: Send + Sync {
    /// `GET /notes` with the query serialized as URL parameters.
    async fn list(
        &self,
        query: &NoteQuery,
        cancel: &CancellationToken,
    ) -> Result<Paginated<Note>, ClientError>;

    /// `GET /notes/{id}`.
    async fn get(&self, id: &str, cancel: &CancellationToken) -> Result<Note, ClientError>;

    /// `POST /notes`.
    async fn create(
        &self,
        draft: &NoteDraft,
        cancel: &CancellationToken,
    ) -> Result<Note, ClientError>;

    /// `PUT /notes/{id}`.
    async fn replace(
        &self,
        id: &str,
        note: &NoteDraft,
        cancel: &CancellationToken,
    ) -> Result<Note, ClientError>;

    /// `PATCH /notes/{id}`.
    async fn patch(
        &self,
        id: &str,
        patch: &NotePatch,
        cancel: &CancellationToken,
    ) -> Result<Note, ClientError>;

    /// `DELETE /notes/{id}`.
    async fn remove(&self, id: &str, cancel: &CancellationToken) -> Result<(), ClientError>;
}

/// HTTP client for the notes backend.
pub struct ApiClient {
    client: reqwest::Client,
    base: Url,
    policy: RetryPolicy,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// * `base_url` - Resolved API base, e.g. `https://notes.example.com`.
    pub fn new(base_url: &str) -> Result<Self, ClientBuildError> {
        Self::with_client(reqwest::Client::builder().build()?, base_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, ClientBuildError> {
        let invalid = |reason: String| ClientBuildError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason,
        };

        let base = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {:?}", base.scheme())));
        }
        if base.cannot_be_a_base() {
            return Err(invalid("URL cannot carry a path".into()));
        }

        Ok(Self {
            client,
            base,
            policy: RetryPolicy::default(),
        })
    }

    /// Replace the default timeout/retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    // ---- private helpers ----

    /// Build an endpoint URL from path segments. Each segment is
    /// percent-encoded, so note ids can never escape their path position.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // Checked in the constructor: the base can carry a path.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Run a request through the retry loop and decode the body.
    ///
    /// Returns `Ok(None)` for 204 or an empty body.
    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        query: &[(&'static str, String)],
        body: Option<serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, ClientError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            tracing::debug!(%method, %url, attempt, "Sending request");

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                result = tokio::time::timeout(
                    self.policy.timeout,
                    self.send_once(&method, &url, query, body.as_ref()),
                ) => result.unwrap_or_else(|_| Err(ClientError::Timeout(self.policy.timeout))),
            };

            let error = match outcome {
                Ok(text) => return decode_body(&text),
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };

            let Some(delay) = self.policy.delay_after(attempt) else {
                tracing::error!(
                    %method,
                    %url,
                    attempts = attempt,
                    error = %error,
                    "Request failed after all retries",
                );
                return Err(error);
            };

            tracing::warn!(
                %method,
                %url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Request attempt failed, retrying",
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Execute a single attempt and return the raw body of a 2xx response.
    async fn send_once(
        &self,
        method: &Method,
        url: &Url,
        query: &[(&'static str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<String, ClientError> {
        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header(ACCEPT, "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(ClientError::from_transport)?;
        let status = response.status();
        let text = response.text().await.map_err(ClientError::from_transport)?;

        if !status.is_success() {
            let record = ErrorRecord::from_response(&text, status.canonical_reason());
            return Err(ClientError::http(status.as_u16(), record));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(String::new());
        }
        Ok(text)
    }
}

#[async_trait]
impl NotesApi for ApiClient {
    async fn list(
        &self,
        query: &NoteQuery,
        cancel: &CancellationToken,
    ) -> Result<Paginated<Note>, ClientError> {
        let url = self.endpoint(&["notes"]);
        let params = query.to_params();
        self.execute(Method::GET, url, &params, None, cancel)
            .await
            .and_then(require_body)
    }

    async fn get(&self, id: &str, cancel: &CancellationToken) -> Result<Note, ClientError> {
        let url = self.endpoint(&["notes", id]);
        self.execute(Method::GET, url, &[], None, cancel)
            .await
            .and_then(require_body)
    }

    async fn create(
        &self,
        draft: &NoteDraft,
        cancel: &CancellationToken,
    ) -> Result<Note, ClientError> {
        let url = self.endpoint(&["notes"]);
        self.execute(Method::POST, url, &[], Some(encode(draft)?), cancel)
            .await
            .and_then(require_body)
    }

    async fn replace(
        &self,
        id: &str,
        note: &NoteDraft,
        cancel: &CancellationToken,
    ) -> Result<Note, ClientError> {
        let url = self.endpoint(&["notes", id]);
        self.execute(Method::PUT, url, &[], Some(encode(note)?), cancel)
            .await
            .and_then(require_body)
    }

    async fn patch(
        &self,
        id: &str,
        patch: &NotePatch,
        cancel: &CancellationToken,
    ) -> Result<Note, ClientError> {
        let url = self.endpoint(&["notes", id]);
        self.execute(Method::PATCH, url, &[], Some(encode(patch)?), cancel)
            .await
            .and_then(require_body)
    }

    async fn remove(&self, id: &str, cancel: &CancellationToken) -> Result<(), ClientError> {
        let url = self.endpoint(&["notes", id]);
        self.execute::<IgnoredAny>(Method::DELETE, url, &[], None, cancel)
            .await
            .map(|_| ())
    }
}

fn encode<T: Serialize>(body: &T) -> Result<serde_json::Value, ClientError> {
    serde_json::to_value(body)
        .map_err(|e| ClientError::Parse(format!("failed to encode request body: {e}")))
}

fn decode_body<T: DeserializeOwned>(text: &str) -> Result<Option<T>, ClientError> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(text)
        .map(Some)
        .map_err(|e| ClientError::Parse(e.to_string()))
}

fn require_body<T>(body: Option<T>) -> Result<T, ClientError> {
    body.ok_or_else(|| ClientError::Parse("expected a JSON body, got none".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_segments_to_base_path() {
        let client = ApiClient::new("https://host.example/api/").unwrap();
        assert_eq!(
            client.endpoint(&["notes", "n-1"]).as_str(),
            "https://host.example/api/notes/n-1"
        );
    }

    #[test]
    fn endpoint_encodes_ids() {
        let client = ApiClient::new("https://host.example").unwrap();
        assert_eq!(
            client.endpoint(&["notes", "a/b c"]).as_str(),
            "https://host.example/notes/a%2Fb%20c"
        );
    }

    #[test]
    fn rejects_non_http_base() {
        assert!(ApiClient::new("ftp://host.example").is_err());
        assert!(ApiClient::new("not a url").is_err());
    }

    #[test]
    fn empty_body_decodes_to_none() {
        let decoded: Option<Note> = decode_body("  ").unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn malformed_body_is_parse_error() {
        let result: Result<Option<Note>, _> = decode_body("{not json");
        assert!(matches!(result, Err(ClientError::Parse(_))));
    }
}
