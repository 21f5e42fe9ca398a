//! Client for the narrative engine's AI server.
//!
//! Endpoints:
//! - `POST /tokens/count_tokens/` `{text}` → `{token_count}`
//! - `POST /tokens/count_tokens_batch/` `{texts}` → `{token_counts}`
//! - `POST /summarize_chunk/` and `POST /deep_summarize_chunk/`
//!   `{chunk, max_tokens, previous_summary}` → `{summary}`
//!
//! The server owns the model, so its token counts are exact. A failed count
//! is reported as an error, never replaced by an estimate.

use crate::prompts;
use async_trait::async_trait;
use chronicle_core::{ProviderError, Summarizer, SummaryKind, SummaryRequest, Tokenizer};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub struct AiServerClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl AiServerClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "AI server rejected the credentials".into(),
            ));
        }

        if !(200..300).contains(&status) {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, path, body = %error_body, "AI server returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: status,
            message: format!("Failed to parse response: {e}"),
        })
    }
}

#[derive(Serialize)]
struct CountRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct CountResponse {
    token_count: usize,
}

#[derive(Serialize)]
struct CountBatchRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct CountBatchResponse {
    token_counts: Vec<usize>,
}

#[derive(Debug, Serialize)]
struct SummarizeRequest {
    chunk: Vec<String>,
    max_tokens: usize,
    previous_summary: Option<String>,
}

#[derive(Deserialize)]
struct SummarizeResponse {
    summary: String,
}

impl SummarizeRequest {
    /// Chunk requests carry raw history and let the server add its own
    /// instructions; deep requests carry the full compression prompt.
    fn from_request(request: SummaryRequest) -> (&'static str, Self) {
        match request.kind {
            SummaryKind::Chunk => (
                "/summarize_chunk/",
                Self {
                    chunk: vec![request.text],
                    max_tokens: request.target_tokens,
                    previous_summary: request.previous_summary,
                },
            ),
            SummaryKind::Deep => (
                "/deep_summarize_chunk/",
                Self {
                    chunk: vec![prompts::render(&request)],
                    max_tokens: request.target_tokens,
                    previous_summary: None,
                },
            ),
        }
    }
}

#[async_trait]
impl Tokenizer for AiServerClient {
    fn name(&self) -> &str {
        "ai_server"
    }

    async fn count(&self, text: &str) -> Result<usize, ProviderError> {
        let response: CountResponse = self
            .post("/tokens/count_tokens/", &CountRequest { text })
            .await?;
        Ok(response.token_count)
    }

    async fn count_batch(&self, texts: &[String]) -> Result<Vec<usize>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let response: CountBatchResponse = self
            .post("/tokens/count_tokens_batch/", &CountBatchRequest { texts })
            .await?;
        if response.token_counts.len() != texts.len() {
            return Err(ProviderError::ApiError {
                status_code: 200,
                message: format!(
                    "Expected {} token counts, got {}",
                    texts.len(),
                    response.token_counts.len()
                ),
            });
        }
        Ok(response.token_counts)
    }
}

#[async_trait]
impl Summarizer for AiServerClient {
    fn name(&self) -> &str {
        "ai_server"
    }

    async fn summarize(&self, request: SummaryRequest) -> Result<String, ProviderError> {
        let (path, body) = SummarizeRequest::from_request(request);
        debug!(path, max_tokens = body.max_tokens, "Sending summarize request");
        let response: SummarizeResponse = self.post(path, &body).await?;
        Ok(response.summary.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve_once;

    #[test]
    fn trailing_slash_trimmed() {
        let client = AiServerClient::new("http://localhost:8000/", None).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[test]
    fn deep_request_carries_full_prompt() {
        let (path, body) = SummarizeRequest::from_request(
            SummaryRequest::deep("one\n\n---\n\ntwo", 300)
                .with_previous_summary(Some("ignored".into())),
        );
        assert_eq!(path, "/deep_summarize_chunk/");
        assert!(body.chunk[0].starts_with("Compress these story summaries"));
        assert!(body.previous_summary.is_none());
    }

    #[tokio::test]
    async fn batch_count_roundtrip() {
        let (url, server) = serve_once(200, r#"{"token_counts":[3,5]}"#).await;
        let client = AiServerClient::new(url, Some("secret".into())).unwrap();
        let counts = client
            .count_batch(&["a b c".to_string(), "d e f g h".to_string()])
            .await
            .unwrap();
        assert_eq!(counts, vec![3, 5]);

        let captured = server.await.unwrap();
        assert!(captured.request_line.starts_with("POST /tokens/count_tokens_batch/"));
        assert!(captured.headers.contains("authorization: bearer secret"));
        assert_eq!(captured.body["texts"][1], "d e f g h");
    }

    #[tokio::test]
    async fn mismatched_batch_is_error() {
        let (url, _server) = serve_once(200, r#"{"token_counts":[3]}"#).await;
        let client = AiServerClient::new(url, None).unwrap();
        let err = client
            .count_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { .. }));
    }

    #[tokio::test]
    async fn chunk_summary_sends_previous_summary() {
        let (url, server) = serve_once(200, r#"{"summary":"  The gate fell.  "}"#).await;
        let client = AiServerClient::new(url, None).unwrap();
        let summary = client
            .summarize(
                SummaryRequest::chunk("They stormed the gate.", 50)
                    .with_previous_summary(Some("They reached the castle.".into())),
            )
            .await
            .unwrap();
        assert_eq!(summary, "The gate fell.");

        let captured = server.await.unwrap();
        assert!(captured.request_line.starts_with("POST /summarize_chunk/"));
        assert_eq!(captured.body["max_tokens"], 50);
        assert_eq!(captured.body["previous_summary"], "They reached the castle.");
        assert_eq!(captured.body["chunk"][0], "They stormed the gate.");
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_failure() {
        let (url, _server) = serve_once(401, r#"{"detail":"bad token"}"#).await;
        let client = AiServerClient::new(url, Some("stale".into())).unwrap();
        let err = client.count("text").await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn server_error_surfaces_status() {
        let (url, _server) = serve_once(500, r#"{"detail":"cuda oom"}"#).await;
        let client = AiServerClient::new(url, None).unwrap();
        match client.count("text").await.unwrap_err() {
            ProviderError::ApiError { status_code, message } => {
                assert_eq!(status_code, 500);
                assert!(message.contains("cuda oom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
