//! OpenAI-compatible chat summarizer.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM and any endpoint exposing
//! `/chat/completions`. The condensation prompt is sent as a single user
//! message with `max_tokens` set to the request's target.

use crate::prompts;
use async_trait::async_trait;
use chronicle_core::{ProviderError, Summarizer, SummaryRequest};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub struct OpenAiCompatSummarizer {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatSummarizer {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }

    /// Ollama on its default port. Ollama ignores the key.
    pub fn ollama(base_url: Option<&str>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new(base_url.unwrap_or("http://localhost:11434/v1"), "ollama", model)
    }

    fn to_api_request(&self, request: &SummaryRequest) -> ApiRequest {
        ApiRequest {
            model: self.model.clone(),
            messages: vec![ApiMessage {
                role: "user".into(),
                content: prompts::render(request),
            }],
            max_tokens: request.target_tokens,
            temperature: 0.3,
            stream: false,
        }
    }
}

#[async_trait]
impl Summarizer for OpenAiCompatSummarizer {
    fn name(&self) -> &str {
        "openai_compat"
    }

    async fn summarize(&self, request: SummaryRequest) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.to_api_request(&request);

        debug!(model = %self.model, kind = ?request.kind, "Sending summarize request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| ProviderError::EmptyResponse("No choices in response".into()))
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    max_tokens: usize,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve_once;

    #[test]
    fn ollama_constructor() {
        let summarizer = OpenAiCompatSummarizer::ollama(None, "llama3").unwrap();
        assert!(summarizer.base_url.contains("localhost:11434"));
        assert_eq!(summarizer.name(), "openai_compat");
    }

    #[test]
    fn request_uses_target_as_max_tokens() {
        let summarizer = OpenAiCompatSummarizer::new("http://x/v1/", "k", "m").unwrap();
        let body = summarizer.to_api_request(&SummaryRequest::chunk("The tower fell.", 64));
        assert_eq!(body.max_tokens, 64);
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].role, "user");
        assert!(body.messages[0].content.ends_with("The tower fell."));
        assert_eq!(summarizer.base_url, "http://x/v1");
    }

    #[test]
    fn missing_content_parses() {
        let parsed: ApiResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant"}}]}"#).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }

    #[tokio::test]
    async fn summary_is_first_choice() {
        let (url, server) = serve_once(
            200,
            r#"{"choices":[{"message":{"role":"assistant","content":"- The tower fell.\n"}}]}"#,
        )
        .await;
        let summarizer = OpenAiCompatSummarizer::new(url, "sk-test", "gpt-test").unwrap();
        let summary = summarizer
            .summarize(SummaryRequest::deep("a\n\n---\n\nb", 300))
            .await
            .unwrap();
        assert_eq!(summary, "- The tower fell.");

        let captured = server.await.unwrap();
        assert!(captured.request_line.starts_with("POST /chat/completions"));
        assert!(captured.headers.contains("authorization: bearer sk-test"));
        assert_eq!(captured.body["model"], "gpt-test");
        assert_eq!(captured.body["max_tokens"], 300);
    }

    #[tokio::test]
    async fn empty_choices_is_empty_response() {
        let (url, _server) = serve_once(200, r#"{"choices":[]}"#).await;
        let summarizer = OpenAiCompatSummarizer::new(url, "k", "m").unwrap();
        let err = summarizer
            .summarize(SummaryRequest::chunk("x", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse(_)));
    }

    #[tokio::test]
    async fn forbidden_is_auth_failure() {
        let (url, _server) = serve_once(403, "{}").await;
        let summarizer = OpenAiCompatSummarizer::new(url, "k", "m").unwrap();
        let err = summarizer
            .summarize(SummaryRequest::chunk("x", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    }
}
