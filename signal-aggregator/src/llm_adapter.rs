use crate::config::PipelineConfig;
use async_trait::async_trait;
use interfaces::{LanguageModelClient, LanguageModelError};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Builds the configured provider client, or `None` when no API key is set.
pub fn build_client(config: &PipelineConfig) -> Option<Arc<dyn LanguageModelClient>> {
    let api_key = config.api_key.as_deref()?;
    info!("Using language model {}", config.model);
    Some(Arc::new(GeminiClient::new(api_key, &config.model)))
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Google Generative Language `generateContent` client.
pub struct GeminiClient {
    api_key: String,
    model: String,
    http: reqwest::Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            base_url: GEMINI_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

fn is_quota_message(body: &str) -> bool {
    body.contains("RESOURCE_EXHAUSTED") || body.contains("Quota exceeded")
}

#[async_trait]
impl LanguageModelClient for GeminiClient {
    fn model_name(&self) -> String {
        self.model.clone()
    }

    async fn generate(&self, prompt: &str) -> Result<String, LanguageModelError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        debug!(model = %self.model, prompt_len = prompt.len(), "Gemini generate request");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LanguageModelError::Failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("Gemini API error ({}): {}", status, body);
            if status == StatusCode::TOO_MANY_REQUESTS || is_quota_message(&body) {
                return Err(LanguageModelError::RateLimited(message));
            }
            return Err(LanguageModelError::Failed(message));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LanguageModelError::Failed(format!("invalid Gemini response: {e}")))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(LanguageModelError::Failed("Gemini returned no text".to_string()));
        }
        Ok(text)
    }
}

/// Deterministic client returning canned text and recording every prompt.
///
/// Responses are served in order; the last one repeats once the list runs out.
pub struct MockLanguageModel {
    responses: Vec<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockLanguageModel {
    pub fn new(response: impl Into<String>) -> Self {
        Self::with_responses(vec![response.into()])
    }

    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts().len()
    }
}

#[async_trait]
impl LanguageModelClient for MockLanguageModel {
    fn model_name(&self) -> String {
        "mock".to_string()
    }

    async fn generate(&self, prompt: &str) -> Result<String, LanguageModelError> {
        let index = match self.prompts.lock() {
            Ok(mut prompts) => {
                prompts.push(prompt.to_string());
                prompts.len() - 1
            }
            Err(_) => 0,
        };

        self.responses
            .get(index)
            .or_else(|| self.responses.last())
            .cloned()
            .ok_or_else(|| LanguageModelError::Failed("mock has no responses".to_string()))
    }
}

/// Client that reports a rate limit a fixed number of times, then succeeds.
pub struct RateLimitedMock {
    failures_before_success: u32,
    response: String,
    calls: AtomicU32,
    call_times: Mutex<Vec<tokio::time::Instant>>,
}

impl RateLimitedMock {
    pub fn new(failures_before_success: u32, response: impl Into<String>) -> Self {
        Self {
            failures_before_success,
            response: response.into(),
            calls: AtomicU32::new(0),
            call_times: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The (tokio) instant of every call, in call order.
    pub fn call_times(&self) -> Vec<tokio::time::Instant> {
        self.call_times.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModelClient for RateLimitedMock {
    fn model_name(&self) -> String {
        "mock-rate-limited".to_string()
    }

    async fn generate(&self, _prompt: &str) -> Result<String, LanguageModelError> {
        if let Ok(mut times) = self.call_times.lock() {
            times.push(tokio::time::Instant::now());
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures_before_success {
            return Err(LanguageModelError::RateLimited(format!("429 Quota exceeded (call {call})")));
        }
        Ok(self.response.clone())
    }
}

/// Client that always fails with the given error.
pub struct FailingMock {
    error: LanguageModelError,
    calls: AtomicU32,
}

impl FailingMock {
    pub fn new(error: LanguageModelError) -> Self {
        Self {
            error,
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModelClient for FailingMock {
    fn model_name(&self) -> String {
        "mock-failing".to_string()
    }

    async fn generate(&self, _prompt: &str) -> Result<String, LanguageModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_bodies_are_recognised() {
        assert!(is_quota_message(r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#));
        assert!(is_quota_message("Quota exceeded for metric"));
        assert!(!is_quota_message(r#"{"error":{"status":"INVALID_ARGUMENT"}}"#));
        assert!(!is_quota_message(r#"{"error":{"message":"bad request 4291-ab"}}"#));
    }

    #[tokio::test]
    async fn mock_serves_responses_in_order_then_repeats() {
        let mock = MockLanguageModel::with_responses(vec!["one".to_string(), "two".to_string()]);
        assert_eq!(mock.generate("a").await.unwrap(), "one");
        assert_eq!(mock.generate("b").await.unwrap(), "two");
        assert_eq!(mock.generate("c").await.unwrap(), "two");
        assert_eq!(mock.prompts(), vec!["a", "b", "c"]);
    }

    #[test]
    fn no_api_key_means_no_client() {
        let config = PipelineConfig::default();
        assert!(build_client(&config).is_none());
    }
}
