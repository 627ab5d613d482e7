use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

/// Thin client for an OpenAI-style chat-completions endpoint.
///
/// One request per call, bounded by `LLM_TIMEOUT_SECS`, no retries at this
/// layer — callers decide whether a failure is worth retrying. Transport,
/// quota and malformed-response failures all surface as `LlmError`; the
/// distinction is logged for operators but never shown to end users.
#[derive(Debug, Clone)]
pub struct LlmProvider {
    config: LlmConfig,
    client: reqwest::Client,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm api key is not configured")]
    MissingApiKey,
    #[error("llm request timed out")]
    Timeout,
    #[error("llm network error: {0}")]
    Network(String),
    #[error("llm api error: status={status}, message={message}")]
    ApiError { status: u16, message: String },
    #[error("llm returned an empty completion")]
    EmptyResponse,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

impl LlmProvider {
    pub fn new(config: &LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config: config.clone(),
            client,
        }
    }

    /// Validate LLM configuration at startup.
    /// Panics when neither a mock nor an API key is available, since every
    /// session start would fail at the first completion call.
    pub fn validate_config(config: &LlmConfig) {
        if !config.mock && config.api_key.is_empty() {
            panic!(
                "Invalid LLM configuration: LLM_MOCK=false and OPENAI_API_KEY is empty. \
                 Set OPENAI_API_KEY or enable LLM_MOCK."
            );
        }
    }

    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, LlmError> {
        if self.config.mock {
            return Ok(mock_reply(&messages));
        }
        if self.config.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let url = format!(
            "{}/chat/completions",
            self.config.api_url.trim_end_matches('/')
        );
        let request = CompletionRequest {
            model: &self.config.model,
            messages: &messages,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message: extract_api_error(&body).unwrap_or(body),
            });
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if let Some(usage) = &body.usage {
            tracing::debug!(
                prompt_tokens = ?usage.prompt_tokens,
                completion_tokens = ?usage.completion_tokens,
                total_tokens = ?usage.total_tokens,
                "LLM usage"
            );
        }

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

/// Pull the human-readable message out of an OpenAI error body, if any.
fn extract_api_error(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

/// Canned replies for mock mode, shaped after the three tutor prompts so the
/// full session flow works without network access (dev and tests).
fn mock_reply(messages: &[ChatMessage]) -> String {
    let prompt = messages
        .last()
        .map(|m| m.content.as_str())
        .unwrap_or_default();

    if prompt.contains("extract the topic") {
        return serde_json::json!({ "topic": "Mock Topic" }).to_string();
    }
    if prompt.contains("questions about") {
        let questions: Vec<String> = (1..=crate::constants::QUESTIONS_PER_SESSION)
            .map(|i| format!("Mock question {i}?"))
            .collect();
        return serde_json::json!({ "questions": questions }).to_string();
    }
    if prompt.contains("review the answer") {
        return serde_json::json!({
            "score": 80,
            "review": "Mock review",
            "modelAnswer": "Mock model answer",
        })
        .to_string();
    }

    "Mock LLM response".to_string()
}
