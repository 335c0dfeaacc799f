use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tailor_core::error::AppError;
use tailor_core::traits::{Prompt, TextGenerator};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// OpenAI-compatible chat-completions client.
///
/// Works with any OpenAI-compatible API, including:
/// - OpenAI directly (`https://api.openai.com/v1`)
/// - Gemini via compatibility layer (`https://generativelanguage.googleapis.com/v1beta/openai`)
/// - A local server such as Ollama (`http://localhost:11434/v1`)
#[derive(Clone)]
pub struct OpenAiGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
    temperature: Option<f32>,
}

impl OpenAiGenerator {
    pub fn new(api_key: &str, model: &str) -> Result<Self, AppError> {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Result<Self, AppError> {
        Self::build(api_key, model, base_url, DEFAULT_LLM_TIMEOUT)
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self, AppError> {
        let temperature = self.temperature;
        let mut rebuilt = Self::build(&self.api_key, &self.model, &self.base_url, timeout)?;
        rebuilt.temperature = temperature;
        Ok(rebuilt)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build(
        api_key: &str,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(setup_error)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout_secs: timeout.as_secs(),
            temperature: None,
        })
    }

    fn request(&self, prompt: &Prompt) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: prompt.system.clone(),
                },
                Message {
                    role: "user".to_string(),
                    content: prompt.user.clone(),
                },
            ],
            temperature: self.temperature,
        }
    }
}

// ---- OpenAI API types ----

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// The HTTP client for the model backend could not be built.
fn setup_error(e: impl std::fmt::Display) -> AppError {
    AppError::ModelError {
        message: format!("HTTP client setup failed: {e}"),
        status_code: 0,
        retryable: false,
    }
}

/// Rate limits, timeouts, and server-side failures are worth one more try.
fn is_retryable_status(status_code: u16) -> bool {
    status_code == 408 || status_code == 429 || status_code >= 500
}

fn error_from_status(status_code: u16, body: &str) -> AppError {
    let message = serde_json::from_str::<ApiError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| format!("HTTP {}: {}", status_code, body));
    AppError::ModelError {
        message,
        status_code,
        retryable: is_retryable_status(status_code),
    }
}

fn content_from_body(body: &str) -> Result<String, AppError> {
    let chat_response: ChatResponse = serde_json::from_str(body).map_err(|e| AppError::ModelError {
        message: format!("Failed to parse LLM response: {e}"),
        status_code: 200,
        retryable: true,
    })?;

    chat_response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(AppError::empty_model_response)
}

impl TextGenerator for OpenAiGenerator {
    async fn complete(&self, prompt: &Prompt) -> Result<String, AppError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self.request(prompt);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::ModelError {
                        message: format!("No response within {}s", self.timeout_secs),
                        status_code: 408,
                        retryable: true,
                    }
                } else if e.is_connect() {
                    AppError::ModelError {
                        message: format!("Connection failed: {e}"),
                        status_code: 0,
                        retryable: true,
                    }
                } else {
                    AppError::ModelError {
                        message: e.to_string(),
                        status_code: 0,
                        retryable: false,
                    }
                }
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let err = error_from_status(status.as_u16(), &body);
            tracing::warn!(model = %self.model, error = %err, "Model request failed");
            return Err(err);
        }

        let content = content_from_body(&body)?;
        tracing::debug!(model = %self.model, chars = content.len(), "Model responded");
        Ok(content)
    }
}
