use super::ImageDescriber;
use crate::config::env_parse;
use crate::http::build_client_with_timeout;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub gateway_url: String,
    pub api_key: Option<String>,
    pub function_name: Option<String>,
    pub model: Option<String>,
    pub timeout: Duration,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            gateway_url: std::env::var("TENSORZERO_GATEWAY_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            api_key: std::env::var("TENSORZERO_API_KEY").ok(),
            function_name: std::env::var("TENSORZERO_FUNCTION").ok(),
            model: std::env::var("TENSORZERO_MODEL").ok(),
            timeout: env_parse::<u64>("VISION_TIMEOUT_SECS")
                .filter(|v| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(30)),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing gateway url")]
    MissingGateway,
    #[error("inference timed out after {0:?}")]
    Timeout(Duration),
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { url: String },
}

pub struct LlmClient {
    http: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            http: build_client_with_timeout(config.timeout),
            config,
        }
    }

    pub async fn chat(&self, messages: &[LlmMessage]) -> Result<String, LlmError> {
        let gateway = self.config.gateway_url.trim().trim_end_matches('/');
        if gateway.is_empty() {
            return Err(LlmError::MissingGateway);
        }

        let function_name = self
            .config
            .function_name
            .as_deref()
            .unwrap_or("product_vision");
        let model_name = self.config.model.as_deref();

        let body = ChatRequest {
            function_name: function_name.to_string(),
            model_name: model_name.map(|value| value.to_string()),
            input: ChatInput {
                messages: messages.to_vec(),
            },
        };

        let mut request = self.http.post(format!("{gateway}/inference")).json(&body);

        if let Some(key) = &self.config.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                LlmError::Timeout(self.config.timeout)
            } else {
                LlmError::Http(err.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(LlmError::Http(format!("HTTP {}", response.status())));
        }

        let payload: TensorZeroResponse = response
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;

        extract_text(payload)
    }
}

#[async_trait]
impl ImageDescriber for LlmClient {
    async fn describe(&self, image_url: &str, prompt: &str) -> Result<String, LlmError> {
        let message = LlmMessage {
            role: "user".into(),
            content: vec![
                ContentBlock::Text {
                    text: prompt.to_string(),
                },
                ContentBlock::Image {
                    url: image_url.to_string(),
                },
            ],
        };
        self.chat(&[message]).await
    }
}

fn extract_text(payload: TensorZeroResponse) -> Result<String, LlmError> {
    let text = payload
        .content
        .into_iter()
        .filter(|item| item.r#type == "text")
        .filter_map(|item| item.text)
        .collect::<Vec<_>>()
        .join("\n");
    if text.trim().is_empty() {
        return Err(LlmError::InvalidResponse("missing text".into()));
    }
    Ok(text)
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    function_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_name: Option<String>,
    input: ChatInput,
}

#[derive(Debug, Serialize)]
struct ChatInput {
    messages: Vec<LlmMessage>,
}

#[derive(Debug, Deserialize)]
struct TensorZeroResponse {
    content: Vec<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    r#type: String,
    #[serde(default)]
    text: Option<String>,
}
