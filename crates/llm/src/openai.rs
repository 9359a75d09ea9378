use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use stockcheck_core::analysis::error::LlmError;
use stockcheck_core::analysis::port::LanguageModel;
use stockcheck_core::config::LlmProvider;
use tracing::debug;

use crate::{map_status_error, map_transport_error};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const LOCAL_API_BASE: &str = "http://localhost:11434/v1";

/// # Summary
/// OpenAI Chat Completions 协议客户端，同时用于兼容该协议的本地模型 (如 Ollama)。
///
/// # Invariants
/// - `base_url` 包含版本前缀 (例如 `https://api.openai.com/v1`)，请求发往 `{base_url}/chat/completions`。
/// - 本地模式下 `api_key` 可以为空，此时不发送认证头。
pub struct OpenAiCompatibleModel {
    client: Client,
    provider: LlmProvider,
    api_key: Option<String>,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl OpenAiCompatibleModel {
    /// # Summary
    /// 创建客户端。
    ///
    /// # Arguments
    /// * `provider`: `OpenAi` 或 `Local`，决定默认地址与 `model_id` 前缀。
    /// * `api_key`: 密钥。
    /// * `model`: 模型名称。
    /// * `base_url`: 自定义地址，None 时使用提供方默认值。
    /// * `temperature`: 采样温度。
    /// * `max_tokens`: 最大输出 token 数。
    /// * `timeout`: 单次请求超时。
    pub fn new(
        provider: LlmProvider,
        api_key: Option<String>,
        model: &str,
        base_url: Option<&str>,
        temperature: f32,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let default_base = match provider {
            LlmProvider::Local => LOCAL_API_BASE,
            _ => OPENAI_API_BASE,
        };
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            provider,
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.to_string(),
            base_url: base_url
                .unwrap_or(default_base)
                .trim_end_matches('/')
                .to_string(),
            temperature,
            max_tokens,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    fn model_id(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!(model = %self.model, "Sending chat completion request");
        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("empty completion".into()))
    }
}
