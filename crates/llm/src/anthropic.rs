use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use stockcheck_core::analysis::error::LlmError;
use stockcheck_core::analysis::port::LanguageModel;
use tracing::debug;

use crate::{map_status_error, map_transport_error};

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// # Summary
/// Anthropic Messages 协议客户端。
///
/// # Invariants
/// - 请求发往 `{base_url}/messages`，携带 `x-api-key` 与 `anthropic-version` 头。
/// - 响应中所有 text 块按顺序拼接为结果。
pub struct AnthropicModel {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<RequestMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

impl AnthropicModel {
    /// # Summary
    /// 创建客户端。
    ///
    /// # Arguments
    /// * `api_key`: Anthropic 密钥。
    /// * `model`: 模型名称，例如 `claude-3-sonnet-20240229`。
    /// * `base_url`: 自定义地址，None 时使用官方地址。
    /// * `temperature`: 采样温度。
    /// * `max_tokens`: 最大输出 token 数。
    /// * `timeout`: 单次请求超时。
    pub fn new(
        api_key: String,
        model: &str,
        base_url: Option<&str>,
        temperature: f32,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model: model.to_string(),
            base_url: base_url
                .unwrap_or(ANTHROPIC_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            temperature,
            max_tokens,
        })
    }
}

#[async_trait]
impl LanguageModel for AnthropicModel {
    fn model_id(&self) -> String {
        format!("anthropic/{}", self.model)
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let request = MessagesRequest {
            model: &self.model,
            system,
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!(model = %self.model, "Sending request to Anthropic API");
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, body));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let text = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        if text.trim().is_empty() {
            return Err(LlmError::InvalidResponse("empty completion".into()));
        }
        Ok(text)
    }
}
