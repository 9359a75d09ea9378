//! # `stockcheck-llm` - 大模型客户端
//!
//! 为 `LanguageModel` 端口提供 OpenAI 兼容协议 (含本地 Ollama) 与 Anthropic Messages 协议的实现。

pub mod anthropic;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;
use stockcheck_core::analysis::error::LlmError;
use stockcheck_core::analysis::port::LanguageModel;
use stockcheck_core::config::{LlmConfig, LlmProvider};
use tracing::{info, warn};

use crate::anthropic::AnthropicModel;
use crate::openai::OpenAiCompatibleModel;

/// 将 reqwest 错误映射为领域错误
pub(crate) fn map_transport_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Network(e.to_string())
    }
}

/// 将非成功状态码映射为领域错误
pub(crate) fn map_status_error(status: reqwest::StatusCode, body: String) -> LlmError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return LlmError::RateLimited;
    }
    LlmError::Api {
        status: status.as_u16(),
        message: body,
    }
}

/// # Summary
/// 根据配置构建语言模型客户端。
///
/// # Logic
/// 1. `provider = none` 时返回 None，由分析引擎生成规则摘要。
/// 2. 选择了提供方但缺少密钥或地址时记录警告并返回 None。
/// 3. 否则构建对应协议的客户端。
///
/// # Arguments
/// * `config`: 大模型配置。
///
/// # Returns
/// 客户端或 None，HTTP 客户端构建失败时返回错误。
pub fn build_language_model(
    config: &LlmConfig,
) -> Result<Option<Arc<dyn LanguageModel>>, LlmError> {
    if config.provider == LlmProvider::None {
        info!("No language model configured, using rule-based summaries");
        return Ok(None);
    }
    if !config.is_configured() {
        warn!(provider = %config.provider, "Language model provider selected but credentials are missing");
        return Ok(None);
    }

    let timeout = Duration::from_secs(config.timeout_secs);
    let model: Arc<dyn LanguageModel> = match config.provider {
        LlmProvider::Anthropic => Arc::new(AnthropicModel::new(
            config.api_key.clone().unwrap_or_default(),
            &config.model,
            config.base_url.as_deref(),
            config.temperature,
            config.max_tokens,
            timeout,
        )?),
        LlmProvider::OpenAi | LlmProvider::Local => Arc::new(OpenAiCompatibleModel::new(
            config.provider,
            config.api_key.clone(),
            &config.model,
            config.base_url.as_deref(),
            config.temperature,
            config.max_tokens,
            timeout,
        )?),
        LlmProvider::None => return Ok(None),
    };

    info!(model = %model.model_id(), "Language model configured");
    Ok(Some(model))
}
