use crate::analysis::error::LlmError;
use async_trait::async_trait;

/// # Summary
/// 文本生成接口，用于合成分析叙述。
///
/// # Invariants
/// - 实现类必须保证线程安全 (`Send` + `Sync`)。
/// - 调用失败不得影响分析运行本身，调用方负责降级。
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// # Summary
    /// 模型标识，写入 `Narrative::model_used`。
    ///
    /// # Returns
    /// 形如 `"anthropic/claude-3-sonnet-20240229"` 的字符串。
    fn model_id(&self) -> String;

    /// # Summary
    /// 发送一次补全请求。
    ///
    /// # Arguments
    /// * `system`: 系统提示词。
    /// * `prompt`: 用户提示词。
    ///
    /// # Returns
    /// 模型返回的纯文本。
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError>;
}
