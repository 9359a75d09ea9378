use crate::portfolio::error::StoreError;
use thiserror::Error;

/// # Summary
/// 运行级错误。单个标的的数据错误不会出现在这里。
///
/// # Invariants
/// - `Busy` 表示 "稍后重试"，与真正的失败区分开。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    // 已有分析在运行
    #[error("Analysis already in progress")]
    Busy,
    // 组合中没有任何持仓
    #[error("No holdings configured")]
    NoHoldings,
    // 所有报价请求都因网络错误失败
    #[error("Market data gateway unreachable: {0}")]
    GatewayUnreachable(String),
    // 超过最大运行时长
    #[error("Analysis timed out after {0}s")]
    TimedOut(u64),
    // 运行任务在提交结果前被丢弃
    #[error("Analysis aborted before completion")]
    Aborted,
    #[error("Portfolio store error: {0}")]
    Store(#[from] StoreError),
}

/// # Summary
/// 语言模型调用错误。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    // 未配置提供方或缺少密钥
    #[error("Language model not configured")]
    NotConfigured,
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out")]
    Timeout,
    // 429
    #[error("Rate limited")]
    RateLimited,
    // 提供方返回非成功状态码
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    // 响应结构无法解析或内容为空
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_compare_through_analysis_error() {
        let err: AnalysisError = StoreError::Network("HTTP 503".into()).into();
        assert_eq!(err, AnalysisError::Store(StoreError::Network("HTTP 503".into())));
        assert_ne!(err, AnalysisError::Store(StoreError::Parse("HTTP 503".into())));
        assert_ne!(err, AnalysisError::Busy);
    }
}
