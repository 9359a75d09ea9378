use thiserror::Error;

/// # Summary
/// 组合存储错误枚举，处理持仓加载与快照读写失败。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// 远程持仓接口访问失败
    #[error("Network error: {0}")]
    Network(String),
    /// 持仓数据无法解析
    #[error("Parse error: {0}")]
    Parse(String),
    /// 持仓数据不满足约束
    #[error("Invalid holding: {0}")]
    Invalid(String),
    /// 未知或未分类的错误
    #[error("Unknown error: {0}")]
    Unknown(String),
}
