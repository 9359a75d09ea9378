use super::entity::{Holding, PerformanceReport};
use super::error::StoreError;
use async_trait::async_trait;
use std::sync::Arc;

/// # Summary
/// 组合存储接口，持有配置的持仓和最近一次计算的表现快照。
///
/// # Invariants
/// - 持仓列表在进程生命周期内不变。
/// - 只保留最近一份表现报告，不保留历史。
#[async_trait]
pub trait PortfolioStore: Send + Sync {
    /// # Summary
    /// 获取所有配置的持仓。
    ///
    /// # Returns
    /// 成功返回持仓列表 (可能为空)。
    async fn holdings(&self) -> Result<Vec<Holding>, StoreError>;

    /// # Summary
    /// 用新的表现报告替换旧报告。
    ///
    /// # Arguments
    /// * `report`: 最新一次分析得到的报告。
    async fn save_performance(&self, report: PerformanceReport) -> Result<(), StoreError>;

    /// # Summary
    /// 读取最近一次保存的表现报告。
    ///
    /// # Returns
    /// 尚未完成任何分析时返回 None。
    async fn latest_performance(&self) -> Result<Option<Arc<PerformanceReport>>, StoreError>;
}
