use crate::market::entity::{EarningsEvent, NewsItem, Quote};
use crate::market::error::MarketError;
use async_trait::async_trait;

/// # Summary
/// 数据新鲜度策略，由分析请求的 `force_refresh` 透传而来。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    // 允许使用行情源内部的新鲜度缓存
    #[default]
    Cached,
    // 绕过并覆盖缓存
    Refresh,
}

impl FetchPolicy {
    pub fn from_force_refresh(force_refresh: bool) -> Self {
        if force_refresh {
            FetchPolicy::Refresh
        } else {
            FetchPolicy::Cached
        }
    }
}

/// # Summary
/// 市场数据网关接口 (外部协作方)。
///
/// # Invariants
/// - 每个方法只针对单个标的，失败不影响同批次的其它标的。
/// - 实现者必须是 `Send + Sync`，分析引擎会并发调用。
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// # Summary
    /// 获取最新报价与参考价。
    ///
    /// # Logic
    /// 1. 请求数据源的报价与近期日线。
    /// 2. 以前一交易日收盘作为参考价。
    ///
    /// # Arguments
    /// * `symbol`: 规范化后的证券代码。
    ///
    /// # Returns
    /// 成功返回 Quote，失败返回 MarketError。
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, MarketError>;

    /// # Summary
    /// 获取下一次财报日期及一致预期。
    ///
    /// # Arguments
    /// * `symbol`: 证券代码。
    /// * `policy`: 新鲜度策略。
    ///
    /// # Returns
    /// 数据源没有排期时返回 `Ok(None)`。
    async fn fetch_next_earnings(
        &self,
        symbol: &str,
        policy: FetchPolicy,
    ) -> Result<Option<EarningsEvent>, MarketError>;

    /// # Summary
    /// 获取最近的新闻。
    ///
    /// # Arguments
    /// * `symbol`: 证券代码。
    /// * `limit`: 最多返回条数。
    /// * `policy`: 新鲜度策略。
    ///
    /// # Returns
    /// 按数据源顺序返回不超过 `limit` 条新闻。
    async fn fetch_news(
        &self,
        symbol: &str,
        limit: usize,
        policy: FetchPolicy,
    ) -> Result<Vec<NewsItem>, MarketError>;
}
