use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 单个标的的实时报价。
///
/// # Invariants
/// - `price` 为正。
/// - `previous_close` 为行情源定义的参考价 (前一交易日收盘)，缺失时无法计算涨跌幅。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    // 股票代码
    pub symbol: String,
    // 简称 (例如: Apple Inc.)
    pub name: Option<String>,
    // 最新价
    pub price: f64,
    // 前收盘价
    pub previous_close: Option<f64>,
    // 当日最高
    pub day_high: Option<f64>,
    // 当日最低
    pub day_low: Option<f64>,
    // 当日成交量
    pub volume: Option<u64>,
    // 报价时间
    pub as_of: DateTime<Utc>,
}

/// # Summary
/// 即将到来的财报事件。
///
/// # Invariants
/// - 不存储距今天数，`days_until` 在读取时根据当前时间计算。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsEvent {
    pub symbol: String,
    pub name: String,
    // 财报发布日期
    pub earnings_date: DateTime<Utc>,
    // 每股收益一致预期
    pub eps_estimate: Option<f64>,
    // 营收一致预期
    pub revenue_estimate: Option<f64>,
}

impl EarningsEvent {
    /// # Summary
    /// 计算距离财报发布的整天数。
    ///
    /// # Arguments
    /// * `now`: 当前时间。
    ///
    /// # Returns
    /// 向零取整的天数，已过去的财报返回负数。
    pub fn days_until(&self, now: DateTime<Utc>) -> i64 {
        (self.earnings_date - now).num_days()
    }
}

/// # Summary
/// 与某个标的相关的新闻条目。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub symbol: String,
    pub publisher: String,
    pub title: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    pub thumbnail_url: Option<String>,
}
