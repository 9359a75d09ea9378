use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 持仓配置实体，代表组合中跟踪的一个标的。
///
/// # Invariants
/// - `symbol` 为规范化后的大写代码。
/// - `shares` 必须大于 0。
/// - 进程启动时加载，运行期间不可变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    // 股票代码 (例如: AAPL)
    pub symbol: String,
    // 持有股数，允许碎股
    pub shares: f64,
    // 展示名称 (可选)，缺省时使用行情源返回的名称
    #[serde(default)]
    pub name: Option<String>,
}

impl Holding {
    /// 构造一个不带名称的持仓
    pub fn new(symbol: impl Into<String>, shares: f64) -> Self {
        Self {
            symbol: symbol.into(),
            shares,
            name: None,
        }
    }

    /// 设置展示名称
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// # Summary
    /// 校验持仓是否满足不变量。
    ///
    /// # Returns
    /// 合法返回 Ok，否则返回描述原因的字符串。
    pub fn validate(&self) -> Result<(), String> {
        if crate::common::normalize_symbol(&self.symbol).is_none() {
            return Err(format!("invalid symbol '{}'", self.symbol));
        }
        if self.shares.is_nan() || self.shares <= 0.0 {
            return Err(format!(
                "shares for {} must be greater than 0, got {}",
                self.symbol, self.shares
            ));
        }
        Ok(())
    }
}

/// # Summary
/// 单个持仓的表现快照，每次分析运行重新计算。
///
/// # Invariants
/// - 行情抓取失败时 `current_price`、`change_percent`、`market_value` 均为 None。
/// - `is_high_fluctuation` 为真时 `change_percent` 必然存在。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub symbol: String,
    pub name: String,
    pub shares: f64,
    pub current_price: Option<f64>,
    // 参考价 (前收盘)
    pub previous_close: Option<f64>,
    pub change_amount: Option<f64>,
    pub change_percent: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub volume: Option<u64>,
    // 持仓市值 = shares × current_price
    pub market_value: Option<f64>,
    pub is_high_fluctuation: bool,
}

impl PerformanceSnapshot {
    /// 构造一个行情缺失的快照
    pub fn unavailable(holding: &Holding) -> Self {
        Self {
            symbol: holding.symbol.clone(),
            name: holding.name.clone().unwrap_or_default(),
            shares: holding.shares,
            current_price: None,
            previous_close: None,
            change_amount: None,
            change_percent: None,
            day_high: None,
            day_low: None,
            volume: None,
            market_value: None,
            is_high_fluctuation: false,
        }
    }
}

/// # Summary
/// 一次分析得到的组合表现报告，由组合存储保留最近一份。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub holdings: Vec<PerformanceSnapshot>,
    // 所有有价格的持仓市值之和
    pub total_value: f64,
    pub high_fluctuation_count: usize,
    pub analyzed_at: DateTime<Utc>,
}

impl PerformanceReport {
    /// # Summary
    /// 由快照列表汇总出报告。
    ///
    /// # Logic
    /// 1. 对 `market_value` 非空的快照求和得到总市值。
    /// 2. 统计高波动标的数量。
    pub fn from_snapshots(holdings: Vec<PerformanceSnapshot>, analyzed_at: DateTime<Utc>) -> Self {
        let total_value = holdings.iter().filter_map(|h| h.market_value).sum();
        let high_fluctuation_count = holdings.iter().filter(|h| h.is_high_fluctuation).count();
        Self {
            holdings,
            total_value,
            high_fluctuation_count,
            analyzed_at,
        }
    }
}
