use crate::market::entity::{EarningsEvent, NewsItem};
use crate::portfolio::entity::PerformanceSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// # Summary
/// 价格波动方向。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// 涨跌幅严格大于 0 为上涨，其余为下跌
    pub fn from_change(change_percent: f64) -> Self {
        if change_percent > 0.0 {
            Direction::Up
        } else {
            Direction::Down
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// # Summary
/// 高波动告警，由涨跌幅绝对值达到阈值的 `PerformanceSnapshot` 派生。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluctuationAlert {
    pub symbol: String,
    pub name: String,
    pub change_percent: f64,
    pub change_amount: f64,
    pub direction: Direction,
    pub current_price: f64,
    pub previous_close: f64,
}

/// # Summary
/// 分析的叙述部分 (总结、洞察、建议、风险)。
///
/// # Invariants
/// - `model_used` 为 `"none"` 时表示由规则生成，否则为 `"<provider>/<model>"`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub summary: String,
    pub key_insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub risk_factors: Vec<String>,
    pub model_used: String,
    pub generated_at: DateTime<Utc>,
}

/// # Summary
/// 一次成功运行产生的完整分析结果。
///
/// # Invariants
/// - 缓存中只保留最新一份，不保留历史。
/// - 叙述生成失败时 `narrative` 为 None，其余字段照常填充。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub run_id: Uuid,
    pub narrative: Option<Narrative>,
    pub generated_at: DateTime<Utc>,
    pub holdings: Vec<PerformanceSnapshot>,
    pub fluctuations: Vec<FluctuationAlert>,
    pub earnings: Vec<EarningsEvent>,
    pub news: Vec<NewsItem>,
    pub total_value: f64,
}

/// # Summary
/// 全局唯一的分析运行状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// # Summary
/// 单次分析请求的选项。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzeOptions {
    // 绕过行情源的新鲜度缓存
    pub force_refresh: bool,
    pub include_news: bool,
    pub include_earnings: bool,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            force_refresh: false,
            include_news: true,
            include_earnings: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_from_change() {
        assert_eq!(Direction::from_change(7.0), Direction::Up);
        assert_eq!(Direction::from_change(-6.2), Direction::Down);
        assert_eq!(Direction::from_change(0.0), Direction::Down);
        assert_eq!(serde_json::to_string(&Direction::Up).unwrap(), "\"up\"");
    }

    #[test]
    fn test_analyze_options_partial_json() {
        let opts: AnalyzeOptions = serde_json::from_str(r#"{"force_refresh": true}"#).unwrap();
        assert!(opts.force_refresh);
        assert!(opts.include_news);
        assert!(opts.include_earnings);
    }
}
