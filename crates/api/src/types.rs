//! # DTO (Data Transfer Object) 层
//!
//! 将内部领域模型转化为面向前端 JSON 输出的轻量结构体。
//! 所有 DTO 必须派生 `utoipa::ToSchema` 以自动进入 Swagger 文档。
//! 金额、价格与百分比统一输出为两位小数的字符串。

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use stockcheck_analysis::state::RunStatus;
use stockcheck_core::analysis::entity::{
    AnalysisResult, AnalyzeOptions, FluctuationAlert, Narrative,
};
use stockcheck_core::market::entity::{EarningsEvent, NewsItem};
use stockcheck_core::portfolio::entity::{Holding, PerformanceSnapshot};
use stockcheck_scheduler::SchedulerState;
use utoipa::ToSchema;

/// 浮点数转两位小数字符串，非有限值输出 "0.00"
pub fn two_dp(value: f64) -> String {
    let mut d = Decimal::from_f64(value)
        .unwrap_or(Decimal::ZERO)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    d.rescale(2);
    d.to_string()
}

fn opt_two_dp(value: Option<f64>) -> Option<String> {
    value.map(two_dp)
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

// ============================================================
//  分析相关 DTO
// ============================================================

/// 发起分析请求，所有字段可省略
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct AnalyzeRequest {
    /// 绕过财报与新闻缓存
    #[schema(example = false)]
    pub force_refresh: bool,
    /// 是否拉取高波动标的的新闻
    #[schema(example = true)]
    pub include_news: bool,
    /// 是否拉取近期财报
    #[schema(example = true)]
    pub include_earnings: bool,
}

impl Default for AnalyzeRequest {
    fn default() -> Self {
        let options = AnalyzeOptions::default();
        Self {
            force_refresh: options.force_refresh,
            include_news: options.include_news,
            include_earnings: options.include_earnings,
        }
    }
}

impl From<AnalyzeRequest> for AnalyzeOptions {
    fn from(r: AnalyzeRequest) -> Self {
        Self {
            force_refresh: r.force_refresh,
            include_news: r.include_news,
            include_earnings: r.include_earnings,
        }
    }
}

/// 分析已受理
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnalyzeAcceptedResponse {
    #[schema(example = true)]
    pub accepted: bool,
    /// 本次运行 ID
    #[schema(example = "0f8fad5b-d9cb-469f-a165-70867728950e")]
    pub run_id: String,
}

/// 分析运行状态
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AgentStatusResponse {
    #[schema(example = false)]
    pub in_progress: bool,
    /// idle / running / succeeded / failed
    #[schema(example = "succeeded")]
    pub state: String,
    /// 是否有可读取的分析结果
    #[schema(example = true)]
    pub has_analysis: bool,
    #[schema(example = "2026-03-02T15:00:00+00:00")]
    pub last_analyzed: Option<String>,
    #[schema(example = 12)]
    pub holdings_count: usize,
    pub last_error: Option<String>,
    pub last_error_at: Option<String>,
}

impl AgentStatusResponse {
    pub fn new(status: &RunStatus, has_analysis: bool, holdings_count: usize) -> Self {
        Self {
            in_progress: status.in_progress(),
            state: status.state.to_string(),
            has_analysis,
            last_analyzed: status.last_analyzed.map(rfc3339),
            holdings_count,
            last_error: status.last_error.clone(),
            last_error_at: status.last_error_at.map(rfc3339),
        }
    }
}

/// 分析叙述
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NarrativeResponse {
    pub summary: String,
    pub key_insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub risk_factors: Vec<String>,
    /// 生成叙述的模型，规则生成时为 "none"
    #[schema(example = "anthropic/claude-3-sonnet-20240229")]
    pub model_used: String,
    pub generated_at: String,
}

impl From<&Narrative> for NarrativeResponse {
    fn from(n: &Narrative) -> Self {
        Self {
            summary: n.summary.clone(),
            key_insights: n.key_insights.clone(),
            recommendations: n.recommendations.clone(),
            risk_factors: n.risk_factors.clone(),
            model_used: n.model_used.clone(),
            generated_at: rfc3339(n.generated_at),
        }
    }
}

/// 高波动告警
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FluctuationResponse {
    #[schema(example = "AAPL")]
    pub symbol: String,
    #[schema(example = "Apple Inc.")]
    pub name: String,
    #[schema(example = "7.00")]
    pub change_percent: String,
    #[schema(example = "7.00")]
    pub change_amount: String,
    /// up / down
    #[schema(example = "up")]
    pub direction: String,
    #[schema(example = "107.00")]
    pub current_price: String,
    #[schema(example = "100.00")]
    pub previous_close: String,
}

impl From<&FluctuationAlert> for FluctuationResponse {
    fn from(f: &FluctuationAlert) -> Self {
        Self {
            symbol: f.symbol.clone(),
            name: f.name.clone(),
            change_percent: two_dp(f.change_percent),
            change_amount: two_dp(f.change_amount),
            direction: f.direction.to_string(),
            current_price: two_dp(f.current_price),
            previous_close: two_dp(f.previous_close),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FluctuationListResponse {
    pub fluctuations: Vec<FluctuationResponse>,
    pub count: usize,
}

/// 财报事件
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EarningsResponse {
    #[schema(example = "MSFT")]
    pub symbol: String,
    #[schema(example = "Microsoft Corporation")]
    pub name: String,
    #[schema(example = "2026-04-29T20:00:00+00:00")]
    pub earnings_date: String,
    /// 距今整天数，读取时计算
    #[schema(example = 5)]
    pub days_until: i64,
    #[schema(example = "3.21")]
    pub eps_estimate: Option<String>,
    pub revenue_estimate: Option<String>,
}

impl EarningsResponse {
    pub fn new(e: &EarningsEvent, now: DateTime<Utc>) -> Self {
        Self {
            symbol: e.symbol.clone(),
            name: e.name.clone(),
            earnings_date: rfc3339(e.earnings_date),
            days_until: e.days_until(now),
            eps_estimate: opt_two_dp(e.eps_estimate),
            revenue_estimate: opt_two_dp(e.revenue_estimate),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EarningsListResponse {
    pub earnings: Vec<EarningsResponse>,
    pub count: usize,
}

/// 新闻条目
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewsResponse {
    #[schema(example = "NVDA")]
    pub symbol: String,
    pub publisher: String,
    pub title: String,
    pub link: String,
    pub published_at: Option<String>,
    pub thumbnail_url: Option<String>,
}

impl From<&NewsItem> for NewsResponse {
    fn from(n: &NewsItem) -> Self {
        Self {
            symbol: n.symbol.clone(),
            publisher: n.publisher.clone(),
            title: n.title.clone(),
            link: n.link.clone(),
            published_at: n.published_at.map(rfc3339),
            thumbnail_url: n.thumbnail_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewsListResponse {
    pub news: Vec<NewsResponse>,
    pub count: usize,
}

// ============================================================
//  持仓相关 DTO
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HoldingResponse {
    #[schema(example = "AAPL")]
    pub symbol: String,
    #[schema(example = "10.00")]
    pub shares: String,
    pub name: Option<String>,
}

impl From<&Holding> for HoldingResponse {
    fn from(h: &Holding) -> Self {
        Self {
            symbol: h.symbol.clone(),
            shares: two_dp(h.shares),
            name: h.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HoldingsListResponse {
    pub holdings: Vec<HoldingResponse>,
    pub count: usize,
}

/// 单个持仓的表现，行情缺失时价格相关字段为 null
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SnapshotResponse {
    #[schema(example = "AAPL")]
    pub symbol: String,
    pub name: String,
    #[schema(example = "10.00")]
    pub shares: String,
    #[schema(example = "107.00")]
    pub current_price: Option<String>,
    #[schema(example = "100.00")]
    pub previous_close: Option<String>,
    #[schema(example = "7.00")]
    pub change_amount: Option<String>,
    #[schema(example = "7.00")]
    pub change_percent: Option<String>,
    pub day_high: Option<String>,
    pub day_low: Option<String>,
    pub volume: Option<u64>,
    #[schema(example = "1070.00")]
    pub market_value: Option<String>,
    pub is_high_fluctuation: bool,
}

impl From<&PerformanceSnapshot> for SnapshotResponse {
    fn from(s: &PerformanceSnapshot) -> Self {
        Self {
            symbol: s.symbol.clone(),
            name: s.name.clone(),
            shares: two_dp(s.shares),
            current_price: opt_two_dp(s.current_price),
            previous_close: opt_two_dp(s.previous_close),
            change_amount: opt_two_dp(s.change_amount),
            change_percent: opt_two_dp(s.change_percent),
            day_high: opt_two_dp(s.day_high),
            day_low: opt_two_dp(s.day_low),
            volume: s.volume,
            market_value: opt_two_dp(s.market_value),
            is_high_fluctuation: s.is_high_fluctuation,
        }
    }
}

/// 组合表现，尚无分析时为空
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PerformanceResponse {
    pub holdings: Vec<SnapshotResponse>,
    #[schema(example = "1258.00")]
    pub total_value: String,
    #[schema(example = 2)]
    pub high_fluctuation_count: usize,
    pub analyzed_at: Option<String>,
}

impl PerformanceResponse {
    pub fn empty() -> Self {
        Self {
            holdings: Vec::new(),
            total_value: two_dp(0.0),
            high_fluctuation_count: 0,
            analyzed_at: None,
        }
    }
}

/// 取自缓存中的同一份结果，持仓、总市值与分析时间总是来自同一次运行
impl From<&AnalysisResult> for PerformanceResponse {
    fn from(r: &AnalysisResult) -> Self {
        Self {
            holdings: r.holdings.iter().map(Into::into).collect(),
            total_value: two_dp(r.total_value),
            high_fluctuation_count: r.holdings.iter().filter(|h| h.is_high_fluctuation).count(),
            analyzed_at: Some(rfc3339(r.generated_at)),
        }
    }
}

// ============================================================
//  调度相关 DTO
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SchedulerStatusResponse {
    pub enabled: bool,
    pub running: bool,
    #[schema(example = 3600)]
    pub interval_secs: u64,
    pub last_run: Option<String>,
    pub next_run: Option<String>,
    pub tick_count: u64,
    pub skipped_ticks: u64,
}

impl From<SchedulerState> for SchedulerStatusResponse {
    fn from(s: SchedulerState) -> Self {
        Self {
            enabled: s.enabled,
            running: s.running,
            interval_secs: s.interval_secs,
            last_run: s.last_run.map(rfc3339),
            next_run: s.next_run.map(rfc3339),
            tick_count: s.tick_count,
            skipped_ticks: s.skipped_ticks,
        }
    }
}

/// 调度器操作结果
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SchedulerActionResponse {
    /// 操作是否改变了调度器状态
    pub ok: bool,
    /// 手动触发时的运行 ID
    pub run_id: Option<String>,
    pub status: SchedulerStatusResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IntervalRequest {
    #[schema(example = 1800)]
    pub interval_secs: u64,
}

// ============================================================
//  健康检查 DTO
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    pub scheduler_enabled: bool,
    pub scheduler_running: bool,
    #[schema(example = "anthropic")]
    pub llm_provider: String,
    pub llm_configured: bool,
}

// ============================================================
//  通用响应 DTO
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T: Serialize + ToSchema> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize + ToSchema> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// 成功但没有数据 (例如尚未完成任何分析)
    pub fn empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiErrorResponse {
    pub success: bool,
    /// 机器可读的错误码，如 busy / bad_request / internal
    #[schema(example = "busy")]
    pub code: String,
    pub error: String,
}

impl ApiErrorResponse {
    pub fn new(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            success: false,
            code: code.into(),
            error: msg.into(),
        }
    }
}
