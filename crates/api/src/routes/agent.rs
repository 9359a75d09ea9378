//! # 分析路由控制器
//!
//! 实现 `/api/agent` 路径下的 REST 接口：发起分析，以及读取最近一次分析结果。
//! 所有读取接口只访问缓存，分析进行中也能立即返回上一份结果。

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{
    AgentStatusResponse, AnalyzeAcceptedResponse, AnalyzeRequest, ApiErrorResponse, ApiResponse,
    EarningsListResponse, EarningsResponse, FluctuationListResponse, FluctuationResponse,
    NarrativeResponse, NewsListResponse, NewsResponse,
};

/// 发起一次分析
///
/// 分析在后台执行，接口立即返回运行 ID。已有分析在运行时返回 409。
#[utoipa::path(
    post,
    path = "/api/agent/analyze",
    tag = "分析 (Agent)",
    request_body(content = AnalyzeRequest, description = "分析选项，可省略"),
    responses(
        (status = 202, description = "分析已受理", body = ApiResponse<AnalyzeAcceptedResponse>),
        (status = 409, description = "已有分析在运行", body = ApiErrorResponse)
    )
)]
pub async fn analyze(
    State(state): State<AppState>,
    body: Option<Json<AnalyzeRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<AnalyzeAcceptedResponse>>), ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let run_id = state.engine.spawn(request.into())?;
    tracing::info!(%run_id, "Analysis requested via API");

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::ok(AnalyzeAcceptedResponse {
            accepted: true,
            run_id: run_id.to_string(),
        })),
    ))
}

/// 查询分析运行状态
#[utoipa::path(
    get,
    path = "/api/agent/status",
    tag = "分析 (Agent)",
    responses(
        (status = 200, description = "当前运行状态", body = ApiResponse<AgentStatusResponse>)
    )
)]
pub async fn get_status(State(state): State<AppState>) -> Json<ApiResponse<AgentStatusResponse>> {
    let status = state.cache.status();
    let latest = state.cache.latest();
    let holdings_count = latest.as_ref().map_or(0, |r| r.holdings.len());

    Json(ApiResponse::ok(AgentStatusResponse::new(
        &status,
        latest.is_some(),
        holdings_count,
    )))
}

/// 获取最近一次的分析叙述
///
/// 尚未完成分析或叙述生成失败时 `data` 为 null。
#[utoipa::path(
    get,
    path = "/api/agent/summary",
    tag = "分析 (Agent)",
    responses(
        (status = 200, description = "最近一次的分析叙述", body = ApiResponse<NarrativeResponse>)
    )
)]
pub async fn get_summary(State(state): State<AppState>) -> Json<ApiResponse<NarrativeResponse>> {
    let narrative = state
        .cache
        .latest()
        .and_then(|r| r.narrative.as_ref().map(NarrativeResponse::from));

    match narrative {
        Some(n) => Json(ApiResponse::ok(n)),
        None => Json(ApiResponse::empty()),
    }
}

/// 获取最近一次的高波动告警
#[utoipa::path(
    get,
    path = "/api/agent/fluctuations",
    tag = "分析 (Agent)",
    responses(
        (status = 200, description = "按涨跌幅绝对值降序的告警列表", body = ApiResponse<FluctuationListResponse>)
    )
)]
pub async fn get_fluctuations(
    State(state): State<AppState>,
) -> Json<ApiResponse<FluctuationListResponse>> {
    let fluctuations: Vec<FluctuationResponse> = state
        .cache
        .latest()
        .map(|r| r.fluctuations.iter().map(Into::into).collect())
        .unwrap_or_default();

    Json(ApiResponse::ok(FluctuationListResponse {
        count: fluctuations.len(),
        fluctuations,
    }))
}

/// 获取最近一次分析中的近期财报
///
/// `days_until` 按读取时刻计算。
#[utoipa::path(
    get,
    path = "/api/agent/earnings",
    tag = "分析 (Agent)",
    responses(
        (status = 200, description = "按日期升序的财报列表", body = ApiResponse<EarningsListResponse>)
    )
)]
pub async fn get_earnings(State(state): State<AppState>) -> Json<ApiResponse<EarningsListResponse>> {
    let now = state.clock.now();
    let earnings: Vec<EarningsResponse> = state
        .cache
        .latest()
        .map(|r| {
            r.earnings
                .iter()
                .map(|e| EarningsResponse::new(e, now))
                .collect()
        })
        .unwrap_or_default();

    Json(ApiResponse::ok(EarningsListResponse {
        count: earnings.len(),
        earnings,
    }))
}

/// 获取最近一次分析中的新闻
#[utoipa::path(
    get,
    path = "/api/agent/news",
    tag = "分析 (Agent)",
    responses(
        (status = 200, description = "按发布时间倒序的新闻列表", body = ApiResponse<NewsListResponse>)
    )
)]
pub async fn get_news(State(state): State<AppState>) -> Json<ApiResponse<NewsListResponse>> {
    let news: Vec<NewsResponse> = state
        .cache
        .latest()
        .map(|r| r.news.iter().map(Into::into).collect())
        .unwrap_or_default();

    Json(ApiResponse::ok(NewsListResponse {
        count: news.len(),
        news,
    }))
}
