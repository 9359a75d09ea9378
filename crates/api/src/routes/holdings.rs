//! # 持仓路由控制器
//!
//! 实现 `/api/holdings` 路径下的 REST 接口。

use axum::Json;
use axum::extract::State;

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{ApiResponse, HoldingResponse, HoldingsListResponse, PerformanceResponse};

/// 列出配置的持仓
#[utoipa::path(
    get,
    path = "/api/holdings",
    tag = "持仓 (Holdings)",
    responses(
        (status = 200, description = "持仓列表", body = ApiResponse<HoldingsListResponse>),
        (status = 500, description = "组合存储不可用")
    )
)]
pub async fn list_holdings(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<HoldingsListResponse>>, ApiError> {
    let holdings: Vec<HoldingResponse> = state.store.holdings().await?.iter().map(Into::into).collect();

    Ok(Json(ApiResponse::ok(HoldingsListResponse {
        count: holdings.len(),
        holdings,
    })))
}

/// 获取最近一次分析得到的持仓表现
///
/// 只读取分析缓存，与 `/api/agent/status` 的 `last_analyzed` 来自同一次提交。
/// 尚未完成任何分析时返回空列表。
#[utoipa::path(
    get,
    path = "/api/holdings/performance",
    tag = "持仓 (Holdings)",
    responses(
        (status = 200, description = "持仓表现快照", body = ApiResponse<PerformanceResponse>)
    )
)]
pub async fn get_performance(State(state): State<AppState>) -> Json<ApiResponse<PerformanceResponse>> {
    let response = match state.cache.latest() {
        Some(result) => PerformanceResponse::from(result.as_ref()),
        None => PerformanceResponse::empty(),
    };
    Json(ApiResponse::ok(response))
}
