//! # 调度路由控制器
//!
//! 实现 `/api/scheduler` 路径下的 REST 接口。

use axum::Json;
use axum::extract::State;
use stockcheck_core::analysis::entity::AnalyzeOptions;

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{
    ApiErrorResponse, ApiResponse, IntervalRequest, SchedulerActionResponse,
    SchedulerStatusResponse,
};

fn action(state: &AppState, ok: bool, run_id: Option<String>) -> Json<ApiResponse<SchedulerActionResponse>> {
    Json(ApiResponse::ok(SchedulerActionResponse {
        ok,
        run_id,
        status: state.scheduler.status().into(),
    }))
}

/// 查询调度器状态
#[utoipa::path(
    get,
    path = "/api/scheduler/status",
    tag = "调度 (Scheduler)",
    responses(
        (status = 200, description = "调度器状态", body = ApiResponse<SchedulerStatusResponse>)
    )
)]
pub async fn get_status(State(state): State<AppState>) -> Json<ApiResponse<SchedulerStatusResponse>> {
    Json(ApiResponse::ok(state.scheduler.status().into()))
}

/// 启动定时分析
///
/// 已在运行时不做任何改变，`ok` 为 false。
#[utoipa::path(
    post,
    path = "/api/scheduler/start",
    tag = "调度 (Scheduler)",
    responses(
        (status = 200, description = "启动结果", body = ApiResponse<SchedulerActionResponse>)
    )
)]
pub async fn start(State(state): State<AppState>) -> Json<ApiResponse<SchedulerActionResponse>> {
    let ok = state.scheduler.start();
    action(&state, ok, None)
}

/// 停止定时分析
///
/// 进行中的分析不会被中断。
#[utoipa::path(
    post,
    path = "/api/scheduler/stop",
    tag = "调度 (Scheduler)",
    responses(
        (status = 200, description = "停止结果", body = ApiResponse<SchedulerActionResponse>)
    )
)]
pub async fn stop(State(state): State<AppState>) -> Json<ApiResponse<SchedulerActionResponse>> {
    let ok = state.scheduler.stop();
    action(&state, ok, None)
}

/// 立即触发一次分析
///
/// 不影响下一次定时运行的时间。
#[utoipa::path(
    post,
    path = "/api/scheduler/trigger",
    tag = "调度 (Scheduler)",
    responses(
        (status = 200, description = "已触发", body = ApiResponse<SchedulerActionResponse>),
        (status = 409, description = "已有分析在运行", body = ApiErrorResponse)
    )
)]
pub async fn trigger(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<SchedulerActionResponse>>, ApiError> {
    let run_id = state.scheduler.trigger(AnalyzeOptions::default())?;
    Ok(action(&state, true, Some(run_id.to_string())))
}

/// 修改定时间隔
///
/// 运行中的定时器会以新间隔重启。
#[utoipa::path(
    put,
    path = "/api/scheduler/interval",
    tag = "调度 (Scheduler)",
    request_body = IntervalRequest,
    responses(
        (status = 200, description = "间隔已更新", body = ApiResponse<SchedulerActionResponse>),
        (status = 400, description = "间隔非法", body = ApiErrorResponse)
    )
)]
pub async fn set_interval(
    State(state): State<AppState>,
    Json(req): Json<IntervalRequest>,
) -> Result<Json<ApiResponse<SchedulerActionResponse>>, ApiError> {
    state.scheduler.set_interval(req.interval_secs)?;
    Ok(action(&state, true, None))
}
