use axum::Json;
use axum::extract::State;

use crate::server::AppState;
use crate::types::HealthResponse;

/// 健康检查
#[utoipa::path(
    get,
    path = "/health",
    tag = "系统 (System)",
    responses(
        (status = 200, description = "服务存活", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        scheduler_enabled: state.config.scheduler.enabled,
        scheduler_running: state.scheduler.is_running(),
        llm_provider: state.config.llm.provider.to_string(),
        llm_configured: state.config.llm.is_configured(),
    })
}
