//! # API 服务启动器
//!
//! 组装 axum 路由、挂载 Swagger UI、配置 CORS 并绑定 TCP 端口对外提供服务。
//! 本模块不直接启动 `main()`, 而是由 `crates/app` 组装依赖后调用。

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_swagger_ui::SwaggerUi;

use stockcheck_analysis::engine::AnalysisEngine;
use stockcheck_analysis::state::AnalysisCache;
use stockcheck_core::common::time::TimeProvider;
use stockcheck_core::config::AppConfig;
use stockcheck_core::portfolio::port::PortfolioStore;
use stockcheck_scheduler::AnalysisScheduler;

use crate::routes::{agent, health, holdings, scheduler};

// ============================================================
//  共享应用状态
// ============================================================

/// 全局应用状态，通过 axum 的 `State` 提取器注入到每个 Handler 中。
///
/// # Invariants
/// - 所有字段在服务启动前由 `crates/app` 注入，生命周期与进程等同。
/// - Handler 只读取缓存或委托给引擎/调度器，不会等待一次分析完成。
#[derive(Clone)]
pub struct AppState {
    /// 分析引擎
    pub engine: Arc<AnalysisEngine>,
    /// 最近一次分析结果与运行状态
    pub cache: Arc<AnalysisCache>,
    /// 定时调度器
    pub scheduler: Arc<AnalysisScheduler>,
    /// 组合存储
    pub store: Arc<dyn PortfolioStore>,
    /// 时间源 (财报倒计时按读取时刻计算)
    pub clock: Arc<dyn TimeProvider>,
    /// 启动配置
    pub config: Arc<AppConfig>,
}

// ============================================================
//  OpenAPI 文档定义
// ============================================================

/// 全局 OpenAPI 文档结构
#[derive(OpenApi)]
#[openapi(
    info(
        title = "StockCheck 组合分析 API",
        version = "0.1.0",
        description = "组合分析服务的 RESTful API。提供分析触发、分析结果查询、持仓表现与定时调度管理。",
        license(name = "MIT")
    ),
    tags(
        (name = "分析 (Agent)", description = "发起分析与读取最近一次分析结果"),
        (name = "持仓 (Holdings)", description = "持仓列表与最近一次表现快照"),
        (name = "调度 (Scheduler)", description = "定时分析的启停、手动触发与间隔设置"),
        (name = "系统 (System)", description = "健康检查")
    )
)]
pub struct ApiDoc;

// ============================================================
//  服务构建与启动
// ============================================================

/// 构建完整的 axum 应用路由树 (含 Swagger UI 与 CORS)。
///
/// # Arguments
/// * `state` - 由外部注入的共享状态
pub fn build_router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .routes(routes!(agent::analyze))
        .routes(routes!(agent::get_status))
        .routes(routes!(agent::get_summary))
        .routes(routes!(agent::get_fluctuations))
        .routes(routes!(agent::get_earnings))
        .routes(routes!(agent::get_news))
        .routes(routes!(holdings::list_holdings))
        .routes(routes!(holdings::get_performance))
        .routes(routes!(scheduler::get_status))
        .routes(routes!(scheduler::start))
        .routes(routes!(scheduler::stop))
        .routes(routes!(scheduler::trigger))
        .routes(routes!(scheduler::set_interval))
        .routes(routes!(health::health))
        .with_state(state)
        .split_for_parts();

    // 允许所有来源，前端看板可直接轮询
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        .layer(cors)
}

/// 绑定端口并启动 HTTP 服务，`shutdown` 完成后优雅退出。
///
/// # Arguments
/// * `state` - 共享状态
/// * `bind_addr` - 监听的地址与端口，如 `"0.0.0.0:8000"`
/// * `shutdown` - 关闭信号
pub async fn start_server(
    state: AppState,
    bind_addr: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let app = build_router(state);

    tracing::info!("StockCheck API listening on {}", bind_addr);
    tracing::info!("Swagger UI: http://{}/swagger-ui/", bind_addr);

    let listener = TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
