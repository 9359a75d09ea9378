mod logging;
mod settings;

use std::sync::Arc;
use std::time::Duration;

use stockcheck_analysis::engine::{AnalysisEngine, EngineSettings};
use stockcheck_analysis::state::AnalysisCache;
use stockcheck_api::server::{AppState, start_server};
use stockcheck_cache::mem::MemCache;
use stockcheck_core::analysis::port::LanguageModel;
use stockcheck_core::common::time::{RealTimeProvider, TimeProvider};
use stockcheck_core::config::{AppConfig, PortfolioConfig};
use stockcheck_core::portfolio::entity::Holding;
use stockcheck_feed::cached::CachedProvider;
use stockcheck_feed::yahoo::YahooProvider;
use stockcheck_llm::build_language_model;
use stockcheck_scheduler::{AnalysisScheduler, SchedulerSettings};
use stockcheck_store::memory::MemoryPortfolioStore;
use stockcheck_store::remote::RemoteHoldingsSource;
use tracing::{debug, error, info, warn};

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
/// 负责实例化所有具体实现组件并通过 Arc<dyn Trait> 注入到分析引擎、调度器与 API。
///
/// # Logic
/// 1. 加载配置并初始化全局日志。
/// 2. 实例化基础设施层（行情、缓存、存储、大模型）。
/// 3. 构造分析引擎与调度器，按配置启动定时分析。
/// 4. 启动 HTTP 服务，收到 Ctrl-C 后优雅退出。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // reqwest 使用 rustls-no-provider，需要进程级安装加密实现
    let provider_installed = rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok();

    // 1. 配置与日志
    let config = Arc::new(settings::load()?);
    let _log_guard = logging::init(&config.logging)?;
    info!("StockCheck starting...");
    if !provider_installed {
        debug!("TLS crypto provider already installed");
    }

    // 2. 基础设施层
    let clock: Arc<dyn TimeProvider> = Arc::new(RealTimeProvider);
    let kv_cache = Arc::new(MemCache::with_clock(clock.clone()));
    let market = Arc::new(CachedProvider::new(
        Arc::new(YahooProvider::new()?),
        kv_cache,
        Duration::from_secs(config.analysis.earnings_cache_hours.saturating_mul(3600)),
        Duration::from_secs(config.analysis.news_cache_minutes.saturating_mul(60)),
    ));

    let holdings = load_holdings(&config.portfolio).await;
    let store = Arc::new(MemoryPortfolioStore::new(holdings)?);
    if store.is_empty() {
        warn!("No holdings configured, analysis runs will fail until holdings are provided");
    }

    let model = language_model(&config);

    // 3. 分析引擎与调度器
    let cache = Arc::new(AnalysisCache::new(clock.clone()));
    let engine = AnalysisEngine::new(
        store.clone(),
        market,
        model,
        cache.clone(),
        clock.clone(),
        EngineSettings::from(&config.analysis),
    );
    let scheduler = AnalysisScheduler::new(
        engine.clone(),
        clock.clone(),
        SchedulerSettings::from(&config.scheduler),
    );
    if config.scheduler.enabled {
        scheduler.start();
    } else {
        info!("Scheduler disabled by configuration");
    }

    // 4. HTTP 服务
    let state = AppState {
        engine,
        cache,
        scheduler: scheduler.clone(),
        store,
        clock,
        config: config.clone(),
    };
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    start_server(state, &bind_addr, shutdown_signal()).await?;

    scheduler.stop();
    info!("StockCheck stopped");
    Ok(())
}

/// # Summary
/// 确定启动时的持仓列表。
///
/// # Logic
/// 1. 未配置远程地址时直接使用配置中的持仓。
/// 2. 远程拉取失败或结果为空时记录警告并回退到配置中的持仓。
async fn load_holdings(config: &PortfolioConfig) -> Vec<Holding> {
    let Some(url) = config.holdings_url.as_deref().filter(|u| !u.trim().is_empty()) else {
        return config.holdings.clone();
    };

    let fetched = match RemoteHoldingsSource::new(url, config.holdings_auth_token.as_deref()) {
        Ok(source) => source.fetch().await,
        Err(e) => Err(e),
    };
    match fetched {
        Ok(holdings) if !holdings.is_empty() => holdings,
        Ok(_) => {
            warn!(url, "Remote holdings source returned no holdings, using configured holdings");
            config.holdings.clone()
        }
        Err(e) => {
            warn!(url, error = %e, "Failed to load remote holdings, using configured holdings");
            config.holdings.clone()
        }
    }
}

// 大模型客户端构建失败不影响启动，退化为规则摘要
fn language_model(config: &AppConfig) -> Option<Arc<dyn LanguageModel>> {
    match build_language_model(&config.llm) {
        Ok(model) => model,
        Err(e) => {
            warn!(error = %e, "Failed to build language model client, using rule-based summaries");
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // 无法监听信号时保持运行，由进程管理器终止
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received. Exiting...");
}
