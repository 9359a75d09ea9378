use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use stockcheck_analysis::engine::{AnalysisEngine, EngineSettings};
use stockcheck_analysis::state::AnalysisCache;
use stockcheck_api::server::{AppState, build_router};
use stockcheck_api::types::{
    AgentStatusResponse, AnalyzeAcceptedResponse, AnalyzeRequest, ApiErrorResponse, ApiResponse,
    FluctuationListResponse, HealthResponse, HoldingsListResponse, IntervalRequest,
    NarrativeResponse, PerformanceResponse, SchedulerActionResponse, SchedulerStatusResponse,
};
use stockcheck_core::common::time::FakeClockProvider;
use stockcheck_core::config::AppConfig;
use stockcheck_core::portfolio::entity::Holding;
use stockcheck_core::testing::ScriptedMarketData;
use stockcheck_scheduler::{AnalysisScheduler, SchedulerSettings};
use stockcheck_store::memory::MemoryPortfolioStore;
use tokio::net::TcpListener;

struct TestServer {
    base_url: String,
    market: Arc<ScriptedMarketData>,
}

// 帮助函数：在随机端口启动测试服务器
async fn spawn_test_server() -> TestServer {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let clock = Arc::new(FakeClockProvider::new(
        Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap(),
    ));
    let market = Arc::new(
        ScriptedMarketData::new()
            .with_quote("AAPL", 107.0, 100.0)
            .with_quote("MSFT", 402.0, 400.0)
            .with_quote("NVDA", 94.0, 100.0),
    );
    let store = Arc::new(
        MemoryPortfolioStore::new(vec![
            Holding::new("aapl", 10.0).with_name("Apple Inc."),
            Holding::new("MSFT", 5.0),
            Holding::new("NVDA", 2.0),
        ])
        .unwrap(),
    );
    let config = Arc::new(AppConfig::default());
    let cache = Arc::new(AnalysisCache::new(clock.clone()));
    let engine = AnalysisEngine::new(
        store.clone(),
        market.clone(),
        None,
        cache.clone(),
        clock.clone(),
        EngineSettings::from(&config.analysis),
    );
    let scheduler = AnalysisScheduler::new(
        engine.clone(),
        clock.clone(),
        SchedulerSettings::from(&config.scheduler),
    );

    let state = AppState {
        engine,
        cache,
        scheduler,
        store,
        clock,
        config,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let app = build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://127.0.0.1:{}", port),
        market,
    }
}

async fn wait_for_idle(client: &reqwest::Client, base_url: &str) -> AgentStatusResponse {
    for _ in 0..200 {
        let status: ApiResponse<AgentStatusResponse> = client
            .get(format!("{}/api/agent/status", base_url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let status = status.data.unwrap();
        if !status.in_progress {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("analysis did not finish in time");
}

#[tokio::test]
async fn test_reads_before_any_analysis() {
    let server = spawn_test_server().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    let health: HealthResponse = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.llm_provider, "none");
    assert!(!health.llm_configured);
    assert!(!health.scheduler_running);

    let holdings: ApiResponse<HoldingsListResponse> = client
        .get(format!("{}/api/holdings", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let holdings = holdings.data.unwrap();
    assert_eq!(holdings.count, 3);
    assert_eq!(holdings.holdings[0].symbol, "AAPL");
    assert_eq!(holdings.holdings[0].shares, "10.00");

    let status: ApiResponse<AgentStatusResponse> = client
        .get(format!("{}/api/agent/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let status = status.data.unwrap();
    assert!(!status.in_progress);
    assert!(!status.has_analysis);
    assert_eq!(status.state, "idle");
    assert!(status.last_analyzed.is_none());

    let summary: ApiResponse<NarrativeResponse> = client
        .get(format!("{}/api/agent/summary", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(summary.success);
    assert!(summary.data.is_none());

    let perf: ApiResponse<PerformanceResponse> = client
        .get(format!("{}/api/holdings/performance", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let perf = perf.data.unwrap();
    assert!(perf.holdings.is_empty());
    assert_eq!(perf.total_value, "0.00");
}

#[tokio::test]
async fn test_analyze_then_read_results() {
    let server = spawn_test_server().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    // 不带请求体，使用默认选项
    let res = client
        .post(format!("{}/api/agent/analyze", base))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let accepted: ApiResponse<AnalyzeAcceptedResponse> = res.json().await.unwrap();
    assert!(accepted.data.unwrap().accepted);

    let status = wait_for_idle(&client, base).await;
    assert_eq!(status.state, "succeeded");
    assert!(status.has_analysis);
    assert_eq!(status.holdings_count, 3);
    assert!(status.last_analyzed.is_some());

    let flucts: ApiResponse<FluctuationListResponse> = client
        .get(format!("{}/api/agent/fluctuations", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let flucts = flucts.data.unwrap();
    assert_eq!(flucts.count, 2);
    assert_eq!(flucts.fluctuations[0].symbol, "AAPL");
    assert_eq!(flucts.fluctuations[0].change_percent, "7.00");
    assert_eq!(flucts.fluctuations[0].direction, "up");
    assert_eq!(flucts.fluctuations[1].symbol, "NVDA");
    assert_eq!(flucts.fluctuations[1].change_percent, "-6.00");
    assert_eq!(flucts.fluctuations[1].direction, "down");

    let summary: ApiResponse<NarrativeResponse> = client
        .get(format!("{}/api/agent/summary", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary.data.unwrap().model_used, "none");

    let perf: ApiResponse<PerformanceResponse> = client
        .get(format!("{}/api/holdings/performance", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let perf = perf.data.unwrap();
    // 1070 + 2010 + 188
    assert_eq!(perf.total_value, "3268.00");
    assert_eq!(perf.high_fluctuation_count, 2);
    // 表现与状态来自同一次提交
    assert_eq!(perf.analyzed_at, status.last_analyzed);
    let aapl = perf.holdings.iter().find(|h| h.symbol == "AAPL").unwrap();
    assert_eq!(aapl.market_value.as_deref(), Some("1070.00"));
    assert_eq!(aapl.name, "Apple Inc.");
}

#[tokio::test]
async fn test_concurrent_analyze_is_busy() {
    let server = spawn_test_server().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;
    server.market.close_gate();

    let request = AnalyzeRequest {
        force_refresh: true,
        include_news: false,
        include_earnings: false,
    };
    let res = client
        .post(format!("{}/api/agent/analyze", base))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    let res = client
        .post(format!("{}/api/agent/analyze", base))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: ApiErrorResponse = res.json().await.unwrap();
    assert_eq!(body.code, "busy");
    assert!(!body.success);

    let res = client
        .post(format!("{}/api/scheduler/trigger", base))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let status: ApiResponse<AgentStatusResponse> = client
        .get(format!("{}/api/agent/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(status.data.unwrap().in_progress);

    server.market.open_gate();
    let status = wait_for_idle(&client, base).await;
    assert_eq!(status.state, "succeeded");
}

#[tokio::test]
async fn test_scheduler_controls() {
    let server = spawn_test_server().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    let res = client
        .post(format!("{}/api/scheduler/start", base))
        .send()
        .await
        .unwrap();
    let started: ApiResponse<SchedulerActionResponse> = res.json().await.unwrap();
    let started = started.data.unwrap();
    assert!(started.ok);
    assert!(started.status.running);
    assert!(started.status.next_run.is_some());

    let again: ApiResponse<SchedulerActionResponse> = client
        .post(format!("{}/api/scheduler/start", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!again.data.unwrap().ok);

    let res = client
        .put(format!("{}/api/scheduler/interval", base))
        .json(&IntervalRequest { interval_secs: 0 })
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .put(format!("{}/api/scheduler/interval", base))
        .json(&IntervalRequest { interval_secs: 1800 })
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let status: ApiResponse<SchedulerStatusResponse> = client
        .get(format!("{}/api/scheduler/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let status = status.data.unwrap();
    assert_eq!(status.interval_secs, 1800);
    assert!(status.running);

    let triggered: ApiResponse<SchedulerActionResponse> = client
        .post(format!("{}/api/scheduler/trigger", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let triggered = triggered.data.unwrap();
    assert!(triggered.ok);
    assert!(triggered.run_id.is_some());
    assert_eq!(triggered.status.next_run, status.next_run);

    let stopped: ApiResponse<SchedulerActionResponse> = client
        .post(format!("{}/api/scheduler/stop", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let stopped = stopped.data.unwrap();
    assert!(stopped.ok);
    assert!(!stopped.status.running);
    assert!(stopped.status.next_run.is_none());

    wait_for_idle(&client, base).await;
}

#[tokio::test]
async fn test_swagger_document_is_served() {
    let server = spawn_test_server().await;
    let client = reqwest::Client::new();

    let doc: serde_json::Value = client
        .get(format!("{}/api-docs/openapi.json", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let paths = doc["paths"].as_object().unwrap();
    assert!(paths.contains_key("/api/agent/analyze"));
    assert!(paths.contains_key("/api/scheduler/interval"));
    assert!(paths.contains_key("/health"));
}
