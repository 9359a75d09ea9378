use crate::narrative::{self, NarrativeInput};
use crate::performance::{build_snapshot, fluctuation_alerts};
use crate::state::{AnalysisCache, RunPermit};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use stockcheck_core::analysis::entity::{AnalysisResult, AnalyzeOptions, FluctuationAlert};
use stockcheck_core::analysis::error::AnalysisError;
use stockcheck_core::analysis::port::LanguageModel;
use stockcheck_core::common::time::TimeProvider;
use stockcheck_core::config::AnalysisConfig;
use stockcheck_core::market::entity::{EarningsEvent, NewsItem, Quote};
use stockcheck_core::market::error::MarketError;
use stockcheck_core::market::port::{FetchPolicy, MarketDataProvider};
use stockcheck_core::portfolio::entity::{Holding, PerformanceReport, PerformanceSnapshot};
use stockcheck_core::portfolio::port::PortfolioStore;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// # Summary
/// 分析引擎的运行参数。
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub fluctuation_threshold: f64,
    pub earnings_lookahead_days: i64,
    pub news_per_symbol: usize,
    pub max_concurrency: usize,
    pub max_run: Duration,
}

impl From<&AnalysisConfig> for EngineSettings {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            fluctuation_threshold: config.fluctuation_threshold,
            earnings_lookahead_days: config.earnings_lookahead_days,
            news_per_symbol: config.news_per_symbol,
            max_concurrency: config.max_concurrency.max(1),
            max_run: Duration::from_secs(config.max_run_secs),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&AnalysisConfig::default())
    }
}

/// # Summary
/// 分析引擎，定时任务与手动触发共用的唯一入口。
///
/// # Invariants
/// - 每次运行都先从 `AnalysisCache` 获取 `RunPermit`，因此任意时刻至多一个运行。
/// - 单个标的的行情失败只影响该标的的快照。
/// - 超过 `max_run` 的运行被判定失败并释放运行槽位。
pub struct AnalysisEngine {
    store: Arc<dyn PortfolioStore>,
    market: Arc<dyn MarketDataProvider>,
    model: Option<Arc<dyn LanguageModel>>,
    cache: Arc<AnalysisCache>,
    clock: Arc<dyn TimeProvider>,
    settings: EngineSettings,
}

impl AnalysisEngine {
    /// # Summary
    /// 创建分析引擎。
    ///
    /// # Arguments
    /// * `store`: 组合存储。
    /// * `market`: 行情源。
    /// * `model`: 可选的大模型，None 时生成规则摘要。
    /// * `cache`: 结果缓存与状态机。
    /// * `clock`: 时间源。
    /// * `settings`: 运行参数。
    pub fn new(
        store: Arc<dyn PortfolioStore>,
        market: Arc<dyn MarketDataProvider>,
        model: Option<Arc<dyn LanguageModel>>,
        cache: Arc<AnalysisCache>,
        clock: Arc<dyn TimeProvider>,
        settings: EngineSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            market,
            model,
            cache,
            clock,
            settings,
        })
    }

    pub fn cache(&self) -> &Arc<AnalysisCache> {
        &self.cache
    }

    /// # Summary
    /// 执行一次分析并等待完成。
    ///
    /// # Returns
    /// 成功返回已提交到缓存的结果；已有运行时返回 `AnalysisError::Busy`。
    pub async fn run(&self, options: AnalyzeOptions) -> Result<Arc<AnalysisResult>, AnalysisError> {
        let permit = self.cache.try_begin()?;
        self.execute(permit, options).await
    }

    /// # Summary
    /// 在后台启动一次分析。
    ///
    /// # Logic
    /// 1. 同步获取运行许可，调用方能立即区分 "已接受" 与 "忙"。
    /// 2. 将运行放入独立任务，调用方无需等待。
    ///
    /// # Returns
    /// 成功返回运行 ID。
    pub fn spawn(self: &Arc<Self>, options: AnalyzeOptions) -> Result<Uuid, AnalysisError> {
        let permit = self.cache.try_begin()?;
        let run_id = permit.run_id();
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            // 结果与错误都已写入缓存
            if let Err(e) = engine.execute(permit, options).await {
                debug!(error = %e, "Background analysis ended without a result");
            }
        });
        Ok(run_id)
    }

    /// # Summary
    /// 在超时保护下执行分析流水线并提交结果。
    async fn execute(
        &self,
        permit: RunPermit,
        options: AnalyzeOptions,
    ) -> Result<Arc<AnalysisResult>, AnalysisError> {
        let run_id = permit.run_id();
        let span = info_span!("analysis_run", %run_id);

        async move {
            info!(
                force_refresh = options.force_refresh,
                include_news = options.include_news,
                include_earnings = options.include_earnings,
                "Analysis started"
            );

            let outcome = tokio::time::timeout(self.settings.max_run, self.pipeline(options)).await;
            let mut result = match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    error!(error = %e, "Analysis failed");
                    permit.fail(&e);
                    return Err(e);
                }
                Err(_) => {
                    let e = AnalysisError::TimedOut(self.settings.max_run.as_secs());
                    error!(error = %e, "Analysis failed");
                    permit.fail(&e);
                    return Err(e);
                }
            };

            // 持有许可期间保存快照，后一次运行的快照不会被前一次覆盖
            result.generated_at = permit.commit_stamp(result.generated_at);
            let report =
                PerformanceReport::from_snapshots(result.holdings.clone(), result.generated_at);
            match tokio::time::timeout(self.settings.max_run, self.store.save_performance(report))
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Failed to save performance snapshot"),
                Err(_) => warn!("Saving performance snapshot timed out"),
            }
            let committed = permit.succeed(result);

            info!(
                holdings = committed.holdings.len(),
                fluctuations = committed.fluctuations.len(),
                earnings = committed.earnings.len(),
                news = committed.news.len(),
                narrative = committed.narrative.is_some(),
                "Analysis completed"
            );
            Ok(committed)
        }
        .instrument(span)
        .await
    }

    /// # Summary
    /// 分析流水线。
    ///
    /// # Logic
    /// 1. 读取持仓，为空则失败。
    /// 2. 并发 (有上限) 获取报价并计算快照；所有报价都因网络错误失败时判定行情源不可达。
    /// 3. 提取高波动告警。
    /// 4. 按需获取所有标的的近期财报与高波动标的的新闻。
    /// 5. 生成叙述 (尽力而为)。
    async fn pipeline(&self, options: AnalyzeOptions) -> Result<AnalysisResult, AnalysisError> {
        let holdings = self.store.holdings().await?;
        if holdings.is_empty() {
            return Err(AnalysisError::NoHoldings);
        }
        let policy = FetchPolicy::from_force_refresh(options.force_refresh);

        let quotes = self.fetch_quotes(&holdings).await;
        if let Some(reason) = unreachable_reason(&quotes) {
            return Err(AnalysisError::GatewayUnreachable(reason));
        }

        let threshold = self.settings.fluctuation_threshold;
        let snapshots: Vec<PerformanceSnapshot> = holdings
            .iter()
            .zip(quotes.iter())
            .map(|(holding, quote)| match quote {
                Ok(quote) => build_snapshot(holding, quote, threshold),
                Err(e) => {
                    warn!(symbol = %holding.symbol, error = %e, "Quote unavailable");
                    PerformanceSnapshot::unavailable(holding)
                }
            })
            .collect();

        let fluctuations = fluctuation_alerts(&snapshots);

        let earnings = if options.include_earnings {
            self.fetch_earnings(&holdings, policy).await
        } else {
            Vec::new()
        };

        let news = if options.include_news {
            self.fetch_news(&fluctuations, policy).await
        } else {
            Vec::new()
        };

        let now = self.clock.now();
        let total_value = snapshots.iter().filter_map(|s| s.market_value).sum();
        let narrative = narrative::synthesize(
            self.model.as_deref(),
            NarrativeInput {
                holdings: &snapshots,
                fluctuations: &fluctuations,
                earnings: &earnings,
                news: &news,
                threshold,
                lookahead_days: self.settings.earnings_lookahead_days,
                now,
            },
        )
        .await;

        Ok(AnalysisResult {
            // 提交时由 RunPermit 覆盖
            run_id: Uuid::nil(),
            narrative,
            generated_at: now,
            holdings: snapshots,
            fluctuations,
            earnings,
            news,
            total_value,
        })
    }

    /// 按持仓顺序返回每个标的的报价结果
    async fn fetch_quotes(&self, holdings: &[Holding]) -> Vec<Result<Quote, MarketError>> {
        // 流中只放拥有所有权的代码，后台任务的 Future 才能满足 Send
        let symbols: Vec<String> = holdings.iter().map(|h| h.symbol.clone()).collect();
        stream::iter(symbols)
            .map(|symbol| async move { self.market.fetch_quote(&symbol).await })
            .buffered(self.settings.max_concurrency)
            .collect()
            .await
    }

    /// # Summary
    /// 获取所有标的在前瞻窗口内的财报。
    ///
    /// # Logic
    /// 1. 并发查询每个标的的下一次财报。
    /// 2. 只保留 0..=lookahead 天内的事件，按日期升序排列。
    async fn fetch_earnings(&self, holdings: &[Holding], policy: FetchPolicy) -> Vec<EarningsEvent> {
        let results: Vec<(Holding, _)> = stream::iter(holdings.to_vec())
            .map(|holding| async move {
                let result = self
                    .market
                    .fetch_next_earnings(&holding.symbol, policy)
                    .await;
                (holding, result)
            })
            .buffered(self.settings.max_concurrency)
            .collect()
            .await;

        let now = self.clock.now();
        let lookahead = self.settings.earnings_lookahead_days;
        let mut events: Vec<EarningsEvent> = results
            .into_iter()
            .filter_map(|(holding, result)| match result {
                Ok(event) => event,
                Err(e) => {
                    warn!(symbol = %holding.symbol, error = %e, "Earnings unavailable");
                    None
                }
            })
            .filter(|event| (0..=lookahead).contains(&event.days_until(now)))
            .collect();

        events.sort_by_key(|e| e.earnings_date);
        events
    }

    /// # Summary
    /// 获取高波动标的的新闻。
    ///
    /// # Logic
    /// 1. 只查询高波动标的，每个标的至多 `news_per_symbol` 条。
    /// 2. 合并后按发布时间倒序排列，缺少时间的排在最后。
    async fn fetch_news(&self, alerts: &[FluctuationAlert], policy: FetchPolicy) -> Vec<NewsItem> {
        if alerts.is_empty() {
            return Vec::new();
        }
        let limit = self.settings.news_per_symbol;

        let results: Vec<(FluctuationAlert, _)> = stream::iter(alerts.to_vec())
            .map(|alert| async move {
                let result = self.market.fetch_news(&alert.symbol, limit, policy).await;
                (alert, result)
            })
            .buffered(self.settings.max_concurrency)
            .collect()
            .await;

        let mut news: Vec<NewsItem> = results
            .into_iter()
            .flat_map(|(alert, result)| match result {
                Ok(items) => items.into_iter().take(limit).collect(),
                Err(e) => {
                    warn!(symbol = %alert.symbol, error = %e, "News unavailable");
                    Vec::new()
                }
            })
            .collect();

        news.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        news
    }
}

/// 所有报价都因网络错误失败时返回第一条错误信息
fn unreachable_reason(quotes: &[Result<Quote, MarketError>]) -> Option<String> {
    let all_network = !quotes.is_empty()
        && quotes
            .iter()
            .all(|q| q.as_ref().err().is_some_and(MarketError::is_network));
    if !all_network {
        return None;
    }
    quotes.iter().find_map(|q| q.as_ref().err().map(|e| e.to_string()))
}
