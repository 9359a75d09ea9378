use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use stockcheck_core::cache::port::{Cache, CacheExt};
use stockcheck_core::market::entity::{EarningsEvent, NewsItem, Quote};
use stockcheck_core::market::error::MarketError;
use stockcheck_core::market::port::{FetchPolicy, MarketDataProvider};
use tracing::{debug, warn};

/// # Summary
/// 行情源的新鲜度缓存装饰器。
///
/// # Invariants
/// - 报价永不缓存，每次都透传给内部数据源。
/// - 财报与新闻按标的缓存，`FetchPolicy::Refresh` 绕过并覆盖缓存。
/// - 只缓存成功结果 (包括 "没有排期" 与空新闻列表)。
/// - 上游返回 `MarketError::NotFound` 时删除该键的旧缓存。
/// - 缓存读写失败只记录日志，回退为直接访问数据源。
pub struct CachedProvider {
    inner: Arc<dyn MarketDataProvider>,
    cache: Arc<dyn Cache>,
    earnings_ttl: Duration,
    news_ttl: Duration,
}

impl CachedProvider {
    /// # Summary
    /// 包装一个数据源。
    ///
    /// # Arguments
    /// * `inner`: 实际的数据源。
    /// * `cache`: KV 缓存。
    /// * `earnings_ttl`: 财报缓存时长。
    /// * `news_ttl`: 新闻缓存时长。
    pub fn new(
        inner: Arc<dyn MarketDataProvider>,
        cache: Arc<dyn Cache>,
        earnings_ttl: Duration,
        news_ttl: Duration,
    ) -> Self {
        Self {
            inner,
            cache,
            earnings_ttl,
            news_ttl,
        }
    }

    fn earnings_key(symbol: &str) -> String {
        format!("earnings:{}", symbol)
    }

    fn news_key(symbol: &str, limit: usize) -> String {
        format!("news:{}:{}", symbol, limit)
    }

    async fn lookup<T>(&self, key: &str) -> Option<T>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        match self.cache.get::<T>(key).await {
            Ok(Some(value)) => {
                debug!(key, "Feed cache hit");
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Feed cache read failed");
                None
            }
        }
    }

    async fn store<T>(&self, key: &str, value: &T, ttl: Duration)
    where
        T: serde::Serialize + Send + Sync,
    {
        if let Err(e) = self.cache.set(key, value, Some(ttl)).await {
            warn!(key, error = %e, "Feed cache write failed");
        }
    }

    // 上游明确报告数据不存在时，旧缓存不再可信
    async fn evict_missing(&self, key: &str, err: &MarketError) {
        if *err != MarketError::NotFound {
            return;
        }
        match self.cache.del(key).await {
            Ok(()) => debug!(key, "Evicted feed cache entry for missing data"),
            Err(e) => warn!(key, error = %e, "Feed cache eviction failed"),
        }
    }
}

#[async_trait]
impl MarketDataProvider for CachedProvider {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, MarketError> {
        self.inner.fetch_quote(symbol).await
    }

    async fn fetch_next_earnings(
        &self,
        symbol: &str,
        policy: FetchPolicy,
    ) -> Result<Option<EarningsEvent>, MarketError> {
        let key = Self::earnings_key(symbol);
        if policy == FetchPolicy::Cached
            && let Some(hit) = self.lookup::<Option<EarningsEvent>>(&key).await
        {
            return Ok(hit);
        }

        let fresh = match self.inner.fetch_next_earnings(symbol, policy).await {
            Ok(fresh) => fresh,
            Err(e) => {
                self.evict_missing(&key, &e).await;
                return Err(e);
            }
        };
        self.store(&key, &fresh, self.earnings_ttl).await;
        Ok(fresh)
    }

    async fn fetch_news(
        &self,
        symbol: &str,
        limit: usize,
        policy: FetchPolicy,
    ) -> Result<Vec<NewsItem>, MarketError> {
        let key = Self::news_key(symbol, limit);
        if policy == FetchPolicy::Cached
            && let Some(hit) = self.lookup::<Vec<NewsItem>>(&key).await
        {
            return Ok(hit);
        }

        let fresh = match self.inner.fetch_news(symbol, limit, policy).await {
            Ok(fresh) => fresh,
            Err(e) => {
                self.evict_missing(&key, &e).await;
                return Err(e);
            }
        };
        self.store(&key, &fresh, self.news_ttl).await;
        Ok(fresh)
    }
}
