//! 可编排的测试替身，只在开启 `test-utils` feature 时编译。

use crate::analysis::error::LlmError;
use crate::analysis::port::LanguageModel;
use crate::market::entity::{EarningsEvent, NewsItem, Quote};
use crate::market::error::MarketError;
use crate::market::port::{FetchPolicy, MarketDataProvider};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

/// # Summary
/// 按标的预置返回值的行情源替身。
///
/// # Invariants
/// - 未预置报价的标的返回 `MarketError::NotFound`。
/// - 闸门关闭时 `fetch_quote` 会挂起，直到调用 `open_gate`。
pub struct ScriptedMarketData {
    quotes: DashMap<String, Result<Quote, MarketError>>,
    earnings: DashMap<String, Result<Option<EarningsEvent>, MarketError>>,
    news: DashMap<String, Vec<NewsItem>>,
    delay_ms: AtomicU64,
    gate: watch::Sender<bool>,
    quote_calls: AtomicUsize,
    earnings_calls: AtomicUsize,
    news_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for ScriptedMarketData {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedMarketData {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            quotes: DashMap::new(),
            earnings: DashMap::new(),
            news: DashMap::new(),
            delay_ms: AtomicU64::new(0),
            gate,
            quote_calls: AtomicUsize::new(0),
            earnings_calls: AtomicUsize::new(0),
            news_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// 预置一个报价，前收盘为 `previous_close`
    pub fn with_quote(self, symbol: &str, price: f64, previous_close: f64) -> Self {
        self.set_quote(symbol, price, Some(previous_close));
        self
    }

    pub fn set_quote(&self, symbol: &str, price: f64, previous_close: Option<f64>) {
        let quote = Quote {
            symbol: symbol.to_string(),
            name: Some(format!("{} Corp", symbol)),
            price,
            previous_close,
            day_high: Some(price),
            day_low: previous_close,
            volume: Some(1_000),
            as_of: DateTime::<Utc>::UNIX_EPOCH,
        };
        self.quotes.insert(symbol.to_string(), Ok(quote));
    }

    /// 让某个标的的报价请求失败
    pub fn fail_quote(&self, symbol: &str, err: MarketError) {
        self.quotes.insert(symbol.to_string(), Err(err));
    }

    pub fn set_earnings(&self, symbol: &str, event: Option<EarningsEvent>) {
        self.earnings.insert(symbol.to_string(), Ok(event));
    }

    pub fn fail_earnings(&self, symbol: &str, err: MarketError) {
        self.earnings.insert(symbol.to_string(), Err(err));
    }

    pub fn set_news(&self, symbol: &str, items: Vec<NewsItem>) {
        self.news.insert(symbol.to_string(), items);
    }

    /// 每次报价请求前的额外延迟
    pub fn set_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(ms, Ordering::SeqCst);
    }

    /// 关闭闸门，之后的报价请求挂起
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    /// 打开闸门，释放所有挂起的报价请求
    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn earnings_calls(&self) -> usize {
        self.earnings_calls.load(Ordering::SeqCst)
    }

    pub fn news_calls(&self) -> usize {
        self.news_calls.load(Ordering::SeqCst)
    }

    /// 以 `FetchPolicy::Refresh` 发起的请求数
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// 观测到的最大并发报价请求数
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn note_policy(&self, policy: FetchPolicy) {
        if policy == FetchPolicy::Refresh {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl MarketDataProvider for ScriptedMarketData {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, MarketError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let mut rx = self.gate.subscribe();
        let gate = rx.wait_for(|open| *open).await.map(|_| ());
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        gate.map_err(|e| MarketError::Unknown(e.to_string()))?;

        match self.quotes.get(symbol) {
            Some(entry) => entry.value().clone(),
            None => Err(MarketError::NotFound),
        }
    }

    async fn fetch_next_earnings(
        &self,
        symbol: &str,
        policy: FetchPolicy,
    ) -> Result<Option<EarningsEvent>, MarketError> {
        self.earnings_calls.fetch_add(1, Ordering::SeqCst);
        self.note_policy(policy);
        match self.earnings.get(symbol) {
            Some(entry) => entry.value().clone(),
            None => Ok(None),
        }
    }

    async fn fetch_news(
        &self,
        symbol: &str,
        limit: usize,
        policy: FetchPolicy,
    ) -> Result<Vec<NewsItem>, MarketError> {
        self.news_calls.fetch_add(1, Ordering::SeqCst);
        self.note_policy(policy);
        Ok(self
            .news
            .get(symbol)
            .map(|items| items.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// # Summary
/// 返回固定文本或固定错误的语言模型替身。
pub struct ScriptedLanguageModel {
    model: String,
    reply: Mutex<Result<String, LlmError>>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl ScriptedLanguageModel {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self::with_result(Ok(reply.into()))
    }

    pub fn failing(err: LlmError) -> Self {
        Self::with_result(Err(err))
    }

    fn with_result(reply: Result<String, LlmError>) -> Self {
        Self {
            model: "scripted/test-model".to_string(),
            reply: Mutex::new(reply),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLanguageModel {
    fn model_id(&self) -> String {
        self.model.clone()
    }

    async fn complete(&self, _system: &str, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(prompt.to_string());
        self.reply
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
