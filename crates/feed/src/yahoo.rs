use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, SET_COOKIE, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use stockcheck_core::market::entity::{EarningsEvent, NewsItem, Quote};
use stockcheck_core::market::error::MarketError;
use stockcheck_core::market::port::{FetchPolicy, MarketDataProvider};
use tokio::sync::RwLock;
use tracing::{debug, warn};

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const SEARCH_URL: &str = "https://query1.finance.yahoo.com/v1/finance/search";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URL: &str = "https://query1.finance.yahoo.com/v1/test/getcrumb";

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

// quoteSummary 接口需要的会话凭据
#[derive(Clone)]
struct Session {
    cookie: String,
    crumb: String,
}

/// # Summary
/// Yahoo Finance 行情提供者实现。
///
/// # Invariants
/// - 使用 `reqwest` 异步客户端进行通讯。
/// - 报价来自 chart 接口，财报来自 quoteSummary (需要 crumb)，新闻来自 search 接口。
/// - 本身不做缓存，`FetchPolicy` 由外层 `CachedProvider` 处理。
#[derive(Clone)]
pub struct YahooProvider {
    /// 内部使用的 HTTP 客户端
    client: Client,
    session: Arc<RwLock<Option<Session>>>,
}

impl YahooProvider {
    /// # Summary
    /// 创建一个新的 YahooProvider 实例。
    ///
    /// # Logic
    /// 1. 配置 10 秒超时。
    /// 2. 设置伪装浏览器 Header (User-Agent) 以减少被拦截风险。
    /// 3. 初始化 reqwest 客户端。
    ///
    /// # Returns
    /// 返回初始化后的 YahooProvider，客户端构建失败时返回 `MarketError::Unknown`。
    pub fn new() -> Result<Self, MarketError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()
            .map_err(|e| MarketError::Unknown(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            session: Arc::new(RwLock::new(None)),
        })
    }

    /// # Summary
    /// 获取 (必要时建立) quoteSummary 会话。
    ///
    /// # Logic
    /// 1. 已有会话直接返回。
    /// 2. 访问 fc.yahoo.com 获取 Cookie (该地址通常返回 404，但会下发 Cookie)。
    /// 3. 携带 Cookie 请求 crumb。
    async fn session(&self) -> Result<Session, MarketError> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(session.clone());
        }

        let mut guard = self.session.write().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }

        let resp = self
            .client
            .get(COOKIE_URL)
            .send()
            .await
            .map_err(|e| MarketError::Network(e.to_string()))?;
        let cookie = resp
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .collect::<Vec<_>>()
            .join("; ");
        if cookie.is_empty() {
            return Err(MarketError::Network("Yahoo did not issue a session cookie".into()));
        }

        let crumb = self
            .client
            .get(CRUMB_URL)
            .header(COOKIE, &cookie)
            .send()
            .await
            .map_err(|e| MarketError::Network(e.to_string()))?
            .text()
            .await
            .map_err(|e| MarketError::Network(e.to_string()))?;
        let crumb = crumb.trim().to_string();
        if crumb.is_empty() || crumb.contains('<') {
            return Err(MarketError::Parse(format!("Unexpected crumb response: {}", crumb)));
        }

        debug!("Established Yahoo session");
        let session = Session { cookie, crumb };
        *guard = Some(session.clone());
        Ok(session)
    }

    async fn reset_session(&self) {
        *self.session.write().await = None;
    }
}

/// # Summary
/// 将 HTTP 状态码映射为领域错误。
fn check_status(status: StatusCode) -> Result<(), MarketError> {
    if status == StatusCode::NOT_FOUND {
        return Err(MarketError::NotFound);
    }
    if !status.is_success() {
        return Err(MarketError::Network(format!("HTTP {}", status)));
    }
    Ok(())
}

/// # Summary
/// Yahoo API 错误详情。
#[derive(Deserialize, Debug)]
struct YahooError {
    description: String,
}

/// # Summary
/// Yahoo v8 chart 接口响应顶层结构。
#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Deserialize, Debug)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<YahooError>,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Option<ChartIndicators>,
}

/// # Summary
/// chart 接口的 meta 部分，包含实时报价字段。
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    short_name: Option<String>,
    long_name: Option<String>,
    regular_market_price: Option<f64>,
    previous_close: Option<f64>,
    chart_previous_close: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_volume: Option<u64>,
    regular_market_time: Option<i64>,
}

#[derive(Deserialize, Debug)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Deserialize, Debug)]
struct ChartQuote {
    // 收盘价列表
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// # Summary
/// 将 chart 接口响应转换为报价。
///
/// # Logic
/// 1. 以 `regularMarketPrice` 为最新价。
/// 2. 参考价取报价日之前最后一根日线的收盘价。
/// 3. 日线不足时依次回退到 `previousClose`、`chartPreviousClose`。
///
/// # Arguments
/// * `symbol`: 请求的证券代码。
/// * `body`: 原始 JSON 文本。
///
/// # Returns
/// 成功返回 Quote，结构不符或缺少价格返回 MarketError。
fn parse_chart(symbol: &str, body: &str) -> Result<Quote, MarketError> {
    let json: ChartResponse =
        serde_json::from_str(body).map_err(|e| MarketError::Parse(e.to_string()))?;

    if let Some(err) = json.chart.error {
        return Err(MarketError::Unknown(err.description));
    }

    let result = json
        .chart
        .result
        .and_then(|mut r| r.pop())
        .ok_or(MarketError::NotFound)?;
    let meta = result.meta;

    let price = meta
        .regular_market_price
        .filter(|p| *p > 0.0)
        .ok_or_else(|| MarketError::Parse("missing regularMarketPrice".into()))?;

    let as_of = meta
        .regular_market_time
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let closes = result
        .indicators
        .as_ref()
        .and_then(|ind| ind.quote.first())
        .map(|q| q.close.as_slice())
        .unwrap_or_default();

    // 报价日之前最后一个有效收盘价
    let series_reference = result
        .timestamp
        .iter()
        .zip(closes.iter())
        .filter_map(|(ts, close)| {
            let time = DateTime::from_timestamp(*ts, 0)?;
            close.map(|c| (time, c))
        })
        .filter(|(time, _)| time.date_naive() < as_of.date_naive())
        .next_back()
        .map(|(_, c)| c);

    let previous_close = series_reference
        .or(meta.previous_close)
        .or(meta.chart_previous_close)
        .filter(|p| *p > 0.0);

    Ok(Quote {
        symbol: symbol.to_string(),
        name: meta.short_name.or(meta.long_name),
        price,
        previous_close,
        day_high: meta.regular_market_day_high,
        day_low: meta.regular_market_day_low,
        volume: meta.regular_market_volume,
        as_of,
    })
}

#[derive(Deserialize, Debug)]
struct SummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: SummaryBody,
}

#[derive(Deserialize, Debug)]
struct SummaryBody {
    result: Option<Vec<SummaryResult>>,
    error: Option<YahooError>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SummaryResult {
    calendar_events: Option<CalendarEvents>,
    price: Option<PriceModule>,
}

#[derive(Deserialize, Debug)]
struct CalendarEvents {
    earnings: Option<CalendarEarnings>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CalendarEarnings {
    #[serde(default)]
    earnings_date: Vec<RawTimestamp>,
    earnings_average: Option<RawNumber>,
    revenue_average: Option<RawNumber>,
}

#[derive(Deserialize, Debug)]
struct RawTimestamp {
    raw: Option<i64>,
}

#[derive(Deserialize, Debug)]
struct RawNumber {
    raw: Option<f64>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    short_name: Option<String>,
    long_name: Option<String>,
}

/// # Summary
/// 将 quoteSummary(calendarEvents, price) 响应转换为财报事件。
///
/// # Logic
/// 1. 取 `earningsDate` 中的第一个日期 (区间时为开始日期)。
/// 2. 名称缺失时使用代码本身。
///
/// # Returns
/// 没有排期返回 `Ok(None)`。
fn parse_earnings(symbol: &str, body: &str) -> Result<Option<EarningsEvent>, MarketError> {
    let json: SummaryResponse =
        serde_json::from_str(body).map_err(|e| MarketError::Parse(e.to_string()))?;

    if let Some(err) = json.quote_summary.error {
        return Err(MarketError::Unknown(err.description));
    }

    let Some(result) = json.quote_summary.result.and_then(|mut r| r.pop()) else {
        return Ok(None);
    };

    let Some(earnings) = result.calendar_events.and_then(|c| c.earnings) else {
        return Ok(None);
    };

    let Some(earnings_date) = earnings
        .earnings_date
        .iter()
        .filter_map(|d| d.raw)
        .find_map(|ts| DateTime::from_timestamp(ts, 0))
    else {
        return Ok(None);
    };

    let name = result
        .price
        .and_then(|p| p.short_name.or(p.long_name))
        .unwrap_or_else(|| symbol.to_string());

    Ok(Some(EarningsEvent {
        symbol: symbol.to_string(),
        name,
        earnings_date,
        eps_estimate: earnings.earnings_average.and_then(|v| v.raw),
        revenue_estimate: earnings.revenue_average.and_then(|v| v.raw),
    }))
}

#[derive(Deserialize, Debug)]
struct SearchResponse {
    #[serde(default)]
    news: Vec<SearchNews>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SearchNews {
    title: Option<String>,
    publisher: Option<String>,
    link: Option<String>,
    provider_publish_time: Option<i64>,
    thumbnail: Option<Thumbnail>,
}

#[derive(Deserialize, Debug)]
struct Thumbnail {
    #[serde(default)]
    resolutions: Vec<Resolution>,
}

#[derive(Deserialize, Debug)]
struct Resolution {
    url: Option<String>,
}

/// # Summary
/// 将 search 接口响应中的新闻部分转换为新闻列表。
fn parse_news(symbol: &str, body: &str, limit: usize) -> Result<Vec<NewsItem>, MarketError> {
    let json: SearchResponse =
        serde_json::from_str(body).map_err(|e| MarketError::Parse(e.to_string()))?;

    Ok(json
        .news
        .into_iter()
        .take(limit)
        .map(|item| NewsItem {
            symbol: symbol.to_string(),
            publisher: item.publisher.unwrap_or_else(|| "Unknown".to_string()),
            title: item.title.unwrap_or_default(),
            link: item.link.unwrap_or_default(),
            published_at: item
                .provider_publish_time
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
            thumbnail_url: item
                .thumbnail
                .and_then(|t| t.resolutions.into_iter().find_map(|r| r.url)),
        })
        .collect())
}

#[async_trait]
impl MarketDataProvider for YahooProvider {
    /// # Summary
    /// 从 chart 接口获取最近 5 个交易日的日线与实时报价。
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, MarketError> {
        let url = format!("{}/{}", CHART_URL, symbol);
        let resp = self
            .client
            .get(&url)
            .query(&[("range", "5d"), ("interval", "1d")])
            .send()
            .await
            .map_err(|e| MarketError::Network(e.to_string()))?;
        check_status(resp.status())?;

        let body = resp
            .text()
            .await
            .map_err(|e| MarketError::Network(e.to_string()))?;
        parse_chart(symbol, &body)
    }

    /// # Summary
    /// 从 quoteSummary 接口获取下一次财报日期。
    ///
    /// # Logic
    /// 1. 获取会话 crumb。
    /// 2. 请求 calendarEvents 与 price 模块。
    /// 3. 401/403 时丢弃会话，下次调用重新建立。
    async fn fetch_next_earnings(
        &self,
        symbol: &str,
        _policy: FetchPolicy,
    ) -> Result<Option<EarningsEvent>, MarketError> {
        let session = self.session().await?;
        let url = format!("{}/{}", SUMMARY_URL, symbol);
        let resp = self
            .client
            .get(&url)
            .header(COOKIE, &session.cookie)
            .query(&[
                ("modules", "calendarEvents,price"),
                ("crumb", session.crumb.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MarketError::Network(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(symbol, %status, "Yahoo session rejected, will renew on next call");
            self.reset_session().await;
        }
        check_status(status)?;

        let body = resp
            .text()
            .await
            .map_err(|e| MarketError::Network(e.to_string()))?;
        parse_earnings(symbol, &body)
    }

    /// # Summary
    /// 从 search 接口获取最近的新闻。
    async fn fetch_news(
        &self,
        symbol: &str,
        limit: usize,
        _policy: FetchPolicy,
    ) -> Result<Vec<NewsItem>, MarketError> {
        let count = limit.to_string();
        let resp = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("q", symbol),
                ("quotesCount", "0"),
                ("newsCount", count.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MarketError::Network(e.to_string()))?;
        check_status(resp.status())?;

        let body = resp
            .text()
            .await
            .map_err(|e| MarketError::Network(e.to_string()))?;
        parse_news(symbol, &body, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // 2026-03-02 (周一) 到 2026-03-06 (周五) 的日线，报价时间为 03-06 20:00 UTC
    const CHART_BODY: &str = r#"{
        "chart": {
            "result": [{
                "meta": {
                    "symbol": "AAPL",
                    "shortName": "Apple Inc.",
                    "regularMarketPrice": 107.0,
                    "chartPreviousClose": 95.0,
                    "regularMarketDayHigh": 108.2,
                    "regularMarketDayLow": 101.5,
                    "regularMarketVolume": 51234567,
                    "regularMarketTime": 1772827200
                },
                "timestamp": [1772461800, 1772548200, 1772634600, 1772721000, 1772807400],
                "indicators": { "quote": [{ "close": [96.0, 98.5, 99.0, 100.0, 107.0] }] }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn test_parse_chart_uses_prior_session_close() {
        let quote = parse_chart("AAPL", CHART_BODY).unwrap();
        assert_eq!(quote.price, 107.0);
        assert_eq!(quote.previous_close, Some(100.0));
        assert_eq!(quote.name.as_deref(), Some("Apple Inc."));
        assert_eq!(quote.volume, Some(51_234_567));
        assert_eq!(
            quote.as_of,
            Utc.with_ymd_and_hms(2026, 3, 6, 20, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_chart_falls_back_to_meta_reference() {
        let body = r#"{"chart":{"result":[{"meta":{"regularMarketPrice":50.0,"chartPreviousClose":40.0}}],"error":null}}"#;
        let quote = parse_chart("X", body).unwrap();
        assert_eq!(quote.previous_close, Some(40.0));
        assert!(quote.name.is_none());
    }

    #[test]
    fn test_parse_chart_errors() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        assert!(matches!(
            parse_chart("ZZZZ", body),
            Err(MarketError::Unknown(_))
        ));

        let body = r#"{"chart":{"result":[{"meta":{}}],"error":null}}"#;
        assert!(matches!(parse_chart("X", body), Err(MarketError::Parse(_))));

        assert!(matches!(
            parse_chart("X", "<html>"),
            Err(MarketError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_earnings() {
        let body = r#"{"quoteSummary":{"result":[{
            "calendarEvents":{"earnings":{
                "earningsDate":[{"raw":1777492800,"fmt":"2026-04-29"},{"raw":1777924800,"fmt":"2026-05-04"}],
                "earningsAverage":{"raw":1.62,"fmt":"1.62"},
                "revenueAverage":{"raw":95000000000,"fmt":"95B"}
            }},
            "price":{"shortName":"Apple Inc."}
        }],"error":null}}"#;
        let event = parse_earnings("AAPL", body).unwrap().unwrap();
        assert_eq!(event.name, "Apple Inc.");
        assert_eq!(
            event.earnings_date,
            DateTime::from_timestamp(1_777_492_800, 0).unwrap()
        );
        assert_eq!(event.eps_estimate, Some(1.62));
        assert_eq!(event.revenue_estimate, Some(95_000_000_000.0));
    }

    #[test]
    fn test_parse_earnings_without_schedule() {
        let body = r#"{"quoteSummary":{"result":[{"calendarEvents":{"earnings":{"earningsDate":[]}}}],"error":null}}"#;
        assert_eq!(parse_earnings("BTC-USD", body).unwrap(), None);
    }

    #[test]
    fn test_parse_news_applies_limit_and_defaults() {
        let body = r#"{"news":[
            {"title":"Apple beats","publisher":"Reuters","link":"https://example.com/a","providerPublishTime":1772827200,
             "thumbnail":{"resolutions":[{"url":"https://img.example.com/a.jpg"}]}},
            {"title":"Second","link":"https://example.com/b"},
            {"title":"Third"}
        ]}"#;
        let news = parse_news("AAPL", body, 2).unwrap();
        assert_eq!(news.len(), 2);
        assert_eq!(news[0].publisher, "Reuters");
        assert_eq!(
            news[0].thumbnail_url.as_deref(),
            Some("https://img.example.com/a.jpg")
        );
        assert!(news[0].published_at.is_some());
        assert_eq!(news[1].publisher, "Unknown");
        assert!(news[1].published_at.is_none());
    }
}
