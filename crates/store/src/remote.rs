use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Map, Value};
use std::time::Duration;
use stockcheck_core::common::normalize_symbol;
use stockcheck_core::portfolio::entity::Holding;
use stockcheck_core::portfolio::error::StoreError;
use tracing::{info, warn};

const LIST_KEYS: [&str; 4] = ["portfolio_holdings", "holdings", "data", "positions"];
const SYMBOL_KEYS: [&str; 4] = ["symbol", "ticker", "Symbol", "Ticker"];
const SHARE_KEYS: [&str; 5] = ["shares", "quantity", "open_quantity", "Shares", "Quantity"];
const NAME_KEYS: [&str; 4] = ["name", "company", "Name", "companyName"];

/// # Summary
/// 远程持仓来源，启动时从外部接口拉取一次持仓列表。
///
/// # Invariants
/// - 请求超时 60 秒。
/// - 总是携带 `ngrok-skip-browser-warning`，配置了 Token 时携带 Bearer 认证头。
pub struct RemoteHoldingsSource {
    client: Client,
    url: String,
}

impl RemoteHoldingsSource {
    /// # Summary
    /// 创建远程持仓来源。
    ///
    /// # Arguments
    /// * `url`: 持仓接口地址。
    /// * `auth_token`: 可选的 Bearer Token。
    ///
    /// # Returns
    /// Token 含非法字符或客户端构建失败时返回 `StoreError::Invalid`。
    pub fn new(url: impl Into<String>, auth_token: Option<&str>) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("StockCheck/1.0"));
        headers.insert(
            "ngrok-skip-browser-warning",
            HeaderValue::from_static("true"),
        );
        if let Some(token) = auth_token.filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| StoreError::Invalid(format!("invalid auth token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .default_headers(headers)
            .build()
            .map_err(|e| StoreError::Invalid(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// # Summary
    /// 拉取并解析远程持仓。
    ///
    /// # Logic
    /// 1. GET 持仓接口，非 2xx 视为网络错误。
    /// 2. 解析 JSON，交给 `parse_holdings` 处理多种格式。
    ///
    /// # Returns
    /// 成功返回持仓列表 (可能为空)。
    pub async fn fetch(&self) -> Result<Vec<Holding>, StoreError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(StoreError::Network(format!("HTTP {}", resp.status())));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;

        let holdings = parse_holdings(&body);
        info!(url = %self.url, count = holdings.len(), "Fetched remote holdings");
        Ok(holdings)
    }
}

/// # Summary
/// 从多种响应格式中解析持仓。
///
/// # Logic
/// 1. 顶层为数组时直接作为持仓列表。
/// 2. 顶层为对象时依次查找 `portfolio_holdings`、`holdings`、`data`、`positions`，
///    都不存在时把对象本身当作单个持仓。
/// 3. 逐项解析，缺少代码或股数不为正的条目被跳过。
///
/// # Arguments
/// * `data`: 响应 JSON。
///
/// # Returns
/// 解析出的持仓列表。
pub fn parse_holdings(data: &Value) -> Vec<Holding> {
    let items: Vec<&Value> = match data {
        Value::Array(list) => list.iter().collect(),
        Value::Object(obj) => match LIST_KEYS.iter().find_map(|k| obj.get(*k)) {
            Some(Value::Array(list)) => list.iter().collect(),
            Some(_) => Vec::new(),
            None => vec![data],
        },
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| item.as_object())
        .filter_map(parse_single_holding)
        .collect()
}

fn parse_single_holding(item: &Map<String, Value>) -> Option<Holding> {
    let symbol = SYMBOL_KEYS
        .iter()
        .filter_map(|k| item.get(*k))
        .filter_map(Value::as_str)
        .find_map(normalize_symbol)?;

    let shares = SHARE_KEYS
        .iter()
        .filter_map(|k| item.get(*k))
        .find_map(as_number)
        .unwrap_or(0.0);

    if shares.is_nan() || shares <= 0.0 {
        warn!(symbol = %symbol, shares, "Skipping remote holding without positive shares");
        return None;
    }

    let name = NAME_KEYS
        .iter()
        .filter_map(|k| item.get(*k))
        .filter_map(Value::as_str)
        .find(|s| !s.trim().is_empty())
        .map(str::to_string);

    Some(Holding {
        symbol,
        shares,
        name,
    })
}

// 兼容数字与数字字符串
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_bare_list() {
        let holdings = parse_holdings(&json!([
            {"symbol": "aapl", "shares": 10, "name": "Apple Inc."},
            {"ticker": "MSFT", "quantity": "5.5"}
        ]));
        assert_eq!(holdings.len(), 2);
        assert_eq!(holdings[0].symbol, "AAPL");
        assert_eq!(holdings[0].name.as_deref(), Some("Apple Inc."));
        assert_eq!(holdings[1].shares, 5.5);
        assert!(holdings[1].name.is_none());
    }

    #[test]
    fn test_parse_wrapped_objects() {
        let wrapped = json!({"portfolio_holdings": [{"Ticker": "NVDA", "open_quantity": 40, "companyName": "NVIDIA"}]});
        let holdings = parse_holdings(&wrapped);
        assert_eq!(holdings[0].symbol, "NVDA");
        assert_eq!(holdings[0].shares, 40.0);
        assert_eq!(holdings[0].name.as_deref(), Some("NVIDIA"));

        let positions = json!({"positions": [{"Symbol": "TSLA", "Quantity": 30}]});
        assert_eq!(parse_holdings(&positions)[0].symbol, "TSLA");

        let single = json!({"symbol": "GOOGL", "Shares": 25});
        assert_eq!(parse_holdings(&single)[0].symbol, "GOOGL");
    }

    #[test]
    fn test_parse_skips_invalid_entries() {
        let holdings = parse_holdings(&json!({"holdings": [
            {"symbol": "AAPL"},
            {"shares": 3},
            {"symbol": "AMD", "shares": -2},
            "garbage",
            {"symbol": "IBM", "shares": 1}
        ]}));
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].symbol, "IBM");

        assert!(parse_holdings(&json!("nope")).is_empty());
        assert!(parse_holdings(&json!({"data": {"not": "a list"}})).is_empty());
    }
}
