use stockcheck_core::analysis::entity::{Direction, FluctuationAlert};
use stockcheck_core::market::entity::Quote;
use stockcheck_core::portfolio::entity::{Holding, PerformanceSnapshot};

/// # Summary
/// 计算相对参考价的涨跌幅 (百分比)。
///
/// # Returns
/// 参考价缺失或不为正时返回 None。
pub fn change_percent(current: f64, reference: f64) -> Option<f64> {
    if reference > 0.0 && reference.is_finite() && current.is_finite() {
        Some((current - reference) / reference * 100.0)
    } else {
        None
    }
}

/// # Summary
/// 由持仓与报价计算表现快照。
///
/// # Logic
/// 1. 市值 = 股数 × 最新价。
/// 2. 有参考价时计算涨跌额与涨跌幅。
/// 3. |涨跌幅| ≥ 阈值时标记为高波动。
///
/// # Arguments
/// * `holding`: 持仓。
/// * `quote`: 行情源返回的报价。
/// * `threshold`: 高波动阈值 (百分比)。
pub fn build_snapshot(holding: &Holding, quote: &Quote, threshold: f64) -> PerformanceSnapshot {
    let change_pct = quote
        .previous_close
        .and_then(|reference| change_percent(quote.price, reference));
    let change_amount = change_pct
        .and(quote.previous_close)
        .map(|reference| quote.price - reference);

    PerformanceSnapshot {
        symbol: holding.symbol.clone(),
        name: holding
            .name
            .clone()
            .or_else(|| quote.name.clone())
            .unwrap_or_default(),
        shares: holding.shares,
        current_price: Some(quote.price),
        previous_close: quote.previous_close,
        change_amount,
        change_percent: change_pct,
        day_high: quote.day_high,
        day_low: quote.day_low,
        volume: quote.volume,
        market_value: Some(holding.shares * quote.price),
        is_high_fluctuation: change_pct.is_some_and(|pct| pct.abs() >= threshold),
    }
}

/// # Summary
/// 从快照中提取高波动告警。
///
/// # Logic
/// 1. 只保留被标记为高波动的快照。
/// 2. 按涨跌幅绝对值降序排列。
pub fn fluctuation_alerts(snapshots: &[PerformanceSnapshot]) -> Vec<FluctuationAlert> {
    let mut alerts: Vec<FluctuationAlert> = snapshots
        .iter()
        .filter(|s| s.is_high_fluctuation)
        .filter_map(|s| {
            let change_percent = s.change_percent?;
            Some(FluctuationAlert {
                symbol: s.symbol.clone(),
                name: s.name.clone(),
                change_percent,
                change_amount: s.change_amount?,
                direction: Direction::from_change(change_percent),
                current_price: s.current_price?,
                previous_close: s.previous_close?,
            })
        })
        .collect();

    alerts.sort_by(|a, b| b.change_percent.abs().total_cmp(&a.change_percent.abs()));
    alerts
}
