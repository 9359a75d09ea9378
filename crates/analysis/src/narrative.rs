use chrono::{DateTime, Utc};
use stockcheck_core::analysis::entity::{Direction, FluctuationAlert, Narrative};
use stockcheck_core::analysis::port::LanguageModel;
use stockcheck_core::market::entity::{EarningsEvent, NewsItem};
use stockcheck_core::portfolio::entity::PerformanceSnapshot;
use tracing::{debug, warn};

/// 规则摘要的 `model_used` 取值
pub const RULE_BASED_MODEL: &str = "none";

pub const SYSTEM_PROMPT: &str = "You are an expert investment analyst assistant. Analyze the provided \
portfolio data and generate a concise, actionable summary. Focus on:
1. Overall portfolio health and performance
2. Significant movers (high fluctuation stocks) and potential reasons
3. Upcoming earnings that may impact positions
4. Relevant news that affects holdings

Be concise but insightful. Use bullet points for key insights and recommendations.
Do not give specific buy/sell advice - focus on analysis and awareness.";

// 上下文中每个分节最多列出的条目数
const SECTION_LIMIT: usize = 5;
const DETAIL_LIMIT: usize = 10;

/// # Summary
/// 生成叙述所需的分析数据视图。
#[derive(Debug, Clone, Copy)]
pub struct NarrativeInput<'a> {
    pub holdings: &'a [PerformanceSnapshot],
    pub fluctuations: &'a [FluctuationAlert],
    pub earnings: &'a [EarningsEvent],
    pub news: &'a [NewsItem],
    pub threshold: f64,
    pub lookahead_days: i64,
    pub now: DateTime<Utc>,
}

impl NarrativeInput<'_> {
    fn total_value(&self) -> f64 {
        self.holdings.iter().filter_map(|h| h.market_value).sum()
    }
}

/// # Summary
/// 生成分析叙述。
///
/// # Logic
/// 1. 未配置大模型时生成规则摘要。
/// 2. 否则构建上下文并调用大模型，解析返回文本。
/// 3. 大模型调用失败时返回 None，结果中不包含叙述。
///
/// # Arguments
/// * `model`: 可选的大模型。
/// * `input`: 分析数据。
///
/// # Returns
/// 叙述或 None。
pub async fn synthesize(
    model: Option<&dyn LanguageModel>,
    input: NarrativeInput<'_>,
) -> Option<Narrative> {
    let Some(model) = model else {
        return Some(rule_based(&input));
    };

    let prompt = build_prompt(&build_context(&input));
    match model.complete(SYSTEM_PROMPT, &prompt).await {
        Ok(text) => {
            debug!(chars = text.len(), "Language model replied");
            Some(parse_response(&text, &model.model_id(), input.now))
        }
        Err(e) => {
            warn!(error = %e, model = %model.model_id(), "Narrative generation failed, omitting narrative");
            None
        }
    }
}

/// # Summary
/// 不依赖大模型的基础摘要。
///
/// # Logic
/// 统计持仓、高波动与财报数量，列出下跌标的与缺失行情作为风险。
pub fn rule_based(input: &NarrativeInput<'_>) -> Narrative {
    let holdings = input.holdings.len();
    let movers = input.fluctuations.len();
    let earnings = input.earnings.len();

    let summary = format!(
        "Portfolio of {} holdings valued at ${}. {} {} moved at least {}% since the previous close, \
         and {} earnings {} scheduled within the next {} days.",
        holdings,
        format_money(input.total_value()),
        movers,
        if movers == 1 { "position" } else { "positions" },
        input.threshold,
        earnings,
        if earnings == 1 { "report is" } else { "reports are" },
        input.lookahead_days,
    );

    let mut key_insights = vec![
        format!("Portfolio contains {} holdings", holdings),
        format!(
            "{} stocks show significant movement (>={}%)",
            movers, input.threshold
        ),
        format!("{} upcoming earnings events", earnings),
    ];
    if let Some(top) = input.fluctuations.first() {
        key_insights.push(format!(
            "Largest mover: {} ({:+.2}%)",
            top.symbol, top.change_percent
        ));
    }

    let mut recommendations = Vec::new();
    if movers > 0 {
        let symbols: Vec<&str> = input.fluctuations.iter().map(|f| f.symbol.as_str()).collect();
        recommendations.push(format!(
            "Review high-fluctuation stocks: {}",
            symbols.join(", ")
        ));
    }
    if let Some(next) = input.earnings.first() {
        recommendations.push(format!(
            "Prepare for {} earnings in {} days",
            next.symbol,
            next.days_until(input.now)
        ));
    }
    if recommendations.is_empty() {
        recommendations.push("No significant movers today; continue regular monitoring".to_string());
    }

    let mut risk_factors: Vec<String> = input
        .fluctuations
        .iter()
        .filter(|f| f.direction == Direction::Down)
        .map(|f| format!("{} fell {:.2}%", f.symbol, f.change_percent.abs()))
        .collect();
    let unavailable: Vec<&str> = input
        .holdings
        .iter()
        .filter(|h| h.current_price.is_none())
        .map(|h| h.symbol.as_str())
        .collect();
    if !unavailable.is_empty() {
        risk_factors.push(format!(
            "Market data unavailable for: {}",
            unavailable.join(", ")
        ));
    }

    Narrative {
        summary,
        key_insights,
        recommendations,
        risk_factors,
        model_used: RULE_BASED_MODEL.to_string(),
        generated_at: input.now,
    }
}

/// # Summary
/// 构建提供给大模型的数据上下文 (Markdown)。
///
/// # Logic
/// 依次写入组合概览、高波动标的、近期财报、近期新闻与按市值排序的持仓明细。
pub fn build_context(input: &NarrativeInput<'_>) -> String {
    let mut parts = Vec::new();

    let gainers = input
        .holdings
        .iter()
        .filter(|h| h.change_percent.is_some_and(|c| c > 0.0))
        .count();
    let losers = input
        .holdings
        .iter()
        .filter(|h| h.change_percent.is_some_and(|c| c < 0.0))
        .count();

    parts.push(format!(
        "## Portfolio Overview\n- Total Holdings: {}\n- Estimated Value: ${}\n- Gainers Today: {}\n- Losers Today: {}\n",
        input.holdings.len(),
        format_money(input.total_value()),
        gainers,
        losers
    ));

    if !input.fluctuations.is_empty() {
        parts.push(format!(
            "## High Fluctuation Stocks (>={}% change)",
            input.threshold
        ));
        for f in input.fluctuations.iter().take(SECTION_LIMIT) {
            parts.push(format!(
                "- {} ({}): {:+.2}%",
                f.symbol, f.name, f.change_percent
            ));
        }
        parts.push(String::new());
    }

    if !input.earnings.is_empty() {
        parts.push("## Upcoming Earnings".to_string());
        for e in input.earnings.iter().take(SECTION_LIMIT) {
            parts.push(format!(
                "- {}: {} ({} days)",
                e.symbol,
                e.earnings_date.format("%b %d"),
                e.days_until(input.now)
            ));
        }
        parts.push(String::new());
    }

    if !input.news.is_empty() {
        parts.push("## Recent News".to_string());
        for n in input.news.iter().take(SECTION_LIMIT) {
            let date = n
                .published_at
                .map(|d| d.format("%b %d").to_string())
                .unwrap_or_else(|| "Unknown".to_string());
            parts.push(format!(
                "- [{}] {} ({}, {})",
                n.symbol, n.title, n.publisher, date
            ));
        }
        parts.push(String::new());
    }

    parts.push("## Holdings Detail".to_string());
    let mut detail: Vec<&PerformanceSnapshot> = input.holdings.iter().collect();
    detail.sort_by(|a, b| {
        b.market_value
            .unwrap_or(0.0)
            .total_cmp(&a.market_value.unwrap_or(0.0))
    });
    for h in detail.into_iter().take(DETAIL_LIMIT) {
        let change = h
            .change_percent
            .map(|c| format!("{:+.2}%", c))
            .unwrap_or_else(|| "N/A".to_string());
        let value = h
            .market_value
            .map(|v| format!("${}", format_money(v)))
            .unwrap_or_else(|| "N/A".to_string());
        parts.push(format!("- {}: {} ({})", h.symbol, value, change));
    }

    parts.join("\n")
}

/// 用户提示词
pub fn build_prompt(context: &str) -> String {
    format!(
        "Please analyze this portfolio data:\n\n{}\n\nProvide:\n\
         1. A brief summary paragraph (2-3 sentences)\n\
         2. 3-5 key insights as bullet points\n\
         3. 2-3 actionable recommendations\n\
         4. Any risk factors to be aware of",
        context
    )
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Summary,
    Insights,
    Recommendations,
    Risks,
}

fn detect_section(text: &str) -> Option<Section> {
    let lower = text.to_lowercase();
    if lower.contains("insight") {
        Some(Section::Insights)
    } else if lower.contains("recommendation") || lower.contains("action") {
        Some(Section::Recommendations)
    } else if lower.contains("risk") || lower.contains("caution") || lower.contains("warning") {
        Some(Section::Risks)
    } else if lower.contains("summary") {
        Some(Section::Summary)
    } else {
        None
    }
}

fn strip_bullet(line: &str) -> Option<&str> {
    // "**标题**" 是加粗而不是列表项
    if line.starts_with("**") {
        return None;
    }
    let rest = line
        .strip_prefix('-')
        .or_else(|| line.strip_prefix('*'))
        .or_else(|| line.strip_prefix('•'))?;
    Some(rest.trim_start_matches(['-', '*', '•', ' ']).trim())
}

// 形如 "1. xxx" 的编号条目
fn strip_number(line: &str) -> Option<&str> {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    let rest = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')'))?;
    Some(rest.trim())
}

/// # Summary
/// 判断一行是否为分节标题。
///
/// # Logic
/// 候选标题: Markdown 标题、整行加粗、以冒号结尾，或不超过 4 个词且不以句号结尾的非编号短行。
/// 候选标题中包含分节关键字时返回对应分节。
fn heading_section(line: &str) -> Option<Section> {
    let markdown = line.starts_with('#');
    let text = line.trim_start_matches('#').trim();
    let numbered = strip_number(text);
    let text = numbered.unwrap_or(text);
    let bold = text.starts_with("**");
    let colon = text.ends_with(':') || text.ends_with(":**");
    let title = text.trim_matches('*').trim().trim_end_matches(':').trim_matches('*').trim();

    let short_plain = numbered.is_none()
        && title.split_whitespace().count() <= 4
        && !title.ends_with('.');
    if title.is_empty() || title.len() > 60 || !(markdown || bold || colon || short_plain) {
        return None;
    }
    detect_section(title)
}

/// # Summary
/// 把大模型的自由文本解析为结构化叙述。
///
/// # Logic
/// 1. 按行扫描，遇到包含 insight / recommendation / risk / summary 等关键字的标题行时切换分节。
/// 2. 列表项 (`-`、`*`、`•`、`1.`) 归入当前分节；摘要分节中的普通行拼接为摘要。
/// 3. 缺失的分节使用保底内容。
///
/// # Arguments
/// * `text`: 模型输出。
/// * `model_used`: 模型标识。
/// * `now`: 生成时间。
pub fn parse_response(text: &str, model_used: &str, now: DateTime<Utc>) -> Narrative {
    let mut section = Section::Summary;
    let mut summary = String::new();
    let mut key_insights = Vec::new();
    let mut recommendations = Vec::new();
    let mut risk_factors = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let bullet = strip_bullet(line);
        if bullet.is_none()
            && let Some(next) = heading_section(line)
        {
            section = next;
            continue;
        }

        let item = bullet
            .or_else(|| strip_number(line))
            .map(|c| c.trim_matches('*').trim())
            .filter(|c| !c.is_empty());
        match (section, item) {
            (Section::Insights, Some(c)) => key_insights.push(c.to_string()),
            (Section::Recommendations, Some(c)) => recommendations.push(c.to_string()),
            (Section::Risks, Some(c)) => risk_factors.push(c.to_string()),
            (Section::Summary, _) => {
                if !summary.is_empty() {
                    summary.push(' ');
                }
                summary.push_str(item.unwrap_or(line));
            }
            _ => {}
        }
    }

    if summary.is_empty() {
        summary = if text.trim().is_empty() {
            "Analysis complete.".to_string()
        } else {
            text.trim().chars().take(500).collect()
        };
    }
    if key_insights.is_empty() {
        key_insights.push("Analysis complete - review details below".to_string());
    }
    if recommendations.is_empty() {
        recommendations.push("Monitor high-fluctuation positions".to_string());
    }

    Narrative {
        summary,
        key_insights,
        recommendations,
        risk_factors,
        model_used: model_used.to_string(),
        generated_at: now,
    }
}

/// 带千分位的两位小数金额
pub fn format_money(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((&formatted, "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, frac_part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(1070.0), "1,070.00");
        assert_eq!(format_money(1234567.891), "1,234,567.89");
        assert_eq!(format_money(12.5), "12.50");
        assert_eq!(format_money(-999.999), "-1,000.00");
    }

    #[test]
    fn test_parse_markdown_sections() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();
        let text = "## Summary\nThe portfolio is up modestly.\nTech led gains.\n\n\
                    ## Key Insights\n- AAPL rose 7%\n* NVDA is flat\n\n\
                    ## Recommendations\n1. Watch AAPL into earnings\n2. Rebalance if needed\n\n\
                    ## Risk Factors\n• Concentration in tech\n";
        let narrative = parse_response(text, "anthropic/claude", now);
        assert_eq!(
            narrative.summary,
            "The portfolio is up modestly. Tech led gains."
        );
        assert_eq!(narrative.key_insights, vec!["AAPL rose 7%", "NVDA is flat"]);
        assert_eq!(
            narrative.recommendations,
            vec!["Watch AAPL into earnings", "Rebalance if needed"]
        );
        assert_eq!(narrative.risk_factors, vec!["Concentration in tech"]);
        assert_eq!(narrative.model_used, "anthropic/claude");
    }

    #[test]
    fn test_parse_numbered_bold_headings() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();
        let text = "1. **Summary**\nSteady day overall.\n\
                    2. **Key Insights**\n- One\n\
                    3. **Actionable Recommendations**\n- Two\n\
                    4. **Risk Factors**\n- Three\n";
        let narrative = parse_response(text, "openai/gpt", now);
        assert_eq!(narrative.summary, "Steady day overall.");
        assert_eq!(narrative.key_insights, vec!["One"]);
        assert_eq!(narrative.recommendations, vec!["Two"]);
        assert_eq!(narrative.risk_factors, vec!["Three"]);
    }

    #[test]
    fn test_parse_unstructured_falls_back() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();
        let narrative = parse_response("Markets were calm.", "local/llama3", now);
        assert_eq!(narrative.summary, "Markets were calm.");
        assert_eq!(
            narrative.key_insights,
            vec!["Analysis complete - review details below"]
        );
        assert_eq!(
            narrative.recommendations,
            vec!["Monitor high-fluctuation positions"]
        );
        assert!(narrative.risk_factors.is_empty());
    }
}
