pub mod time;

/// # Summary
/// 规范化证券代码：去除首尾空白并转为大写。
///
/// # Arguments
/// * `raw`: 原始输入，例如 " aapl "。
///
/// # Returns
/// 合法时返回规范化后的代码，空字符串或包含空白字符时返回 None。
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let symbol = raw.trim().to_uppercase();
    if symbol.is_empty() || symbol.chars().any(char::is_whitespace) {
        return None;
    }
    Some(symbol)
}

/// 将浮点数四舍五入到指定小数位，仅用于展示与日志。
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol(" aapl ").as_deref(), Some("AAPL"));
        assert_eq!(normalize_symbol("brk-b").as_deref(), Some("BRK-B"));
        assert!(normalize_symbol("   ").is_none());
        assert!(normalize_symbol("AA PL").is_none());
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(7.000_000_000_000_001, 2), 7.0);
        assert_eq!(round_to(1070.004, 2), 1070.0);
        assert_eq!(round_to(-5.555, 1), -5.6);
    }
}
