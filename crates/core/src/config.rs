use crate::portfolio::entity::Holding;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 配置校验错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// 定时间隔上限 (一年)
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 3600;

/// 全局应用配置
///
/// 所有分节都带有 `#[serde(default)]`，配置文件只需写出需要覆盖的字段。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub portfolio: PortfolioConfig,
    pub analysis: AnalysisConfig,
    pub scheduler: SchedulerConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// 持仓来源配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioConfig {
    // 静态配置的持仓列表
    pub holdings: Vec<Holding>,
    // 远程持仓接口地址 (可选)，启动时拉取一次
    pub holdings_url: Option<String>,
    // 远程持仓接口的 Bearer Token (可选)
    pub holdings_auth_token: Option<String>,
}

/// 分析引擎参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    // 高波动阈值 (百分比)
    pub fluctuation_threshold: f64,
    // 财报前瞻窗口 (天)
    pub earnings_lookahead_days: i64,
    // 每个高波动标的拉取的新闻条数
    pub news_per_symbol: usize,
    // 单次运行内对行情源的最大并发请求数
    pub max_concurrency: usize,
    // 单次运行的最长时长 (秒)，超时即判定失败并释放运行槽位
    pub max_run_secs: u64,
    // 财报数据缓存时长 (小时)
    pub earnings_cache_hours: u64,
    // 新闻数据缓存时长 (分钟)
    pub news_cache_minutes: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fluctuation_threshold: 5.0,
            earnings_lookahead_days: 30,
            news_per_symbol: 3,
            max_concurrency: 5,
            max_run_secs: 120,
            earnings_cache_hours: 4,
            news_cache_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    // 进程启动时是否自动开启定时器
    pub enabled: bool,
    // 定时间隔 (秒)
    pub interval_secs: u64,
    // 启动后是否立即执行一次，而不是等待一个完整间隔
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            run_on_start: false,
        }
    }
}

/// 大模型服务商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    // 不使用大模型，生成基础规则摘要
    #[default]
    None,
    OpenAi,
    Anthropic,
    // 兼容 OpenAI 协议的本地模型 (如 Ollama)
    Local,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::None => write!(f, "none"),
            LlmProvider::OpenAi => write!(f, "openai"),
            LlmProvider::Anthropic => write!(f, "anthropic"),
            LlmProvider::Local => write!(f, "local"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub api_key: Option<String>,
    // 自定义服务地址，local 模式下必填
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::None,
            model: "claude-3-sonnet-20240229".to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.3,
            max_tokens: 1024,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    /// 当前配置是否足以调用大模型
    pub fn is_configured(&self) -> bool {
        match self.provider {
            LlmProvider::None => false,
            LlmProvider::OpenAi | LlmProvider::Anthropic => {
                self.api_key.as_deref().is_some_and(|k| !k.is_empty())
            }
            LlmProvider::Local => self.base_url.as_deref().is_some_and(|u| !u.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    // EnvFilter 指令，RUST_LOG 存在时以 RUST_LOG 为准
    pub level: String,
    // 滚动日志目录 (可选)，为空时只输出到 stdout
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

impl AppConfig {
    /// # Summary
    /// 校验配置的取值范围。
    ///
    /// # Logic
    /// 1. 定时间隔、并发上限、最长运行时长必须为正。
    /// 2. 波动阈值与财报窗口不能为负。
    /// 3. 静态持仓的股数必须为正且代码非空。
    ///
    /// # Returns
    /// 全部合法返回 Ok，否则返回第一条不合法项。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.interval_secs == 0 || self.scheduler.interval_secs > MAX_INTERVAL_SECS {
            return Err(ConfigError::Invalid(format!(
                "scheduler.interval_secs must be between 1 and {}",
                MAX_INTERVAL_SECS
            )));
        }
        if self.analysis.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "analysis.max_concurrency must be greater than 0".into(),
            ));
        }
        if self.analysis.max_run_secs == 0 {
            return Err(ConfigError::Invalid(
                "analysis.max_run_secs must be greater than 0".into(),
            ));
        }
        let threshold = self.analysis.fluctuation_threshold;
        if threshold.is_nan() || threshold < 0.0 {
            return Err(ConfigError::Invalid(
                "analysis.fluctuation_threshold must be a non-negative number".into(),
            ));
        }
        if self.analysis.earnings_lookahead_days < 0 {
            return Err(ConfigError::Invalid(
                "analysis.earnings_lookahead_days must not be negative".into(),
            ));
        }
        for holding in &self.portfolio.holdings {
            holding
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("portfolio.holdings: {}", e)))?;
        }
        Ok(())
    }
}
