//! # 配置加载
//!
//! 按以下顺序叠加配置，后者覆盖前者：
//! 1. `AppConfig::default()` (所有字段的缺省值)
//! 2. `config/default.toml` (可选)
//! 3. `STOCKCHECK_CONFIG` 指向的文件 (指定后必须存在)
//! 4. `STOCKCHECK__SECTION__KEY` 形式的环境变量

use config::{Config, Environment, File, Map};
use std::path::Path;
use stockcheck_core::config::AppConfig;
use thiserror::Error;

/// 默认配置文件路径 (相对工作目录)
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
/// 指定额外配置文件的环境变量
pub const CONFIG_PATH_ENV: &str = "STOCKCHECK_CONFIG";

const ENV_PREFIX: &str = "STOCKCHECK";
const ENV_SEPARATOR: &str = "__";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error(transparent)]
    Invalid(#[from] stockcheck_core::config::ConfigError),
}

/// # Summary
/// 从进程环境加载配置。
pub fn load() -> Result<AppConfig, SettingsError> {
    let override_path = std::env::var(CONFIG_PATH_ENV)
        .ok()
        .filter(|p| !p.trim().is_empty());
    load_from(
        Path::new(DEFAULT_CONFIG_PATH),
        override_path.as_deref().map(Path::new),
        None,
    )
}

/// # Summary
/// 按层叠加配置并校验。
///
/// # Arguments
/// * `default_path`: 默认配置文件，不存在时跳过。
/// * `override_path`: 额外配置文件，给出时必须存在。
/// * `env`: 环境变量来源，None 时读取进程环境。
///
/// # Returns
/// 解析失败返回 `SettingsError::Load`，取值越界返回 `SettingsError::Invalid`。
pub fn load_from(
    default_path: &Path,
    override_path: Option<&Path>,
    env: Option<Map<String, String>>,
) -> Result<AppConfig, SettingsError> {
    let mut builder = Config::builder().add_source(File::from(default_path).required(false));
    if let Some(path) = override_path {
        builder = builder.add_source(File::from(path).required(true));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(env),
    );

    let config: AppConfig = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use stockcheck_core::config::LlmProvider;
    use tempfile::NamedTempFile;

    fn toml_file(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn no_env() -> Option<Map<String, String>> {
        Some(Map::new())
    }

    #[test]
    fn test_missing_default_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_from(&dir.path().join("default.toml"), None, no_env()).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.scheduler.interval_secs, 3600);
        assert!(config.portfolio.holdings.is_empty());
    }

    #[test]
    fn test_layers_override_in_order() {
        let base = toml_file(
            r#"
            [server]
            port = 9000

            [analysis]
            fluctuation_threshold = 3.5

            [[portfolio.holdings]]
            symbol = "AAPL"
            shares = 10

            [[portfolio.holdings]]
            symbol = "MSFT"
            shares = 2.5
            name = "Microsoft"
            "#,
        );
        let extra = toml_file(
            r#"
            [server]
            port = 9100

            [scheduler]
            interval_secs = 600
            "#,
        );

        let mut env = Map::new();
        env.insert("STOCKCHECK__SCHEDULER__INTERVAL_SECS".into(), "120".into());
        env.insert("STOCKCHECK__LLM__PROVIDER".into(), "anthropic".into());
        env.insert("STOCKCHECK__LLM__API_KEY".into(), "sk-test".into());

        let config = load_from(base.path(), Some(extra.path()), Some(env)).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.analysis.fluctuation_threshold, 3.5);
        assert_eq!(config.scheduler.interval_secs, 120);
        assert_eq!(config.llm.provider, LlmProvider::Anthropic);
        assert!(config.llm.is_configured());
        assert_eq!(config.portfolio.holdings.len(), 2);
        assert_eq!(config.portfolio.holdings[1].name.as_deref(), Some("Microsoft"));
    }

    #[test]
    fn test_missing_override_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_from(
            &dir.path().join("default.toml"),
            Some(&dir.path().join("missing.toml")),
            no_env(),
        );
        assert!(matches!(result, Err(SettingsError::Load(_))));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let base = toml_file(
            r#"
            [scheduler]
            interval_secs = 0
            "#,
        );
        let result = load_from(base.path(), None, no_env());
        assert!(matches!(result, Err(SettingsError::Invalid(_))));

        let base = toml_file(
            r#"
            [[portfolio.holdings]]
            symbol = "AAPL"
            shares = -1
            "#,
        );
        let result = load_from(base.path(), None, no_env());
        assert!(matches!(result, Err(SettingsError::Invalid(_))));
    }
}
