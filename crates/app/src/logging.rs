//! # 日志初始化
//!
//! stdout 输出始终开启；配置了 `logging.directory` 时额外按天滚动写入文件。

use stockcheck_core::config::LoggingConfig;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

const LOG_FILE_PREFIX: &str = "stockcheck.log";

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("Failed to install subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// # Summary
/// 安装全局 tracing 订阅器。
///
/// # Logic
/// 1. `RUST_LOG` 存在且合法时优先使用，否则使用 `logging.level`。
/// 2. 挂载 stdout 的 fmt 层。
/// 3. 配置了目录时挂载非阻塞的按天滚动文件层。
///
/// # Returns
/// 文件层的 `WorkerGuard`，调用方需持有到进程退出，否则缓冲日志会丢失。
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(&config.level)?,
    };

    let (file_layer, guard) = match config.directory.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

// 空字符串按 info 处理
fn level_filter(level: &str) -> Result<EnvFilter, ParseError> {
    let level = level.trim();
    if level.is_empty() {
        return EnvFilter::try_new("info");
    }
    EnvFilter::try_new(level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        assert!(level_filter("debug").is_ok());
        assert!(level_filter("info,stockcheck_analysis=trace").is_ok());
        assert!(level_filter("  ").is_ok());
    }
}
