//! # `stockcheck-core` - 领域核心
//!
//! 只包含实体、错误枚举与端口 (Trait) 定义，不依赖任何具体基础设施。
//! 其它 crate 通过这里的 Trait 相互协作，具体实现由 `crates/app` 在启动时注入。

pub mod analysis;
pub mod cache;
pub mod common;
pub mod config;
pub mod market;
pub mod portfolio;

#[cfg(feature = "test-utils")]
pub mod testing;
