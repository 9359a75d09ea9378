//! # `stockcheck-store` - 组合存储
//!
//! - [`memory::MemoryPortfolioStore`]: 进程内的持仓与最近一次表现快照。
//! - [`remote::RemoteHoldingsSource`]: 启动时从远程接口拉取持仓。

pub mod memory;
pub mod remote;
