//! # `stockcheck-analysis` - 组合分析
//!
//! - [`performance`]: 涨跌幅、市值与高波动告警的计算。
//! - [`narrative`]: 分析叙述 (大模型或规则生成) 与模型输出解析。
//! - [`state`]: 运行状态机与最近一次结果的缓存，保证同一时刻只有一个运行。
//! - [`engine`]: 串起组合存储、行情源与大模型的分析引擎。

pub mod engine;
pub mod narrative;
pub mod performance;
pub mod state;
