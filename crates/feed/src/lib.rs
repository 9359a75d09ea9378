//! # `stockcheck-feed` - 行情数据源
//!
//! - [`yahoo::YahooProvider`]: 通过 Yahoo Finance HTTP 接口获取报价、财报与新闻。
//! - [`cached::CachedProvider`]: 为财报与新闻增加新鲜度缓存的装饰器。

pub mod cached;
pub mod yahoo;
