//! # `stockcheck-cache` - 内存 KV 缓存
//!
//! 为 `stockcheck-core` 的 `Cache` 端口提供基于 DashMap 的实现。

pub mod mem;
