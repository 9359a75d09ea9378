use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use stockcheck_core::cache::error::CacheError;
use stockcheck_core::cache::port::Cache;
use stockcheck_core::common::time::{RealTimeProvider, TimeProvider};
use tracing::debug;

// 单个缓存条目
struct Entry {
    value: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
}

/// # Summary
/// 基于 DashMap 的内存缓存实现，支持按条目设置存活时长。
///
/// # Invariants
/// - 所有操作均通过并发哈希表 `DashMap` 执行，保证多线程安全。
/// - 过期判断使用注入的 `TimeProvider`，过期条目在读取时惰性删除。
/// - 不提供容量限制。
pub struct MemCache {
    // 线程安全的 KV 存储容器
    storage: DashMap<String, Entry>,
    clock: Arc<dyn TimeProvider>,
}

impl MemCache {
    /// # Summary
    /// 使用系统时钟创建缓存。
    pub fn new() -> Self {
        Self::with_clock(Arc::new(RealTimeProvider))
    }

    /// # Summary
    /// 使用指定时钟创建缓存。
    ///
    /// # Arguments
    /// * `clock`: 判断过期所用的时间源。
    ///
    /// # Returns
    /// * `Self` - 初始化的缓存实例。
    pub fn with_clock(clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            storage: DashMap::new(),
            clock,
        }
    }

    /// 当前条目数 (包含尚未被惰性删除的过期条目)
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    // 在分片写锁内重新判断过期，读锁释放后写入的新值不会被误删
    fn evict_expired(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.storage
            .remove_if(key, |_, e| e.expires_at.is_some_and(|at| at <= now))
            .is_some()
    }
}

impl Default for MemCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemCache {
    /// # Summary
    /// 设置原始字节数据。
    ///
    /// # Logic
    /// 1. 将 TTL 换算为绝对过期时间。
    /// 2. 插入哈希表，存在同名 Key 则覆盖。
    ///
    /// # Arguments
    /// * `key`: 唯一索引。
    /// * `value`: 待存入的字节序列。
    /// * `ttl`: 存活时长，None 表示永不过期。
    ///
    /// # Returns
    /// * `Result<(), CacheError>` - TTL 超出可表示范围时返回 `Storage` 错误。
    async fn set_raw(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let expires_at = match ttl {
            Some(ttl) => {
                let ttl = chrono::Duration::from_std(ttl)
                    .map_err(|e| CacheError::Storage(format!("invalid ttl: {}", e)))?;
                Some(self.clock.now() + ttl)
            }
            None => None,
        };
        self.storage
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    /// # Summary
    /// 获取原始字节数据。
    ///
    /// # Logic
    /// 1. 检索 Key 对应的条目。
    /// 2. 已过期则删除并返回 None，否则克隆返回。
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = self.clock.now();
        let expired = match self.storage.get(key) {
            None => return Ok(None),
            Some(entry) => match entry.expires_at {
                Some(at) if at <= now => true,
                _ => return Ok(Some(entry.value.clone())),
            },
        };
        if expired && self.evict_expired(key, now) {
            debug!(key, "Cache entry expired");
        }
        Ok(None)
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.storage.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stockcheck_core::common::time::FakeClockProvider;

    #[tokio::test]
    async fn test_eviction_keeps_entry_rewritten_after_expiry_check() {
        let clock = Arc::new(FakeClockProvider::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap(),
        ));
        let cache = MemCache::with_clock(clock.clone());
        let ttl = Some(Duration::from_secs(60));

        cache.set_raw("news:AAPL", vec![1], ttl).await.unwrap();
        clock.advance(chrono::Duration::seconds(61));
        let checked_at = clock.now();

        // 读取方判定过期之后、删除之前，另一个写入方刷新了条目
        cache.set_raw("news:AAPL", vec![2], ttl).await.unwrap();
        assert!(!cache.evict_expired("news:AAPL", checked_at));
        assert_eq!(cache.get_raw("news:AAPL").await.unwrap(), Some(vec![2]));

        clock.advance(chrono::Duration::seconds(61));
        assert!(cache.evict_expired("news:AAPL", clock.now()));
        assert!(cache.is_empty());
    }
}
