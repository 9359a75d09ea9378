use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use stockcheck_cache::mem::MemCache;
use stockcheck_core::cache::port::{Cache, CacheExt};
use stockcheck_core::common::time::FakeClockProvider;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct TestItem {
    symbol: String,
    price: f64,
}

fn fake_clock() -> Arc<FakeClockProvider> {
    Arc::new(FakeClockProvider::new(
        Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap(),
    ))
}

#[tokio::test]
async fn test_mem_cache_raw_ops() {
    let cache = MemCache::new();
    let key = "raw_key";
    let value = vec![1, 2, 3, 4];

    // 测试存取
    cache.set_raw(key, value.clone(), None).await.unwrap();
    let result = cache.get_raw(key).await.unwrap().unwrap();
    assert_eq!(result, value);

    // 测试删除
    cache.del(key).await.unwrap();
    assert!(cache.get_raw(key).await.unwrap().is_none());
    assert_eq!(cache.len(), 0);
}

#[tokio::test]
async fn test_mem_cache_typed_ops() {
    let cache = MemCache::new();
    let item = TestItem {
        symbol: "AAPL".to_string(),
        price: 107.0,
    };

    cache.set("typed_key", &item, None).await.unwrap();
    let result: TestItem = cache.get("typed_key").await.unwrap().unwrap();
    assert_eq!(result, item);
}

#[tokio::test]
async fn test_mem_cache_entry_expires_after_ttl() {
    let clock = fake_clock();
    let cache = MemCache::with_clock(clock.clone());

    cache
        .set_raw("news:AAPL", vec![9], Some(Duration::from_secs(30 * 60)))
        .await
        .unwrap();

    clock.advance(chrono::Duration::minutes(29));
    assert_eq!(cache.get_raw("news:AAPL").await.unwrap(), Some(vec![9]));

    // 到达过期时间即不可见，并被惰性清理
    clock.advance(chrono::Duration::minutes(1));
    assert!(cache.get_raw("news:AAPL").await.unwrap().is_none());
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_mem_cache_overwrite_resets_ttl() {
    let clock = fake_clock();
    let cache = MemCache::with_clock(clock.clone());
    let ttl = Some(Duration::from_secs(60));

    cache.set_raw("k", vec![1], ttl).await.unwrap();
    clock.advance(chrono::Duration::seconds(50));
    cache.set_raw("k", vec![2], ttl).await.unwrap();
    clock.advance(chrono::Duration::seconds(50));

    assert_eq!(cache.get_raw("k").await.unwrap(), Some(vec![2]));
}
