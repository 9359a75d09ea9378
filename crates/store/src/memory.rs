use async_trait::async_trait;
use std::sync::Arc;
use stockcheck_core::common::normalize_symbol;
use stockcheck_core::portfolio::entity::{Holding, PerformanceReport};
use stockcheck_core::portfolio::error::StoreError;
use stockcheck_core::portfolio::port::PortfolioStore;
use tokio::sync::RwLock;
use tracing::info;

/// # Summary
/// `PortfolioStore` 的内存实现。
///
/// # Invariants
/// - 持仓在构造时规范化并校验，之后不可变。
/// - 同一代码出现多次时合并股数，保留第一个非空名称。
/// - 表现报告以 `Arc` 整体替换，读者拿到的永远是完整快照。
pub struct MemoryPortfolioStore {
    holdings: Vec<Holding>,
    latest: RwLock<Option<Arc<PerformanceReport>>>,
}

impl MemoryPortfolioStore {
    /// # Summary
    /// 根据配置的持仓创建存储。
    ///
    /// # Logic
    /// 1. 规范化代码 (去空白、大写)。
    /// 2. 校验股数大于 0。
    /// 3. 合并重复代码，保持首次出现的顺序。
    ///
    /// # Arguments
    /// * `holdings`: 原始持仓列表。
    ///
    /// # Returns
    /// 任一持仓非法时返回 `StoreError::Invalid`。
    pub fn new(holdings: Vec<Holding>) -> Result<Self, StoreError> {
        let mut merged: Vec<Holding> = Vec::with_capacity(holdings.len());

        for raw in holdings {
            let symbol = normalize_symbol(&raw.symbol)
                .ok_or_else(|| StoreError::Invalid(format!("invalid symbol '{}'", raw.symbol)))?;
            let holding = Holding {
                symbol,
                shares: raw.shares,
                name: raw.name.filter(|n| !n.trim().is_empty()),
            };
            holding.validate().map_err(StoreError::Invalid)?;

            match merged.iter_mut().find(|h| h.symbol == holding.symbol) {
                Some(existing) => {
                    existing.shares += holding.shares;
                    if existing.name.is_none() {
                        existing.name = holding.name;
                    }
                }
                None => merged.push(holding),
            }
        }

        info!(count = merged.len(), "Portfolio store loaded");
        Ok(Self {
            holdings: merged,
            latest: RwLock::new(None),
        })
    }

    /// 持仓数量
    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }
}

#[async_trait]
impl PortfolioStore for MemoryPortfolioStore {
    async fn holdings(&self) -> Result<Vec<Holding>, StoreError> {
        Ok(self.holdings.clone())
    }

    async fn save_performance(&self, report: PerformanceReport) -> Result<(), StoreError> {
        *self.latest.write().await = Some(Arc::new(report));
        Ok(())
    }

    async fn latest_performance(&self) -> Result<Option<Arc<PerformanceReport>>, StoreError> {
        Ok(self.latest.read().await.clone())
    }
}
