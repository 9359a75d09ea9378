//! # `stockcheck-scheduler` - 定时分析
//!
//! 按固定间隔调用分析引擎的后台定时器，并提供手动触发入口。

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use stockcheck_analysis::engine::AnalysisEngine;
use stockcheck_core::analysis::entity::AnalyzeOptions;
use stockcheck_core::analysis::error::AnalysisError;
use stockcheck_core::common::time::TimeProvider;
use stockcheck_core::config::{MAX_INTERVAL_SECS, SchedulerConfig};
use thiserror::Error;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};
use uuid::Uuid;

/// # Summary
/// 调度器错误。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Invalid interval: {0}s")]
    InvalidInterval(u64),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

impl SchedulerError {
    /// 是否因为已有分析在运行而被拒绝
    pub fn is_busy(&self) -> bool {
        matches!(self, SchedulerError::Analysis(AnalysisError::Busy))
    }
}

/// # Summary
/// 调度器状态快照。
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerState {
    // 启动时的配置开关
    pub enabled: bool,
    pub running: bool,
    pub interval_secs: u64,
    pub last_run: Option<DateTime<Utc>>,
    // 停止时为 None
    pub next_run: Option<DateTime<Utc>>,
    pub tick_count: u64,
    // 因已有运行而跳过的 tick 数
    pub skipped_ticks: u64,
}

/// 调度器的构造参数
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub interval: Duration,
    pub run_on_start: bool,
}

impl From<&SchedulerConfig> for SchedulerSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            enabled: config.enabled,
            interval: Duration::from_secs(config.interval_secs),
            run_on_start: config.run_on_start,
        }
    }
}

struct Inner {
    interval: Duration,
    // 定时协程句柄，Some 表示运行中
    task: Option<AbortHandle>,
    // 每次启动或停止都会递增，旧协程据此放弃写入
    epoch: u64,
    last_run: Option<DateTime<Utc>>,
    next_run: Option<DateTime<Utc>>,
    tick_count: u64,
    skipped_ticks: u64,
}

/// # Summary
/// 分析调度器。
///
/// # Invariants
/// - 任意时刻至多一个定时协程，`start` 幂等。
/// - 每个 tick 通过 `AnalysisEngine::spawn` 发起运行，与手动触发共用同一个单运行保护。
/// - 上一次运行未结束时 tick 被跳过，不会排队。
/// - `stop` 只取消定时协程，进行中的运行照常完成。
pub struct AnalysisScheduler {
    engine: Arc<AnalysisEngine>,
    clock: Arc<dyn TimeProvider>,
    enabled: bool,
    run_on_start: bool,
    inner: Mutex<Inner>,
}

impl AnalysisScheduler {
    /// # Summary
    /// 创建调度器，不会自动启动。
    ///
    /// # Arguments
    /// * `engine`: 分析引擎。
    /// * `clock`: 时间源，用于记录 last_run / next_run。
    /// * `settings`: 调度参数。
    pub fn new(
        engine: Arc<AnalysisEngine>,
        clock: Arc<dyn TimeProvider>,
        settings: SchedulerSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            clock,
            enabled: settings.enabled,
            run_on_start: settings.run_on_start,
            inner: Mutex::new(Inner {
                interval: settings.interval,
                task: None,
                epoch: 0,
                last_run: None,
                next_run: None,
                tick_count: 0,
                skipped_ticks: 0,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// # Summary
    /// 启动定时器。
    ///
    /// # Logic
    /// 1. 已在运行时直接返回。
    /// 2. 计算 next_run，配置了 run_on_start 时第一个 tick 立即触发。
    /// 3. 启动定时协程并保存其 `AbortHandle`。
    ///
    /// # Returns
    /// 本次调用真正启动了定时器时返回 true。
    pub fn start(self: &Arc<Self>) -> bool {
        let mut inner = self.lock();
        if inner.task.is_some() {
            return false;
        }
        self.launch(&mut inner, self.run_on_start);
        info!(interval_secs = inner.interval.as_secs(), "Scheduler started");
        true
    }

    /// # Summary
    /// 停止定时器。
    ///
    /// # Returns
    /// 本次调用真正停止了定时器时返回 true。
    pub fn stop(&self) -> bool {
        let mut inner = self.lock();
        let Some(handle) = inner.task.take() else {
            return false;
        };
        handle.abort();
        inner.epoch += 1;
        inner.next_run = None;
        info!("Scheduler stopped");
        true
    }

    /// # Summary
    /// 立即发起一次分析，不影响定时计划。
    ///
    /// # Returns
    /// 成功返回运行 ID；已有运行时返回 `is_busy()` 为真的错误。
    pub fn trigger(&self, options: AnalyzeOptions) -> Result<Uuid, SchedulerError> {
        let run_id = self.engine.spawn(options)?;
        self.lock().last_run = Some(self.clock.now());
        info!(%run_id, "Manual analysis triggered");
        Ok(run_id)
    }

    /// # Summary
    /// 修改定时间隔。
    ///
    /// # Logic
    /// 1. 校验间隔在 1 秒到一年之间。
    /// 2. 运行中则以新间隔重启定时协程，下一次 tick 在一个完整间隔之后。
    pub fn set_interval(self: &Arc<Self>, interval_secs: u64) -> Result<(), SchedulerError> {
        if interval_secs == 0 || interval_secs > MAX_INTERVAL_SECS {
            return Err(SchedulerError::InvalidInterval(interval_secs));
        }
        let mut inner = self.lock();
        inner.interval = Duration::from_secs(interval_secs);
        if let Some(handle) = inner.task.take() {
            handle.abort();
            self.launch(&mut inner, false);
        }
        info!(interval_secs, "Scheduler interval updated");
        Ok(())
    }

    pub fn status(&self) -> SchedulerState {
        let inner = self.lock();
        SchedulerState {
            enabled: self.enabled,
            running: inner.task.is_some(),
            interval_secs: inner.interval.as_secs(),
            last_run: inner.last_run,
            next_run: inner.next_run,
            tick_count: inner.tick_count,
            skipped_ticks: inner.skipped_ticks,
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().task.is_some()
    }

    // 调用方持有锁
    fn launch(self: &Arc<Self>, inner: &mut Inner, fire_now: bool) {
        inner.epoch += 1;
        let epoch = inner.epoch;
        let period = inner.interval;
        let now = self.clock.now();
        inner.next_run = if fire_now {
            Some(now)
        } else {
            after(now, period)
        };

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let first = if fire_now {
                Instant::now()
            } else {
                Instant::now() + period
            };
            let mut ticker = tokio::time::interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                scheduler.tick(epoch, period);
            }
        });
        inner.task = Some(handle.abort_handle());
    }

    /// # Summary
    /// 单次 tick。
    ///
    /// # Logic
    /// 1. 定时器已被停止或重启 (epoch 变化) 时放弃。
    /// 2. 通过引擎后台发起运行，已有运行时记为跳过。
    /// 3. 无论结果如何都更新 last_run / next_run。
    fn tick(&self, epoch: u64, period: Duration) {
        let mut inner = self.lock();
        if inner.epoch != epoch || inner.task.is_none() {
            return;
        }

        match self.engine.spawn(AnalyzeOptions::default()) {
            Ok(run_id) => info!(%run_id, "Scheduled analysis started"),
            Err(AnalysisError::Busy) => {
                inner.skipped_ticks += 1;
                info!("Previous analysis still running, tick skipped");
            }
            Err(e) => warn!(error = %e, "Scheduled analysis could not start"),
        }

        let now = self.clock.now();
        inner.tick_count += 1;
        inner.last_run = Some(now);
        inner.next_run = after(now, period);
    }
}

fn after(now: DateTime<Utc>, period: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(period)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
}
