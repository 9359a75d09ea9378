use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use stockcheck_core::analysis::entity::{AnalysisResult, RunState};
use stockcheck_core::analysis::error::AnalysisError;
use stockcheck_core::common::time::TimeProvider;
use tracing::warn;
use uuid::Uuid;

/// # Summary
/// 运行状态的只读快照，供状态查询接口使用。
#[derive(Debug, Clone, PartialEq)]
pub struct RunStatus {
    pub state: RunState,
    // 正在运行的任务 ID
    pub current_run: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    // 最近一次成功提交的时间，严格递增
    pub last_analyzed: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    // 成功提交次数
    pub version: u64,
}

impl RunStatus {
    pub fn in_progress(&self) -> bool {
        self.state == RunState::Running
    }
}

struct Inner {
    state: RunState,
    current: Option<(Uuid, DateTime<Utc>)>,
    result: Option<Arc<AnalysisResult>>,
    last_analyzed: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_error_at: Option<DateTime<Utc>>,
    version: u64,
}

/// # Summary
/// 分析结果缓存与运行状态机。
///
/// # Invariants
/// - 同一时刻至多一个 `RunPermit` 存在，`try_begin` 在 Running 状态下返回 `Busy`。
/// - 结果以 `Arc` 整体替换，读者要么看到旧结果，要么看到新结果。
/// - 失败不会修改已缓存的结果。
/// - 锁只在同步代码中短暂持有，读取永远不会等待一个运行结束。
pub struct AnalysisCache {
    inner: RwLock<Inner>,
    clock: Arc<dyn TimeProvider>,
}

impl AnalysisCache {
    pub fn new(clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: RunState::Idle,
                current: None,
                result: None,
                last_analyzed: None,
                last_error: None,
                last_error_at: None,
                version: 0,
            }),
            clock,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// # Summary
    /// 尝试进入 Running 状态。
    ///
    /// # Logic
    /// 1. 在写锁内检查当前状态。
    /// 2. 已在运行则拒绝，否则生成新的运行 ID 并切换到 Running。
    ///
    /// # Returns
    /// 成功返回运行许可，许可被消费或丢弃时状态机离开 Running。
    pub fn try_begin(self: &Arc<Self>) -> Result<RunPermit, AnalysisError> {
        let mut inner = self.write();
        if inner.state == RunState::Running {
            return Err(AnalysisError::Busy);
        }
        let run_id = Uuid::new_v4();
        inner.state = RunState::Running;
        inner.current = Some((run_id, self.clock.now()));
        Ok(RunPermit {
            cache: Arc::clone(self),
            run_id,
            finished: false,
        })
    }

    /// 当前状态快照
    pub fn status(&self) -> RunStatus {
        let inner = self.read();
        RunStatus {
            state: inner.state,
            current_run: inner.current.map(|(id, _)| id),
            started_at: inner.current.map(|(_, at)| at),
            last_analyzed: inner.last_analyzed,
            last_error: inner.last_error.clone(),
            last_error_at: inner.last_error_at,
            version: inner.version,
        }
    }

    /// 最近一次成功的结果，从未成功过时为 None
    pub fn latest(&self) -> Option<Arc<AnalysisResult>> {
        self.read().result.clone()
    }

    pub fn is_running(&self) -> bool {
        self.read().state == RunState::Running
    }

    fn commit_success(&self, run_id: Uuid, mut result: AnalysisResult) -> Arc<AnalysisResult> {
        let mut inner = self.write();
        let stamp = next_stamp(inner.last_analyzed, result.generated_at);
        result.run_id = run_id;
        result.generated_at = stamp;
        let result = Arc::new(result);

        inner.state = RunState::Succeeded;
        inner.current = None;
        inner.result = Some(Arc::clone(&result));
        inner.last_analyzed = Some(stamp);
        inner.last_error = None;
        inner.version += 1;
        result
    }

    fn commit_failure(&self, run_id: Uuid, reason: String) {
        let mut inner = self.write();
        if inner.current.map(|(id, _)| id) != Some(run_id) {
            warn!(%run_id, "Ignoring failure from a run that no longer owns the slot");
            return;
        }
        inner.state = RunState::Failed;
        inner.current = None;
        inner.last_error = Some(reason);
        inner.last_error_at = Some(self.clock.now());
    }
}

/// # Summary
/// 单次运行的独占许可。
///
/// # Invariants
/// - 由 `AnalysisCache::try_begin` 发放，全局至多一个。
/// - `succeed` / `fail` 消费许可；未提交就被丢弃 (任务被取消或 panic) 时记为失败。
pub struct RunPermit {
    cache: Arc<AnalysisCache>,
    run_id: Uuid,
    finished: bool,
}

impl RunPermit {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// # Summary
    /// 提交成功结果。
    ///
    /// # Logic
    /// 1. 写入运行 ID 与严格递增的生成时间。
    /// 2. 原子替换缓存结果，状态切换为 Succeeded。
    ///
    /// # Returns
    /// 已提交的结果。
    pub fn succeed(mut self, result: AnalysisResult) -> Arc<AnalysisResult> {
        self.finished = true;
        self.cache.commit_success(self.run_id, result)
    }

    /// # Summary
    /// 计算本次提交将使用的生成时间。
    ///
    /// # Invariants
    /// - 许可存活期间没有其它提交，因此对同一个 `at` 的返回值与 `succeed` 最终写入的时间一致。
    pub fn commit_stamp(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        next_stamp(self.cache.read().last_analyzed, at)
    }

    /// 记录失败原因，缓存结果保持不变
    pub fn fail(mut self, err: &AnalysisError) {
        self.finished = true;
        self.cache.commit_failure(self.run_id, err.to_string());
    }
}

// 时钟未前进时 (例如虚拟时钟) 仍保证 last_analyzed 严格递增
fn next_stamp(prev: Option<DateTime<Utc>>, at: DateTime<Utc>) -> DateTime<Utc> {
    match prev {
        Some(prev) if at <= prev => prev + Duration::milliseconds(1),
        _ => at,
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        if !self.finished {
            warn!(run_id = %self.run_id, "Analysis run dropped before completion");
            self.cache
                .commit_failure(self.run_id, AnalysisError::Aborted.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stockcheck_core::common::time::FakeClockProvider;

    fn empty_result() -> AnalysisResult {
        AnalysisResult {
            run_id: Uuid::nil(),
            narrative: None,
            generated_at: DateTime::<Utc>::UNIX_EPOCH,
            holdings: Vec::new(),
            fluctuations: Vec::new(),
            earnings: Vec::new(),
            news: Vec::new(),
            total_value: 0.0,
        }
    }

    fn cache() -> Arc<AnalysisCache> {
        let clock = FakeClockProvider::new(Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap());
        Arc::new(AnalysisCache::new(Arc::new(clock)))
    }

    #[test]
    fn test_second_begin_is_busy() {
        let cache = cache();
        let permit = cache.try_begin().unwrap();
        assert!(matches!(cache.try_begin(), Err(AnalysisError::Busy)));
        assert!(cache.status().in_progress());

        permit.succeed(empty_result());
        assert_eq!(cache.status().state, RunState::Succeeded);
        assert!(cache.try_begin().is_ok());
    }

    #[test]
    fn test_failure_keeps_previous_result() {
        let cache = cache();
        let first = cache.try_begin().unwrap().succeed(empty_result());

        cache.try_begin().unwrap().fail(&AnalysisError::NoHoldings);
        let status = cache.status();
        assert_eq!(status.state, RunState::Failed);
        assert_eq!(status.last_error.as_deref(), Some("No holdings configured"));
        assert_eq!(cache.latest().unwrap().run_id, first.run_id);
    }

    #[test]
    fn test_last_analyzed_strictly_increases_with_frozen_clock() {
        let cache = cache();
        let a = cache.try_begin().unwrap().succeed(empty_result());
        let b = cache.try_begin().unwrap().succeed(empty_result());
        assert!(b.generated_at > a.generated_at);
        assert_eq!(cache.status().last_analyzed, Some(b.generated_at));
        assert_eq!(cache.status().version, 2);
    }

    #[test]
    fn test_commit_stamp_matches_committed_time() {
        let cache = cache();
        cache.try_begin().unwrap().succeed(empty_result());

        let permit = cache.try_begin().unwrap();
        let stamp = permit.commit_stamp(DateTime::<Utc>::UNIX_EPOCH);
        let mut result = empty_result();
        result.generated_at = stamp;
        let committed = permit.succeed(result);
        assert_eq!(committed.generated_at, stamp);
        assert_eq!(cache.status().last_analyzed, Some(stamp));
    }

    #[test]
    fn test_dropped_permit_marks_aborted() {
        let cache = cache();
        drop(cache.try_begin().unwrap());
        let status = cache.status();
        assert_eq!(status.state, RunState::Failed);
        assert_eq!(
            status.last_error.as_deref(),
            Some("Analysis aborted before completion")
        );
        assert!(cache.latest().is_none());
    }
}
