//! 시장 세션 기반 잡 스케줄러.
//!
//! 이름으로 구분되는 수집 잡을 등록해 두고, 호출 시점의 세션 게이트와 실행 주기를 보고
//! 실행 여부를 결정합니다. 잡 상태는 메모리에만 있으며 재시작 시 사라집니다.
//!
//! 잡은 등록 순서대로 평가되며 각 잡은 별도 태스크에서 실행되어
//! 한 잡의 패닉이 다음 잡 평가를 막지 않습니다.

use std::{
    collections::BTreeMap,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::{DateTime, Utc};
use intraday_data::SymbolIngestor;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::calendar::{MarketCalendar, MarketStatusReport};
use super::ingest::{ingest_batch, RetryPolicy};
use super::polling::MAX_INTERVAL_MINUTES;
use crate::error::CollectorError;
use crate::stats::CycleResult;
use crate::Result;

/// 잡 실행을 허용하는 세션
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionGate {
    PreMarket,
    MarketHours,
    AfterHours,
    /// 세션과 무관하게 항상 실행
    #[serde(rename = "none")]
    Always,
}

impl SessionGate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreMarket => "pre_market",
            Self::MarketHours => "market_hours",
            Self::AfterHours => "after_hours",
            Self::Always => "none",
        }
    }

    pub fn is_open(&self, calendar: &MarketCalendar, now: DateTime<Utc>) -> bool {
        match self {
            Self::PreMarket => calendar.is_pre_market(now),
            Self::MarketHours => calendar.is_market_open(now),
            Self::AfterHours => calendar.is_after_hours(now),
            Self::Always => true,
        }
    }
}

/// 잡 완료 콜백. 잡 이름과 사이클 결과를 받습니다.
///
/// 콜백의 패닉은 잡 결과에 영향을 주지 않습니다.
#[derive(Clone)]
pub struct JobCallback(Arc<dyn Fn(&str, &CycleResult) + Send + Sync>);

impl JobCallback {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str, &CycleResult) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    /// 패닉이면 false
    fn invoke(&self, job_name: &str, result: &CycleResult) -> bool {
        catch_unwind(AssertUnwindSafe(|| (self.0)(job_name, result))).is_ok()
    }
}

impl fmt::Debug for JobCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JobCallback")
    }
}

/// 등록된 잡
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledJob {
    pub name: String,
    pub symbols: Vec<String>,
    pub interval_minutes: u64,
    pub session_gate: SessionGate,
    pub last_run: Option<DateTime<Utc>>,
    pub next_due: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub run_count: u64,
    /// 콜백 등록 여부만 노출
    #[serde(rename = "has_callback", serialize_with = "serialize_has_callback")]
    pub callback: Option<JobCallback>,
}

fn serialize_has_callback<S>(
    callback: &Option<JobCallback>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_bool(callback.is_some())
}

/// 건너뜀 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    GateClosed,
    NotDue,
}

/// 잡 1회 평가 결과
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Executed { result: CycleResult },
    Skipped { reason: SkipReason },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub name: String,
    pub outcome: JobOutcome,
    pub evaluated_at: DateTime<Utc>,
}

/// 스케줄러 조회 결과
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerSnapshot {
    pub total_jobs: usize,
    pub jobs: BTreeMap<String, ScheduledJob>,
    pub current_time: DateTime<Utc>,
    pub market_status: MarketStatusReport,
}

/// 잡 스케줄러
pub struct JobScheduler {
    calendar: MarketCalendar,
    ingestor: Arc<dyn SymbolIngestor>,
    retry: RetryPolicy,
    cancel: CancellationToken,
    /// 등록 순서 유지
    jobs: Mutex<Vec<ScheduledJob>>,
}

impl JobScheduler {
    pub fn new(
        calendar: MarketCalendar,
        ingestor: Arc<dyn SymbolIngestor>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            calendar,
            ingestor,
            retry,
            cancel: CancellationToken::new(),
            jobs: Mutex::new(Vec::new()),
        }
    }

    /// 재시도 대기를 끊을 취소 토큰 연결
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn calendar(&self) -> &MarketCalendar {
        &self.calendar
    }

    fn lock_jobs(&self) -> MutexGuard<'_, Vec<ScheduledJob>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 잡 등록.
    ///
    /// 같은 이름이 있으면 등록 위치는 유지하고 내용을 덮어쓰며 실행 이력은 초기화됩니다.
    /// 새 잡은 `now`부터 실행 대상입니다.
    pub fn schedule<I, S>(
        &self,
        name: &str,
        symbols: I,
        interval_minutes: u64,
        session_gate: SessionGate,
        now: DateTime<Utc>,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schedule_with_callback(name, symbols, interval_minutes, session_gate, None, now)
    }

    /// 완료 콜백과 함께 잡 등록. 콜백은 잡이 실행될 때마다 호출됩니다.
    pub fn schedule_with_callback<I, S>(
        &self,
        name: &str,
        symbols: I,
        interval_minutes: u64,
        session_gate: SessionGate,
        callback: Option<JobCallback>,
        now: DateTime<Utc>,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.trim();
        if name.is_empty() {
            return Err(CollectorError::Scheduling("잡 이름이 비어 있습니다".to_string()));
        }
        if interval_minutes == 0 || interval_minutes > MAX_INTERVAL_MINUTES {
            return Err(CollectorError::Scheduling(format!(
                "잡 '{}': interval_minutes는 1..={} 범위여야 합니다 (입력: {})",
                name, MAX_INTERVAL_MINUTES, interval_minutes
            )));
        }

        let mut normalized: Vec<String> = Vec::new();
        for symbol in symbols {
            let symbol = symbol.into().trim().to_uppercase();
            if !symbol.is_empty() && !normalized.contains(&symbol) {
                normalized.push(symbol);
            }
        }
        if normalized.is_empty() {
            return Err(CollectorError::Scheduling(format!(
                "잡 '{}': 심볼 목록이 비어 있습니다",
                name
            )));
        }

        let job = ScheduledJob {
            name: name.to_string(),
            symbols: normalized,
            interval_minutes,
            session_gate,
            last_run: None,
            next_due: now,
            created_at: now,
            run_count: 0,
            callback,
        };

        let mut jobs = self.lock_jobs();
        if let Some(existing) = jobs.iter_mut().find(|j| j.name == name) {
            warn!(job = name, "기존 잡을 덮어씁니다");
            *existing = job;
        } else {
            info!(
                job = name,
                gate = session_gate.as_str(),
                symbols = job.symbols.len(),
                interval_minutes,
                "잡 등록"
            );
            jobs.push(job);
        }

        Ok(())
    }

    pub fn schedule_pre_market_job<I, S>(
        &self,
        name: &str,
        symbols: I,
        interval_minutes: u64,
        now: DateTime<Utc>,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schedule(name, symbols, interval_minutes, SessionGate::PreMarket, now)
    }

    pub fn schedule_market_hours_job<I, S>(
        &self,
        name: &str,
        symbols: I,
        interval_minutes: u64,
        now: DateTime<Utc>,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schedule(name, symbols, interval_minutes, SessionGate::MarketHours, now)
    }

    pub fn schedule_after_hours_job<I, S>(
        &self,
        name: &str,
        symbols: I,
        interval_minutes: u64,
        now: DateTime<Utc>,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schedule(name, symbols, interval_minutes, SessionGate::AfterHours, now)
    }

    /// 잡 삭제. 없으면 false.
    pub fn remove_job(&self, name: &str) -> bool {
        let mut jobs = self.lock_jobs();
        let before = jobs.len();
        jobs.retain(|j| j.name != name);
        let removed = jobs.len() != before;

        if removed {
            info!(job = name, "잡 삭제");
        } else {
            warn!(job = name, "삭제할 잡이 없습니다");
        }
        removed
    }

    pub fn clear(&self) {
        self.lock_jobs().clear();
    }

    /// 등록 순서대로 잡 목록 복사본
    pub fn jobs(&self) -> Vec<ScheduledJob> {
        self.lock_jobs().clone()
    }

    /// 실행 시점이 된 잡을 등록 순서대로 실행합니다.
    ///
    /// 게이트가 닫혔거나 아직 주기가 오지 않은 잡은 건너뜀으로 보고합니다.
    /// 잡 목록 잠금은 수집 중에 잡지 않습니다.
    pub async fn run_due_jobs(&self, now: DateTime<Utc>) -> Vec<JobReport> {
        let jobs = self.jobs();
        if jobs.is_empty() {
            debug!("등록된 잡 없음");
            return Vec::new();
        }

        let mut reports = Vec::with_capacity(jobs.len());

        for job in jobs {
            let outcome = if !job.session_gate.is_open(&self.calendar, now) {
                debug!(job = %job.name, gate = job.session_gate.as_str(), "게이트 닫힘, 건너뜀");
                JobOutcome::Skipped {
                    reason: SkipReason::GateClosed,
                }
            } else if now < job.next_due {
                debug!(job = %job.name, next_due = %job.next_due, "실행 시각 전, 건너뜀");
                JobOutcome::Skipped {
                    reason: SkipReason::NotDue,
                }
            } else {
                self.execute(&job, now).await
            };

            reports.push(JobReport {
                name: job.name,
                outcome,
                evaluated_at: now,
            });
        }

        reports
    }

    async fn execute(&self, job: &ScheduledJob, now: DateTime<Utc>) -> JobOutcome {
        info!(job = %job.name, symbols = job.symbols.len(), "잡 실행");

        let ingestor = self.ingestor.clone();
        let symbols = job.symbols.clone();
        let retry = self.retry.clone();
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            ingest_batch(ingestor.as_ref(), &symbols, &retry, &cancel).await
        });

        match handle.await {
            Ok(result) => {
                self.mark_run(job, now);
                info!(
                    job = %job.name,
                    succeeded = result.succeeded,
                    failed = result.failed,
                    records = result.records_processed,
                    "잡 완료"
                );
                if let Some(callback) = &job.callback {
                    if !callback.invoke(&job.name, &result) {
                        error!(job = %job.name, "잡 콜백 패닉, 무시하고 계속");
                    }
                }
                JobOutcome::Executed { result }
            }
            Err(e) => {
                error!(job = %job.name, error = %e, "잡 실행 실패");
                JobOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// 실행 이력 갱신. 실행 중 같은 이름으로 재등록되었으면 새 등록을 유지합니다.
    fn mark_run(&self, executed: &ScheduledJob, now: DateTime<Utc>) {
        let mut jobs = self.lock_jobs();
        if let Some(job) = jobs
            .iter_mut()
            .find(|j| j.name == executed.name && j.created_at == executed.created_at)
        {
            job.last_run = Some(now);
            job.next_due = i64::try_from(job.interval_minutes)
                .ok()
                .and_then(chrono::Duration::try_minutes)
                .and_then(|interval| now.checked_add_signed(interval))
                .unwrap_or_else(|| {
                    warn!(job = %job.name, "다음 실행 시각 계산 범위 초과");
                    DateTime::<Utc>::MAX_UTC
                });
            job.run_count += 1;
        }
    }

    /// 잡 목록 + 현재 시장 상태
    pub fn get_scheduled_jobs(&self, now: DateTime<Utc>) -> Result<SchedulerSnapshot> {
        let market_status = self.calendar.status(now)?;
        let jobs: BTreeMap<String, ScheduledJob> = self
            .lock_jobs()
            .iter()
            .map(|j| (j.name.clone(), j.clone()))
            .collect();

        Ok(SchedulerSnapshot {
            total_jobs: jobs.len(),
            jobs,
            current_time: now,
            market_status,
        })
    }

    /// 취소될 때까지 `tick`마다 [`run_due_jobs`](Self::run_due_jobs) 실행 (데몬 모드).
    pub async fn run_until_cancelled(&self, tick: Duration, cancel: &CancellationToken) {
        info!(tick_secs = tick.as_secs(), jobs = self.lock_jobs().len(), "스케줄러 시작");

        loop {
            let reports = self.run_due_jobs(Utc::now()).await;
            let executed = reports
                .iter()
                .filter(|r| matches!(r.outcome, JobOutcome::Executed { .. }))
                .count();
            if executed > 0 {
                info!(executed, total = reports.len(), "스케줄 틱 처리");
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(tick) => {}
            }
        }

        info!("스케줄러 종료");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::calendar::MarketSchedule;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingIngestor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SymbolIngestor for CountingIngestor {
        async fn ingest_symbol(&self, symbol: &str) -> intraday_data::error::Result<usize> {
            if symbol == "BOOM" {
                panic!("ingestor exploded");
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        }
    }

    fn scheduler() -> (JobScheduler, Arc<CountingIngestor>) {
        let ingestor = Arc::new(CountingIngestor {
            calls: AtomicUsize::new(0),
        });
        let scheduler = JobScheduler::new(
            MarketCalendar::new(MarketSchedule::default()),
            ingestor.clone(),
            RetryPolicy::no_retry(),
        );
        (scheduler, ingestor)
    }

    fn monday(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, h, m, s).unwrap()
    }

    fn outcome<'a>(reports: &'a [JobReport], name: &str) -> &'a JobOutcome {
        &reports.iter().find(|r| r.name == name).unwrap().outcome
    }

    #[tokio::test]
    async fn test_rapid_second_call_is_not_due() {
        let (scheduler, ingestor) = scheduler();
        let now = monday(10, 0, 0);
        scheduler
            .schedule_market_hours_job("intraday", ["AAPL", "MSFT"], 5, now)
            .unwrap();

        let first = scheduler.run_due_jobs(now).await;
        assert!(matches!(
            outcome(&first, "intraday"),
            JobOutcome::Executed { result } if result.records_processed == 14
        ));

        let second = scheduler.run_due_jobs(monday(10, 0, 1)).await;
        assert!(matches!(
            outcome(&second, "intraday"),
            JobOutcome::Skipped { reason: SkipReason::NotDue }
        ));
        assert_eq!(ingestor.calls.load(Ordering::SeqCst), 2);

        // 주기가 지나면 다시 실행
        let third = scheduler.run_due_jobs(monday(10, 5, 0)).await;
        assert!(matches!(outcome(&third, "intraday"), JobOutcome::Executed { .. }));

        let job = &scheduler.jobs()[0];
        assert_eq!(job.run_count, 2);
        assert_eq!(job.last_run, Some(monday(10, 5, 0)));
        assert_eq!(job.next_due, monday(10, 10, 0));
    }

    #[tokio::test]
    async fn test_closed_gate_never_ingests() {
        let (scheduler, ingestor) = scheduler();
        let now = monday(10, 0, 0);
        scheduler.schedule_pre_market_job("pre", ["AAPL"], 15, now).unwrap();
        scheduler.schedule_after_hours_job("after", ["AAPL"], 15, now).unwrap();

        let reports = scheduler.run_due_jobs(now).await;

        for name in ["pre", "after"] {
            assert!(matches!(
                outcome(&reports, name),
                JobOutcome::Skipped { reason: SkipReason::GateClosed }
            ));
        }
        assert_eq!(ingestor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reports_follow_registration_order() {
        let (scheduler, _) = scheduler();
        let now = monday(10, 0, 0);
        scheduler.schedule("b", ["AAPL"], 5, SessionGate::Always, now).unwrap();
        scheduler.schedule("a", ["MSFT"], 5, SessionGate::Always, now).unwrap();
        scheduler.schedule("c", ["TSLA"], 5, SessionGate::PreMarket, now).unwrap();

        let reports = scheduler.run_due_jobs(now).await;
        let names: Vec<&str> = reports.iter().map(|r| r.name.as_str()).collect();

        assert_eq!(names, ["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_reschedule_resets_history_and_keeps_position() {
        let (scheduler, _) = scheduler();
        let now = monday(10, 0, 0);
        scheduler.schedule("first", ["AAPL"], 5, SessionGate::Always, now).unwrap();
        scheduler.schedule("second", ["MSFT"], 5, SessionGate::Always, now).unwrap();
        scheduler.run_due_jobs(now).await;

        let later = monday(10, 1, 0);
        scheduler
            .schedule("first", ["GOOGL"], 30, SessionGate::MarketHours, later)
            .unwrap();

        let jobs = scheduler.jobs();
        assert_eq!(jobs[0].name, "first");
        assert_eq!(jobs[0].symbols, ["GOOGL"]);
        assert_eq!(jobs[0].last_run, None);
        assert_eq!(jobs[0].next_due, later);
        assert_eq!(jobs[0].run_count, 0);

        let reports = scheduler.run_due_jobs(later).await;
        assert!(matches!(outcome(&reports, "first"), JobOutcome::Executed { .. }));
        assert!(matches!(
            outcome(&reports, "second"),
            JobOutcome::Skipped { reason: SkipReason::NotDue }
        ));
    }

    #[tokio::test]
    async fn test_panicking_job_is_isolated() {
        let (scheduler, ingestor) = scheduler();
        let now = monday(10, 0, 0);
        scheduler.schedule("bad", ["BOOM"], 5, SessionGate::Always, now).unwrap();
        scheduler.schedule("good", ["AAPL"], 5, SessionGate::Always, now).unwrap();

        let reports = scheduler.run_due_jobs(now).await;

        assert!(matches!(outcome(&reports, "bad"), JobOutcome::Failed { .. }));
        assert!(matches!(outcome(&reports, "good"), JobOutcome::Executed { .. }));
        assert_eq!(ingestor.calls.load(Ordering::SeqCst), 1);
        // 실패한 잡은 다음 호출에서 다시 시도
        assert_eq!(scheduler.jobs()[0].last_run, None);
    }

    #[tokio::test]
    async fn test_remove_and_snapshot() {
        let (scheduler, _) = scheduler();
        let now = monday(10, 0, 0);
        scheduler.schedule_market_hours_job("a", ["AAPL"], 5, now).unwrap();
        scheduler.schedule_after_hours_job("b", ["MSFT"], 15, now).unwrap();

        assert!(scheduler.remove_job("a"));
        assert!(!scheduler.remove_job("a"));

        let snapshot = scheduler.get_scheduled_jobs(now).unwrap();
        assert_eq!(snapshot.total_jobs, 1);
        assert!(snapshot.jobs.contains_key("b"));
        assert!(snapshot.market_status.is_market_open);
        assert_eq!(snapshot.market_status.next_market_close, monday(16, 0, 0));

        scheduler.clear();
        assert!(scheduler.jobs().is_empty());
    }

    #[test]
    fn test_schedule_validation() {
        let (scheduler, _) = scheduler();
        let now = monday(10, 0, 0);

        assert!(scheduler.schedule("", ["AAPL"], 5, SessionGate::Always, now).is_err());
        assert!(scheduler.schedule("x", ["AAPL"], 0, SessionGate::Always, now).is_err());
        assert!(matches!(
            scheduler.schedule("x", ["AAPL"], u64::MAX, SessionGate::Always, now),
            Err(CollectorError::Scheduling(_))
        ));
        assert!(scheduler
            .schedule("x", ["AAPL"], MAX_INTERVAL_MINUTES + 1, SessionGate::Always, now)
            .is_err());
        assert!(scheduler
            .schedule("x", Vec::<String>::new(), 5, SessionGate::Always, now)
            .is_err());
        assert!(scheduler.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_longest_interval_schedules_next_run() {
        let (scheduler, _) = scheduler();
        let now = monday(10, 0, 0);
        scheduler
            .schedule("weekly", ["AAPL"], MAX_INTERVAL_MINUTES, SessionGate::Always, now)
            .unwrap();

        let reports = scheduler.run_due_jobs(now).await;

        assert!(matches!(outcome(&reports, "weekly"), JobOutcome::Executed { .. }));
        assert_eq!(scheduler.jobs()[0].next_due, monday(10, 0, 0) + chrono::Duration::days(7));
    }

    #[tokio::test]
    async fn test_callback_receives_job_result() {
        let (scheduler, _) = scheduler();
        let now = monday(10, 0, 0);
        let seen: Arc<Mutex<Vec<(String, usize)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        scheduler
            .schedule_with_callback(
                "intraday",
                ["AAPL", "MSFT"],
                5,
                SessionGate::Always,
                Some(JobCallback::new(move |name: &str, result: &CycleResult| {
                    sink.lock()
                        .unwrap()
                        .push((name.to_string(), result.records_processed));
                })),
                now,
            )
            .unwrap();

        scheduler.run_due_jobs(now).await;
        // 실행되지 않은 틱에는 호출되지 않음
        scheduler.run_due_jobs(monday(10, 1, 0)).await;

        assert_eq!(*seen.lock().unwrap(), vec![("intraday".to_string(), 14)]);
        let json = serde_json::to_value(&scheduler.jobs()[0]).unwrap();
        assert_eq!(json["has_callback"], true);
    }

    #[tokio::test]
    async fn test_panicking_callback_is_isolated() {
        let (scheduler, ingestor) = scheduler();
        let now = monday(10, 0, 0);
        scheduler
            .schedule_with_callback(
                "noisy",
                ["AAPL"],
                5,
                SessionGate::Always,
                Some(JobCallback::new(|_: &str, _: &CycleResult| {
                    panic!("callback exploded");
                })),
                now,
            )
            .unwrap();
        scheduler.schedule("next", ["MSFT"], 5, SessionGate::Always, now).unwrap();

        let reports = scheduler.run_due_jobs(now).await;

        assert!(matches!(outcome(&reports, "noisy"), JobOutcome::Executed { .. }));
        assert!(matches!(outcome(&reports, "next"), JobOutcome::Executed { .. }));
        assert_eq!(ingestor.calls.load(Ordering::SeqCst), 2);
        // 콜백이 실패해도 실행 이력은 기록됨
        assert_eq!(scheduler.jobs()[0].run_count, 1);
    }
}
