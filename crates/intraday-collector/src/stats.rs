//! 수집 사이클/실행 통계 구조체.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 심볼 단위 실패 기록
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolFailure {
    pub symbol: String,
    pub error: String,
}

/// 한 번의 수집 사이클 결과.
///
/// 배치 단위로 만들어진 결과를 [`CycleResult::merge`]로 합칩니다.
/// merge는 순서와 무관하게 같은 카운트를 만듭니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleResult {
    /// 사이클 시작 시각
    pub started_at: DateTime<Utc>,
    /// 시도한 심볼 수
    pub attempted: usize,
    /// 성공한 심볼 수
    pub succeeded: usize,
    /// 실패한 심볼 수 (재시도 소진 후)
    pub failed: usize,
    /// 취소되어 시도를 마치지 못한 심볼 수 (attempted에 포함되지 않음)
    #[serde(default)]
    pub skipped: usize,
    /// 저장된 총 레코드 수
    pub records_processed: usize,
    /// 소비된 총 재시도 횟수
    pub retries: u32,
    /// 소요 시간
    pub duration: Duration,
    /// 실패 목록
    pub errors: Vec<SymbolFailure>,
}

impl CycleResult {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            records_processed: 0,
            retries: 0,
            duration: Duration::ZERO,
            errors: Vec::new(),
        }
    }

    pub fn record_success(&mut self, records: usize, retries: u32) {
        self.attempted += 1;
        self.succeeded += 1;
        self.records_processed += records;
        self.retries += retries;
    }

    pub fn record_failure(&mut self, symbol: &str, error: impl Into<String>, retries: u32) {
        self.attempted += 1;
        self.failed += 1;
        self.retries += retries;
        self.errors.push(SymbolFailure {
            symbol: symbol.to_string(),
            error: error.into(),
        });
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    /// 다른 배치 결과를 합칩니다.
    ///
    /// 배치는 순차 실행되므로 소요 시간은 합산, 시작 시각은 더 이른 쪽을 사용합니다.
    pub fn merge(&mut self, other: CycleResult) {
        self.started_at = self.started_at.min(other.started_at);
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.records_processed += other.records_processed;
        self.retries += other.retries;
        self.duration += other.duration;
        self.errors.extend(other.errors);
    }

    /// 시도한 심볼이 있는데 모두 실패한 경우 실패한 사이클.
    pub fn is_failure(&self) -> bool {
        self.attempted > 0 && self.succeeded == 0
    }

    /// 사이클 내 심볼 성공률 (%)
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            (self.succeeded as f64 / self.attempted as f64) * 100.0
        }
    }

    /// 사이클 요약 로그 출력
    pub fn log_summary(&self, iteration: u64) {
        tracing::info!(
            iteration = iteration,
            attempted = self.attempted,
            succeeded = self.succeeded,
            failed = self.failed,
            skipped = self.skipped,
            records = self.records_processed,
            retries = self.retries,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.duration.as_secs_f64()),
            "수집 사이클 완료"
        );

        for failure in &self.errors {
            tracing::warn!(symbol = %failure.symbol, error = %failure.error, "심볼 수집 실패");
        }
    }
}

/// 실행 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTermination {
    /// max_iterations 도달
    Completed,
    /// 외부 중지 요청
    Cancelled,
    /// 연속 실패 임계값 도달
    FailFast,
}

/// 하나의 실행(run) 전체에 대한 누적 통계.
///
/// 진행 중에는 스냅샷으로만 공개되며, 공개된 스냅샷은 수정되지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatistics {
    /// 폴링 전략 이름
    pub strategy: String,
    pub total_iterations: u64,
    pub successful_cycles: u64,
    pub failed_cycles: u64,
    pub total_records_processed: u64,
    pub total_retries: u64,
    /// successful_cycles / total_iterations * 100 (반복 없으면 0)
    pub success_rate: f64,
    pub start_time: DateTime<Utc>,
    /// 실행 종료 전까지 None
    pub end_time: Option<DateTime<Utc>>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub termination: Option<RunTermination>,
}

impl RunStatistics {
    pub fn new(strategy: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            strategy: strategy.into(),
            total_iterations: 0,
            successful_cycles: 0,
            failed_cycles: 0,
            total_records_processed: 0,
            total_retries: 0,
            success_rate: 0.0,
            start_time,
            end_time: None,
            last_cycle_at: None,
            termination: None,
        }
    }

    /// 사이클 결과를 누적합니다.
    pub fn record_cycle(&mut self, cycle: &CycleResult, finished_at: DateTime<Utc>) {
        self.total_iterations += 1;
        if cycle.is_failure() {
            self.failed_cycles += 1;
        } else {
            self.successful_cycles += 1;
        }
        self.total_records_processed += cycle.records_processed as u64;
        self.total_retries += u64::from(cycle.retries);
        self.last_cycle_at = Some(finished_at);
        self.success_rate = self.compute_success_rate();
    }

    pub fn finish(&mut self, termination: RunTermination, end_time: DateTime<Utc>) {
        self.termination = Some(termination);
        self.end_time = Some(end_time);
    }

    fn compute_success_rate(&self) -> f64 {
        if self.total_iterations == 0 {
            0.0
        } else {
            (self.successful_cycles as f64 / self.total_iterations as f64) * 100.0
        }
    }

    /// 실행 요약 로그 출력
    pub fn log_summary(&self) {
        let elapsed = self
            .end_time
            .unwrap_or_else(Utc::now)
            .signed_duration_since(self.start_time);

        tracing::info!(
            strategy = %self.strategy,
            iterations = self.total_iterations,
            successful = self.successful_cycles,
            failed = self.failed_cycles,
            records = self.total_records_processed,
            retries = self.total_retries,
            success_rate = format!("{:.1}%", self.success_rate),
            termination = ?self.termination,
            elapsed = format!("{}s", elapsed.num_seconds()),
            "폴링 실행 종료"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle(succeeded: usize, failed: usize, records: usize) -> CycleResult {
        let mut result = CycleResult::new(Utc::now());
        for _ in 0..succeeded {
            result.record_success(records / succeeded.max(1), 0);
        }
        for i in 0..failed {
            result.record_failure(&format!("SYM{}", i), "boom", 1);
        }
        result
    }

    #[test]
    fn test_merge_is_order_independent() {
        let a = cycle(2, 1, 20);
        let b = cycle(1, 2, 5);

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);

        assert_eq!(ab.attempted, ba.attempted);
        assert_eq!(ab.succeeded, ba.succeeded);
        assert_eq!(ab.failed, ba.failed);
        assert_eq!(ab.records_processed, ba.records_processed);
        assert_eq!(ab.retries, ba.retries);
        assert_eq!(ab.errors.len(), 3);
        assert_eq!(ab.attempted, 6);
    }

    #[test]
    fn test_cycle_failure_requires_all_failed() {
        assert!(cycle(0, 3, 0).is_failure());
        assert!(!cycle(1, 2, 10).is_failure());
        // 시도 없음은 실패가 아님
        assert!(!CycleResult::new(Utc::now()).is_failure());
    }

    #[test]
    fn test_success_rate_partial_failures() {
        let mut stats = RunStatistics::new("continuous", Utc::now());
        assert_eq!(stats.success_rate, 0.0);

        for i in 0..25 {
            let c = if i < 2 { cycle(0, 1, 0) } else { cycle(1, 0, 10) };
            stats.record_cycle(&c, Utc::now());
        }

        assert_eq!(stats.total_iterations, 25);
        assert_eq!(stats.failed_cycles, 2);
        assert!((stats.success_rate - 92.0).abs() < 1e-9);
        assert_eq!(stats.total_records_processed, 230);
    }

    #[test]
    fn test_finish_sets_end_time() {
        let mut stats = RunStatistics::new("adaptive", Utc::now());
        assert!(stats.end_time.is_none());

        stats.finish(RunTermination::Cancelled, Utc::now());

        assert!(stats.end_time.is_some());
        assert_eq!(stats.termination, Some(RunTermination::Cancelled));
    }
}
