//! 배치 수집 + 심볼 단위 재시도.
//!
//! 폴링 엔진과 잡 스케줄러가 공유하는 단일 사이클 수집 단위입니다.
//! 한 배치 안의 심볼은 동시에 수집되며, 한 심볼의 실패는 다른 심볼에 영향을 주지 않습니다.

use std::{future::Future, time::Duration};

use chrono::Utc;
use futures::future::join_all;
use intraday_data::{IngestError, SymbolIngestor};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::stats::CycleResult;

/// 재시도 정책.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 최대 재시도 횟수 (초기 시도 제외).
    pub max_retries: u32,
    /// 첫 재시도 전 대기 시간.
    pub base_delay: Duration,
    /// 최대 대기 시간.
    pub max_delay: Duration,
    /// 백오프 배수.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 재시도 없음 (단일 시도).
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Default::default()
        }
    }

    /// `attempt`번째 재시도(0부터) 전 대기 시간.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let multiplier = self
            .backoff_multiplier
            .powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        Duration::try_from_secs_f64(self.base_delay.as_secs_f64() * multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// [`with_retry`] 실행 결과
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// 마지막 시도의 결과 (성공 또는 재시도 소진/불가 에러)
    Finished(Result<T, IngestError>),
    /// 완료된 시도 없이 취소됨
    Cancelled,
}

/// 재시도가 포함된 수집 작업 실행.
///
/// 결과와 함께 실제로 소비한 재시도 횟수를 반환합니다.
/// 재시도 불가능한 에러는 즉시 반환합니다.
///
/// 취소 토큰은 시도 중과 재시도 대기 중 모두 감시합니다. 진행 중인 시도는 다음 중단 지점에서
/// 버려지고, 앞선 시도의 에러가 있으면 그 에러를, 없으면 [`RetryOutcome::Cancelled`]를 반환합니다.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: F,
) -> (RetryOutcome<T>, u32)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, IngestError>>,
{
    let mut attempt = 0;
    let mut last_error: Option<IngestError> = None;

    loop {
        let outcome = if cancel.is_cancelled() {
            None
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = operation() => Some(result),
            }
        };

        let Some(result) = outcome else {
            debug!(retries = attempt, "취소 요청, 시도 중단");
            let outcome = match last_error {
                Some(e) => RetryOutcome::Finished(Err(e)),
                None => RetryOutcome::Cancelled,
            };
            return (outcome, attempt);
        };

        match result {
            Ok(value) => {
                if attempt > 0 {
                    debug!(retries = attempt, "재시도 후 성공");
                }
                return (RetryOutcome::Finished(Ok(value)), attempt);
            }
            Err(e) => {
                if !e.is_retryable() {
                    debug!(error = %e, stage = e.stage(), "재시도 불가능한 에러, 즉시 실패 반환");
                    return (RetryOutcome::Finished(Err(e)), attempt);
                }

                if attempt >= policy.max_retries {
                    warn!(
                        error = %e,
                        retries = attempt,
                        "최대 재시도 횟수 초과"
                    );
                    return (RetryOutcome::Finished(Err(e)), attempt);
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "일시적 에러, 재시도 예정"
                );

                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("재시도 대기 중 취소됨");
                        return (RetryOutcome::Finished(Err(e)), attempt);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }

                last_error = Some(e);
                attempt += 1;
            }
        }
    }
}

/// 한 배치의 심볼을 동시에 수집해 하나의 [`CycleResult`]로 모읍니다.
///
/// 취소되면 아직 끝나지 않은 심볼은 `skipped`로 집계됩니다.
pub async fn ingest_batch(
    ingestor: &dyn SymbolIngestor,
    symbols: &[String],
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> CycleResult {
    let started_at = Utc::now();
    let timer = Instant::now();

    let tasks = symbols.iter().map(|symbol| async move {
        let (outcome, retries) =
            with_retry(policy, cancel, || ingestor.ingest_symbol(symbol)).await;
        (symbol, outcome, retries)
    });

    let mut result = CycleResult::new(started_at);
    for (symbol, outcome, retries) in join_all(tasks).await {
        match outcome {
            RetryOutcome::Finished(Ok(records)) => result.record_success(records, retries),
            RetryOutcome::Finished(Err(e)) => {
                result.record_failure(symbol, e.to_string(), retries)
            }
            RetryOutcome::Cancelled => result.record_skipped(),
        }
    }
    result.duration = timer.elapsed();

    if result.skipped > 0 {
        debug!(skipped = result.skipped, "취소로 건너뛴 심볼");
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use intraday_data::{ExtractionError, TransformError};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// 심볼별로 지정한 횟수만큼 실패한 뒤 성공하는 스텁
    struct FlakyIngestor {
        failures_left: Mutex<HashMap<String, u32>>,
        calls: Mutex<HashMap<String, u32>>,
        retryable: bool,
    }

    impl FlakyIngestor {
        fn new(plan: &[(&str, u32)], retryable: bool) -> Self {
            Self {
                failures_left: Mutex::new(
                    plan.iter().map(|(s, n)| (s.to_string(), *n)).collect(),
                ),
                calls: Mutex::new(HashMap::new()),
                retryable,
            }
        }

        fn calls(&self, symbol: &str) -> u32 {
            self.calls.lock().unwrap().get(symbol).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl SymbolIngestor for FlakyIngestor {
        async fn ingest_symbol(&self, symbol: &str) -> intraday_data::error::Result<usize> {
            *self.calls.lock().unwrap().entry(symbol.to_string()).or_default() += 1;

            let mut failures = self.failures_left.lock().unwrap();
            let left = failures.entry(symbol.to_string()).or_default();
            if *left > 0 {
                *left -= 1;
                let err = if self.retryable {
                    IngestError::Extraction(ExtractionError::RateLimited {
                        symbol: symbol.to_string(),
                        message: "slow down".to_string(),
                    })
                } else {
                    IngestError::Transform(TransformError::NoValidRecords {
                        symbol: symbol.to_string(),
                    })
                };
                return Err(err);
            }
            Ok(10)
        }
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_delay_for_exponential_and_capped() {
        let policy = RetryPolicy::new(5, Duration::from_secs(2));
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(2), Duration::from_secs(8));
        assert_eq!(policy.delay_for(10), Duration::from_secs(60));
        // 지수가 f64 범위를 넘어도 상한으로 수렴
        assert_eq!(policy.delay_for(5_000), Duration::from_secs(60));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_consumes_exact_count() {
        let ingestor = FlakyIngestor::new(&[("AAPL", 2)], true);
        let policy = RetryPolicy::new(2, Duration::from_secs(1));

        let result = ingest_batch(
            &ingestor,
            &symbols(&["AAPL"]),
            &policy,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 0);
        assert_eq!(result.retries, 2);
        assert_eq!(result.records_processed, 10);
        assert_eq!(ingestor.calls("AAPL"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_records_failure() {
        let ingestor = FlakyIngestor::new(&[("AAPL", 5)], true);
        let policy = RetryPolicy::new(2, Duration::from_secs(1));

        let result = ingest_batch(
            &ingestor,
            &symbols(&["AAPL"]),
            &policy,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result.failed, 1);
        assert_eq!(result.retries, 2);
        assert_eq!(result.errors[0].symbol, "AAPL");
        assert!(result.is_failure());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_immediately() {
        let ingestor = FlakyIngestor::new(&[("AAPL", 1)], false);
        let policy = RetryPolicy::new(3, Duration::from_secs(1));

        let result = ingest_batch(
            &ingestor,
            &symbols(&["AAPL"]),
            &policy,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result.failed, 1);
        assert_eq!(result.retries, 0);
        assert_eq!(ingestor.calls("AAPL"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_isolated() {
        let ingestor = FlakyIngestor::new(&[("BAD", 1)], false);

        let result = ingest_batch(
            &ingestor,
            &symbols(&["AAPL", "BAD", "MSFT"]),
            &RetryPolicy::no_retry(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result.attempted, 3);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 1);
        assert_eq!(result.records_processed, 20);
        assert!(!result.is_failure());
    }

    /// 공유 락을 잡은 채 12초씩 걸리는 수집기 (API 호출 간격 제한과 같은 형태)
    struct ThrottledIngestor {
        gate: tokio::sync::Mutex<()>,
        completed: AtomicUsize,
    }

    #[async_trait]
    impl SymbolIngestor for ThrottledIngestor {
        async fn ingest_symbol(&self, _symbol: &str) -> intraday_data::error::Result<usize> {
            let _guard = self.gate.lock().await;
            tokio::time::sleep(Duration::from_secs(12)).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_skips_queued_symbols() {
        let ingestor = ThrottledIngestor {
            gate: tokio::sync::Mutex::new(()),
            completed: AtomicUsize::new(0),
        };
        let batch: Vec<String> = (0..10).map(|i| format!("SYM{}", i)).collect();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = ingest_batch(&ingestor, &batch, &RetryPolicy::no_retry(), &cancel).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(ingestor.completed.load(Ordering::SeqCst), 0);
        assert_eq!(result.skipped, 10);
        assert_eq!(result.attempted, 0);
        assert!(!result.is_failure());
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_makes_no_calls() {
        let ingestor = FlakyIngestor::new(&[], true);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = ingest_batch(
            &ingestor,
            &symbols(&["AAPL", "MSFT"]),
            &RetryPolicy::default(),
            &cancel,
        )
        .await;

        assert_eq!(result.skipped, 2);
        assert_eq!(ingestor.calls("AAPL"), 0);
        assert_eq!(ingestor.calls("MSFT"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_keeps_last_error() {
        let ingestor = FlakyIngestor::new(&[("AAPL", 5)], true);
        let policy = RetryPolicy::new(3, Duration::from_secs(30));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let (outcome, retries) =
            with_retry(&policy, &cancel, || ingestor.ingest_symbol("AAPL")).await;

        assert!(matches!(outcome, RetryOutcome::Finished(Err(_))));
        assert_eq!(retries, 0);
        assert_eq!(ingestor.calls("AAPL"), 1);
    }
}
