//! 폴링 엔진.
//!
//! 설정된 전략에 따라 수집 사이클을 반복 실행하고 실행 통계를 누적합니다.
//!
//! # 반복 순서
//!
//! 1. `max_iterations` 도달 → 종료 (`Completed`)
//! 2. 취소 요청 → 종료 (`Cancelled`)
//! 3. 게이트가 닫혀 있으면 `gate_check_interval`만큼 대기 후 다시 확인
//! 4. `batch_size` 단위 배치 수집 (심볼별 재시도, 실패 격리)
//! 5. 결과 병합 → 통계 반영 → 스냅샷 공개 → 콜백 호출
//! 6. `interval_minutes` 대기 (취소 시 즉시 깨어남). 마지막 반복 뒤에는 대기하지 않음
//!
//! 연속 실패 사이클 수가 `fail_fast_threshold` 이상이면 `FailFast`로 종료합니다.

use std::{fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use intraday_data::SymbolIngestor;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::calendar::MarketCalendar;
use super::ingest::{ingest_batch, RetryPolicy};
use crate::error::CollectorError;
use crate::stats::{CycleResult, RunStatistics, RunTermination};
use crate::Result;

/// 폴링/잡 간격 상한 (분, 1주)
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// 사이클 완료 콜백 (반복 번호, 사이클 결과)
pub type CycleCallback = Arc<dyn Fn(u64, &CycleResult) + Send + Sync>;

/// 사용자 정의 게이트
pub type GateFn = Arc<dyn Fn(DateTime<Utc>) -> bool + Send + Sync>;

/// 실행 통계 스냅샷 채널 송신자
pub type StatsSender = watch::Sender<Option<Arc<RunStatistics>>>;

/// 적응형 폴링 백오프 설정
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AdaptiveBackoff {
    /// 빈 사이클마다 대기 시간에 곱할 배수 (>= 1.0)
    pub factor: f64,
    /// 대기 시간 상한 (분)
    pub max_interval_minutes: u64,
}

impl Default for AdaptiveBackoff {
    fn default() -> Self {
        Self {
            factor: 2.0,
            max_interval_minutes: 60,
        }
    }
}

impl AdaptiveBackoff {
    /// 다음 대기 시간.
    ///
    /// 레코드가 없었으면 `current * factor` (상한 적용), 있었으면 `base`로 복귀합니다.
    pub fn next_interval(&self, current: Duration, base: Duration, records: usize) -> Duration {
        if records > 0 {
            return base;
        }
        let cap = Duration::from_secs(self.max_interval_minutes.saturating_mul(60));
        Duration::try_from_secs_f64(current.as_secs_f64() * self.factor)
            .unwrap_or(cap)
            .min(cap)
    }
}

/// 폴링 설정. [`PollingConfig::builder`]로만 생성되며 생성 후 변경되지 않습니다.
#[derive(Debug, Clone, Serialize)]
pub struct PollingConfig {
    interval_minutes: u64,
    max_iterations: Option<u64>,
    symbols: Vec<String>,
    batch_size: usize,
    retry_on_failure: bool,
    max_retries: u32,
    retry_base_delay: Duration,
    batch_delay: Duration,
    gate_check_interval: Duration,
    fail_fast_threshold: Option<u32>,
    adaptive: AdaptiveBackoff,
}

impl PollingConfig {
    pub fn builder<I, S>(symbols: I) -> PollingConfigBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PollingConfigBuilder::new(symbols.into_iter().map(Into::into).collect())
    }

    pub fn interval_minutes(&self) -> u64 {
        self.interval_minutes
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }

    pub fn max_iterations(&self) -> Option<u64> {
        self.max_iterations
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn retry_on_failure(&self) -> bool {
        self.retry_on_failure
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn batch_delay(&self) -> Duration {
        self.batch_delay
    }

    pub fn gate_check_interval(&self) -> Duration {
        self.gate_check_interval
    }

    pub fn fail_fast_threshold(&self) -> Option<u32> {
        self.fail_fast_threshold
    }

    pub fn adaptive(&self) -> AdaptiveBackoff {
        self.adaptive
    }

    /// 심볼 재시도 정책 (`retry_on_failure = false`면 재시도 없음)
    pub fn retry_policy(&self) -> RetryPolicy {
        if self.retry_on_failure {
            RetryPolicy::new(self.max_retries, self.retry_base_delay)
        } else {
            RetryPolicy::no_retry()
        }
    }
}

/// 실행마다 공유되는 폴링 기본값 (환경변수 설정에서 채워짐).
///
/// 심볼/반복 횟수처럼 실행마다 달라지는 값은 빌더에서 지정합니다.
#[derive(Debug, Clone)]
pub struct PollingSettings {
    pub interval_minutes: u64,
    pub batch_size: usize,
    pub retry_on_failure: bool,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub batch_delay: Duration,
    pub gate_check_interval: Duration,
    pub fail_fast_threshold: Option<u32>,
    pub adaptive: AdaptiveBackoff,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
            batch_size: 10,
            retry_on_failure: true,
            max_retries: 3,
            retry_base_delay: Duration::from_secs(2),
            batch_delay: Duration::from_secs(2),
            gate_check_interval: Duration::from_secs(30),
            fail_fast_threshold: None,
            adaptive: AdaptiveBackoff::default(),
        }
    }
}

impl PollingSettings {
    /// 이 기본값으로 채운 빌더
    pub fn builder<I, S>(&self, symbols: I) -> PollingConfigBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PollingConfigBuilder::with_settings(symbols.into_iter().map(Into::into).collect(), self)
    }
}

/// [`PollingConfig`] 빌더
#[derive(Debug, Clone)]
pub struct PollingConfigBuilder {
    symbols: Vec<String>,
    interval_minutes: u64,
    max_iterations: Option<u64>,
    batch_size: usize,
    retry_on_failure: bool,
    max_retries: u32,
    retry_base_delay: Duration,
    batch_delay: Duration,
    gate_check_interval: Duration,
    fail_fast_threshold: Option<u32>,
    adaptive: AdaptiveBackoff,
}

impl PollingConfigBuilder {
    fn new(symbols: Vec<String>) -> Self {
        Self::with_settings(symbols, &PollingSettings::default())
    }

    fn with_settings(symbols: Vec<String>, settings: &PollingSettings) -> Self {
        Self {
            symbols,
            interval_minutes: settings.interval_minutes,
            max_iterations: None,
            batch_size: settings.batch_size,
            retry_on_failure: settings.retry_on_failure,
            max_retries: settings.max_retries,
            retry_base_delay: settings.retry_base_delay,
            batch_delay: settings.batch_delay,
            gate_check_interval: settings.gate_check_interval,
            fail_fast_threshold: settings.fail_fast_threshold,
            adaptive: settings.adaptive,
        }
    }

    pub fn interval_minutes(mut self, minutes: u64) -> Self {
        self.interval_minutes = minutes;
        self
    }

    pub fn max_iterations(mut self, max: Option<u64>) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn retry_on_failure(mut self, enabled: bool) -> Self {
        self.retry_on_failure = enabled;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    pub fn gate_check_interval(mut self, interval: Duration) -> Self {
        self.gate_check_interval = interval;
        self
    }

    pub fn fail_fast_threshold(mut self, threshold: Option<u32>) -> Self {
        self.fail_fast_threshold = threshold;
        self
    }

    pub fn adaptive(mut self, factor: f64, max_interval_minutes: u64) -> Self {
        self.adaptive = AdaptiveBackoff {
            factor,
            max_interval_minutes,
        };
        self
    }

    /// 검증 후 설정 생성. 심볼은 공백 제거 + 대문자로 정규화됩니다.
    pub fn build(self) -> Result<PollingConfig> {
        let invalid = |msg: String| Err(CollectorError::Config(msg));

        if self.interval_minutes == 0 || self.interval_minutes > MAX_INTERVAL_MINUTES {
            return invalid(format!(
                "interval_minutes는 1~{} 범위여야 합니다: {}",
                MAX_INTERVAL_MINUTES, self.interval_minutes
            ));
        }
        if self.max_iterations == Some(0) {
            return invalid("max_iterations는 0보다 커야 합니다".to_string());
        }
        if self.batch_size == 0 {
            return invalid("batch_size는 0보다 커야 합니다".to_string());
        }
        if self.fail_fast_threshold == Some(0) {
            return invalid("fail_fast_threshold는 0보다 커야 합니다".to_string());
        }
        if !self.adaptive.factor.is_finite() || self.adaptive.factor < 1.0 {
            return invalid(format!(
                "adaptive factor는 1.0 이상의 유한한 값이어야 합니다: {}",
                self.adaptive.factor
            ));
        }
        if self.adaptive.max_interval_minutes > MAX_INTERVAL_MINUTES {
            return invalid(format!(
                "adaptive 최대 간격은 {}분 이하여야 합니다: {}",
                MAX_INTERVAL_MINUTES, self.adaptive.max_interval_minutes
            ));
        }
        if self.adaptive.max_interval_minutes < self.interval_minutes {
            return invalid(format!(
                "adaptive 최대 간격({}분)이 기본 간격({}분)보다 작습니다",
                self.adaptive.max_interval_minutes, self.interval_minutes
            ));
        }
        if self.gate_check_interval.is_zero() {
            return invalid("gate_check_interval은 0보다 커야 합니다".to_string());
        }

        let mut symbols: Vec<String> = Vec::with_capacity(self.symbols.len());
        for raw in &self.symbols {
            let symbol = raw.trim().to_uppercase();
            if symbol.is_empty() {
                return invalid("빈 심볼이 포함되어 있습니다".to_string());
            }
            if symbols.contains(&symbol) {
                return invalid(format!("중복 심볼: {}", symbol));
            }
            symbols.push(symbol);
        }
        if symbols.is_empty() {
            return invalid("심볼 목록이 비어 있습니다".to_string());
        }

        Ok(PollingConfig {
            interval_minutes: self.interval_minutes,
            max_iterations: self.max_iterations,
            symbols,
            batch_size: self.batch_size,
            retry_on_failure: self.retry_on_failure,
            max_retries: self.max_retries,
            retry_base_delay: self.retry_base_delay,
            batch_delay: self.batch_delay,
            gate_check_interval: self.gate_check_interval,
            fail_fast_threshold: self.fail_fast_threshold,
            adaptive: self.adaptive,
        })
    }
}

/// 폴링 전략
#[derive(Clone)]
pub enum PollingStrategy {
    /// 게이트 항상 열림
    Continuous,
    /// 정규장 시간에만 수집
    MarketHours(MarketCalendar),
    /// 게이트 항상 열림, 빈 사이클마다 대기 시간 증가
    Adaptive,
    /// 사용자 정의 게이트
    Custom(GateFn),
}

impl PollingStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Continuous => "continuous",
            Self::MarketHours(_) => "market_hours",
            Self::Adaptive => "adaptive",
            Self::Custom(_) => "custom",
        }
    }

    pub fn gate_open(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Continuous | Self::Adaptive => true,
            Self::MarketHours(calendar) => calendar.is_market_open(now),
            Self::Custom(gate) => gate(now),
        }
    }
}

impl fmt::Debug for PollingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 폴링 엔진
pub struct PollingEngine {
    ingestor: Arc<dyn SymbolIngestor>,
    cancel: CancellationToken,
    on_cycle: Option<CycleCallback>,
    stats_tx: Option<StatsSender>,
}

impl PollingEngine {
    pub fn new(ingestor: Arc<dyn SymbolIngestor>) -> Self {
        Self {
            ingestor,
            cancel: CancellationToken::new(),
            on_cycle: None,
            stats_tx: None,
        }
    }

    /// 외부 취소 토큰 연결
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_cycle_callback(mut self, callback: CycleCallback) -> Self {
        self.on_cycle = Some(callback);
        self
    }

    /// 사이클마다 통계 스냅샷을 이 채널로 공개합니다.
    pub fn with_stats_sender(mut self, tx: StatsSender) -> Self {
        self.stats_tx = Some(tx);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 전략에 따라 실행을 끝까지 수행하고 최종 통계를 반환합니다.
    pub async fn run(&self, config: &PollingConfig, strategy: &PollingStrategy) -> RunStatistics {
        let mut stats = RunStatistics::new(strategy.name(), Utc::now());
        let retry = config.retry_policy();
        let base_interval = config.interval();
        let mut next_interval = base_interval;
        let mut consecutive_failures = 0u32;

        info!(
            strategy = strategy.name(),
            symbols = config.symbols().len(),
            interval_minutes = config.interval_minutes(),
            max_iterations = ?config.max_iterations(),
            batch_size = config.batch_size(),
            "폴링 시작"
        );
        self.publish(&stats);

        let termination = loop {
            if let Some(max) = config.max_iterations() {
                if stats.total_iterations >= max {
                    break RunTermination::Completed;
                }
            }

            if self.cancel.is_cancelled() {
                break RunTermination::Cancelled;
            }

            if !strategy.gate_open(Utc::now()) {
                debug!(strategy = strategy.name(), "게이트 닫힘, 대기");
                if !self.sleep_or_cancel(config.gate_check_interval()).await {
                    break RunTermination::Cancelled;
                }
                continue;
            }

            let iteration = stats.total_iterations + 1;
            let cycle = self.run_cycle(config, &retry).await;

            // 시도를 마친 심볼 없이 취소된 사이클은 반복으로 세지 않음
            if self.cancel.is_cancelled() && cycle.attempted == 0 {
                break RunTermination::Cancelled;
            }

            stats.record_cycle(&cycle, Utc::now());
            cycle.log_summary(iteration);
            self.publish(&stats);

            if let Some(callback) = &self.on_cycle {
                callback(iteration, &cycle);
            }

            if cycle.is_failure() {
                consecutive_failures += 1;
            } else {
                consecutive_failures = 0;
            }

            if let Some(threshold) = config.fail_fast_threshold() {
                if consecutive_failures >= threshold {
                    error!(
                        consecutive_failures,
                        threshold, "연속 실패 임계값 도달, 폴링 중단"
                    );
                    break RunTermination::FailFast;
                }
            }

            if matches!(strategy, PollingStrategy::Adaptive) {
                let previous = next_interval;
                next_interval = config.adaptive().next_interval(
                    next_interval,
                    base_interval,
                    cycle.records_processed,
                );
                if next_interval != previous {
                    info!(
                        interval_secs = next_interval.as_secs(),
                        records = cycle.records_processed,
                        "적응형 폴링 간격 조정"
                    );
                }
            }

            // 마지막 반복 뒤에는 대기하지 않음
            if config.max_iterations().is_some_and(|max| stats.total_iterations >= max) {
                continue;
            }

            debug!(sleep_secs = next_interval.as_secs(), "다음 사이클까지 대기");
            if !self.sleep_or_cancel(next_interval).await {
                break RunTermination::Cancelled;
            }
        };

        stats.finish(termination, Utc::now());
        self.publish(&stats);
        stats.log_summary();

        stats
    }

    /// 스케줄링 없이 한 사이클만 실행합니다.
    pub async fn run_single_cycle(&self, config: &PollingConfig) -> CycleResult {
        let cycle = self.run_cycle(config, &config.retry_policy()).await;
        cycle.log_summary(1);
        cycle
    }

    /// 배치 단위 수집. 배치 사이에는 `batch_delay`만큼 쉬며 취소되면 남은 배치를 건너뜁니다.
    async fn run_cycle(&self, config: &PollingConfig, retry: &RetryPolicy) -> CycleResult {
        let mut batches = config.symbols().chunks(config.batch_size()).peekable();
        let mut result = CycleResult::new(Utc::now());
        let mut batch_no = 0usize;

        while let Some(batch) = batches.next() {
            batch_no += 1;
            debug!(batch = batch_no, symbols = ?batch, "배치 처리");

            let batch_result = ingest_batch(self.ingestor.as_ref(), batch, retry, &self.cancel).await;
            result.merge(batch_result);

            if self.cancel.is_cancelled() {
                debug!("사이클 중 취소 요청, 남은 배치 건너뜀");
                break;
            }

            if batches.peek().is_some() && !config.batch_delay().is_zero() {
                if !self.sleep_or_cancel(config.batch_delay()).await {
                    break;
                }
            }
        }

        result
    }

    /// 취소 가능한 대기. 취소되면 false.
    async fn sleep_or_cancel(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    fn publish(&self, stats: &RunStatistics) {
        if let Some(tx) = &self.stats_tx {
            tx.send_replace(Some(Arc::new(stats.clone())));
        }
    }
}
