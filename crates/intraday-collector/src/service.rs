//! 수집 서비스 파사드.
//!
//! CLI 등 외부 호출자가 쓰는 진입점입니다. 스트리밍 컨트롤러, 폴링 엔진,
//! 잡 스케줄러를 하나의 수집기([`SymbolIngestor`])와 시장 캘린더 위에 묶습니다.
//! 반환 타입은 모두 `Serialize`를 구현합니다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use intraday_data::{
    connect, AlphaVantageClient, EtlPipeline, EtlStatus, IntradayTransformer, Loader,
    PostgresLoader, SymbolIngestor, ETL_STATUS_WINDOW_DAYS,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::CollectorConfig;
use crate::error::CollectorError;
use crate::modules::{
    JobCallback, JobReport, JobScheduler, MarketCalendar, PollingConfig, PollingConfigBuilder,
    PollingEngine, PollingSettings, PollingStrategy, RetryPolicy, SchedulerSnapshot, SessionGate,
    StreamRequest, StreamingController, StreamingStatus,
};
use crate::stats::{CycleResult, RunStatistics};
use crate::Result;

/// 스트리밍 시작 응답
#[derive(Debug, Clone, Serialize)]
pub struct StreamAck {
    pub status: &'static str,
    pub symbols: Vec<String>,
    pub interval_minutes: u64,
    pub max_iterations: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

/// 스트리밍 중지 응답
#[derive(Debug, Clone, Serialize)]
pub struct StopAck {
    /// "stopped" 또는 "not_running"
    pub status: &'static str,
    /// 이번에 중지한 실행, 또는 이미 끝난 마지막 실행의 통계
    pub statistics: Option<RunStatistics>,
    pub timestamp: DateTime<Utc>,
}

/// 수집 서비스
pub struct IngestionService {
    ingestor: Arc<dyn SymbolIngestor>,
    calendar: MarketCalendar,
    settings: PollingSettings,
    streaming: StreamingController,
    scheduler: JobScheduler,
    /// ETL 작업 로그 저장소 (상태 집계용)
    job_log: Option<Arc<dyn Loader>>,
    shutdown: CancellationToken,
}

impl IngestionService {
    pub fn new(
        ingestor: Arc<dyn SymbolIngestor>,
        calendar: MarketCalendar,
        settings: PollingSettings,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let retry = if settings.retry_on_failure {
            RetryPolicy::new(settings.max_retries, settings.retry_base_delay)
        } else {
            RetryPolicy::no_retry()
        };

        Self {
            streaming: StreamingController::new(ingestor.clone(), settings.clone()),
            scheduler: JobScheduler::new(calendar.clone(), ingestor.clone(), retry)
                .with_cancellation(shutdown.child_token()),
            ingestor,
            calendar,
            settings,
            job_log: None,
            shutdown,
        }
    }

    /// ETL 상태 집계에 쓸 작업 로그 저장소 연결
    pub fn with_job_log(mut self, loader: Arc<dyn Loader>) -> Self {
        self.job_log = Some(loader);
        self
    }

    /// 설정으로 Alpha Vantage → PostgreSQL 파이프라인을 구성합니다.
    ///
    /// 테이블이 없으면 생성합니다.
    pub async fn from_config(config: &CollectorConfig) -> Result<Self> {
        let pool = connect(&config.database.url, config.database.max_connections).await?;
        let loader = Arc::new(PostgresLoader::new(pool));
        loader.ensure_schema().await?;

        let extractor = AlphaVantageClient::new(config.alpha_vantage.clone())
            .map_err(intraday_data::IngestError::from)?;

        let pipeline = EtlPipeline::new(
            Arc::new(extractor),
            Arc::new(IntradayTransformer::new()),
            loader.clone(),
            config.interval,
        );
        info!(interval = %config.interval, "수집 파이프라인 구성 완료");

        Ok(Self::new(
            Arc::new(pipeline),
            MarketCalendar::new(config.market.clone()),
            config.polling.clone(),
        )
        .with_job_log(loader))
    }

    pub fn calendar(&self) -> &MarketCalendar {
        &self.calendar
    }

    /// 서비스 기본값으로 채운 폴링 설정 빌더
    pub fn polling_builder<I, S>(&self, symbols: I) -> PollingConfigBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.builder(symbols)
    }

    /// 폴링/스케줄러 종료 토큰. 취소하면 진행 중인 실행이 다음 중단 지점에서 멈춥니다.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    // ------------------------------------------------------------------
    // 스트리밍
    // ------------------------------------------------------------------

    pub fn start_streaming(
        &self,
        symbols: Vec<String>,
        interval_minutes: u64,
        max_iterations: Option<u64>,
    ) -> Result<StreamAck> {
        self.streaming.start(
            StreamRequest::new(symbols.clone(), interval_minutes).max_iterations(max_iterations),
        )?;

        Ok(StreamAck {
            status: "started",
            symbols,
            interval_minutes,
            max_iterations,
            timestamp: Utc::now(),
        })
    }

    pub async fn stop_streaming(&self) -> StopAck {
        match self.streaming.stop().await {
            Some(statistics) => StopAck {
                status: "stopped",
                statistics: Some(statistics),
                timestamp: Utc::now(),
            },
            None => StopAck {
                status: "not_running",
                statistics: self
                    .streaming
                    .latest_statistics()
                    .map(|stats| stats.as_ref().clone()),
                timestamp: Utc::now(),
            },
        }
    }

    /// 대기 없이 스트리밍 취소만 요청 (시그널 경로)
    pub fn request_stop_streaming(&self) -> bool {
        self.streaming.request_stop()
    }

    pub fn get_streaming_status(&self) -> StreamingStatus {
        self.streaming.get_status()
    }

    // ------------------------------------------------------------------
    // 폴링
    // ------------------------------------------------------------------

    fn engine(&self) -> PollingEngine {
        PollingEngine::new(self.ingestor.clone()).with_cancellation(self.shutdown.child_token())
    }

    pub async fn poll(&self, config: &PollingConfig, strategy: &PollingStrategy) -> RunStatistics {
        self.engine().run(config, strategy).await
    }

    pub async fn continuous_polling(&self, config: &PollingConfig) -> RunStatistics {
        self.poll(config, &PollingStrategy::Continuous).await
    }

    pub async fn market_hours_polling(&self, config: &PollingConfig) -> RunStatistics {
        self.poll(config, &PollingStrategy::MarketHours(self.calendar.clone()))
            .await
    }

    pub async fn adaptive_polling(&self, config: &PollingConfig) -> RunStatistics {
        self.poll(config, &PollingStrategy::Adaptive).await
    }

    /// 스케줄링 없이 한 사이클 실행
    pub async fn run_single_cycle<I, S>(&self, symbols: I) -> Result<CycleResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let config = self.settings.builder(symbols).max_iterations(Some(1)).build()?;
        Ok(self.engine().run_single_cycle(&config).await)
    }

    // ------------------------------------------------------------------
    // 잡 스케줄러
    // ------------------------------------------------------------------

    pub fn schedule_job(
        &self,
        name: &str,
        symbols: Vec<String>,
        interval_minutes: u64,
        gate: SessionGate,
    ) -> Result<()> {
        self.scheduler
            .schedule(name, symbols, interval_minutes, gate, Utc::now())
    }

    /// 실행될 때마다 `callback(잡 이름, 결과)`을 호출하는 잡 등록
    pub fn schedule_job_with_callback(
        &self,
        name: &str,
        symbols: Vec<String>,
        interval_minutes: u64,
        gate: SessionGate,
        callback: JobCallback,
    ) -> Result<()> {
        self.scheduler.schedule_with_callback(
            name,
            symbols,
            interval_minutes,
            gate,
            Some(callback),
            Utc::now(),
        )
    }

    pub fn schedule_market_hours_job(
        &self,
        name: &str,
        symbols: Vec<String>,
        interval_minutes: u64,
    ) -> Result<()> {
        self.schedule_job(name, symbols, interval_minutes, SessionGate::MarketHours)
    }

    pub fn schedule_pre_market_job(
        &self,
        name: &str,
        symbols: Vec<String>,
        interval_minutes: u64,
    ) -> Result<()> {
        self.schedule_job(name, symbols, interval_minutes, SessionGate::PreMarket)
    }

    pub fn schedule_after_hours_job(
        &self,
        name: &str,
        symbols: Vec<String>,
        interval_minutes: u64,
    ) -> Result<()> {
        self.schedule_job(name, symbols, interval_minutes, SessionGate::AfterHours)
    }

    pub fn remove_scheduled_job(&self, name: &str) -> bool {
        self.scheduler.remove_job(name)
    }

    pub async fn run_scheduled_jobs(&self) -> Vec<JobReport> {
        self.scheduler.run_due_jobs(Utc::now()).await
    }

    pub fn get_scheduled_jobs(&self) -> Result<SchedulerSnapshot> {
        self.scheduler.get_scheduled_jobs(Utc::now())
    }

    /// 종료 토큰이 취소될 때까지 잡 스케줄러 실행
    pub async fn run_scheduler(&self, tick: std::time::Duration) {
        self.scheduler.run_until_cancelled(tick, &self.shutdown).await;
    }

    // ------------------------------------------------------------------
    // ETL 상태
    // ------------------------------------------------------------------

    /// 최근 ETL_STATUS_WINDOW_DAYS일 동안의 작업 로그 집계
    pub async fn etl_status(&self) -> Result<EtlStatus> {
        let loader = self.job_log.as_ref().ok_or_else(|| {
            CollectorError::Config("ETL 작업 로그 저장소가 연결되지 않았습니다".to_string())
        })?;
        let since = Utc::now() - chrono::Duration::days(ETL_STATUS_WINDOW_DAYS);
        Ok(loader.etl_status(since).await?)
    }

    /// 스트리밍 중지 + 진행 중인 폴링/스케줄러 취소
    pub async fn shutdown(&self) -> StopAck {
        self.shutdown.cancel();
        self.stop_streaming().await
    }
}
