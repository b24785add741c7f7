//! 심볼 단위 ETL 파이프라인.
//!
//! ```text
//! Extractor.fetch ──> Transformer.normalize ──> Loader.upsert
//!                                                    │
//!                                       Loader.record_job (성공/실패 기록)
//! ```

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{IngestError, Result};
use crate::model::{EtlJobLog, Interval, JobStatus};
use crate::provider::Extractor;
use crate::storage::Loader;
use crate::transform::Transformer;

/// 심볼 하나를 수집해서 저장까지 수행하는 trait.
///
/// 수집 루프(폴링/스트리밍/스케줄러)가 의존하는 유일한 데이터 경계입니다.
#[async_trait]
pub trait SymbolIngestor: Send + Sync {
    /// 처리된 레코드 수를 반환합니다.
    async fn ingest_symbol(&self, symbol: &str) -> Result<usize>;
}

/// Extract → Transform → Load 파이프라인.
pub struct EtlPipeline {
    extractor: Arc<dyn Extractor>,
    transformer: Arc<dyn Transformer>,
    loader: Arc<dyn Loader>,
    interval: Interval,
}

impl EtlPipeline {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        transformer: Arc<dyn Transformer>,
        loader: Arc<dyn Loader>,
        interval: Interval,
    ) -> Self {
        Self {
            extractor,
            transformer,
            loader,
            interval,
        }
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    async fn run_stages(&self, symbol: &str) -> Result<(usize, usize)> {
        let raw = self.extractor.fetch(symbol, self.interval).await?;
        let total = raw.time_series.len();

        let bars = self.transformer.normalize(&raw)?;

        let affected = self.loader.upsert(symbol, &bars).await?;
        debug!(symbol = symbol, affected, "upsert 결과");

        Ok((bars.len(), total))
    }

    /// 작업 로그 기록. 실패해도 파이프라인 결과에는 영향을 주지 않습니다.
    async fn log_job(&self, log: EtlJobLog) {
        if let Err(e) = self.loader.record_job(&log).await {
            warn!(job = %log.job_name, error = %e, "ETL 작업 로그 기록 실패");
        }
    }
}

#[async_trait]
impl SymbolIngestor for EtlPipeline {
    async fn ingest_symbol(&self, symbol: &str) -> Result<usize> {
        let started = Instant::now();
        let start_time = Utc::now();
        let job_name = format!("intraday_etl_{}", symbol);

        let result: std::result::Result<(usize, usize), IngestError> =
            self.run_stages(symbol).await;

        match result {
            Ok((records, total)) => {
                info!(
                    symbol = symbol,
                    provider = self.extractor.provider_name(),
                    records,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "ETL 파이프라인 완료"
                );
                self.log_job(EtlJobLog {
                    job_name,
                    status: JobStatus::Success,
                    start_time,
                    end_time: Utc::now(),
                    records_processed: records as i64,
                    total_records: total as i64,
                    error_message: None,
                })
                .await;
                Ok(records)
            }
            Err(e) => {
                warn!(symbol = symbol, stage = e.stage(), error = %e, "ETL 파이프라인 실패");
                self.log_job(EtlJobLog {
                    job_name,
                    status: JobStatus::Failed,
                    start_time,
                    end_time: Utc::now(),
                    records_processed: 0,
                    total_records: 0,
                    error_message: Some(e.to_string()),
                })
                .await;
                Err(e)
            }
        }
    }
}
