//! 저장소 모듈.

pub mod intraday;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::LoadError;
use crate::model::{EtlJobLog, EtlStatus, IntradayBar};

pub use intraday::{connect, PostgresLoader};

/// ETL 상태 집계 기본 기간 (일)
pub const ETL_STATUS_WINDOW_DAYS: i64 = 7;

/// 정규화된 레코드 저장 trait.
#[async_trait]
pub trait Loader: Send + Sync {
    /// 레코드 upsert. 삽입 또는 갱신된 행 수를 반환합니다.
    async fn upsert(&self, symbol: &str, bars: &[IntradayBar]) -> Result<u64, LoadError>;

    /// ETL 작업 로그 기록.
    async fn record_job(&self, log: &EtlJobLog) -> Result<(), LoadError>;

    /// `since` 이후 기록된 ETL 작업 집계.
    async fn etl_status(&self, since: DateTime<Utc>) -> Result<EtlStatus, LoadError>;
}
