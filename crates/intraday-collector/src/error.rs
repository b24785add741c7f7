//! 에러 타입 정의.

use std::fmt;

use intraday_data::{IngestError, LoadError};

/// Collector 에러 타입
#[derive(Debug)]
pub enum CollectorError {
    /// 데이터베이스 에러
    Database(sqlx::Error),
    /// 설정/검증 에러
    Config(String),
    /// 심볼 수집 에러 (추출/변환/저장)
    Ingest(IngestError),
    /// 시장 캘린더 에러 (다음 개장/마감 시각 계산 불가 등)
    Calendar(String),
    /// 스트리밍이 이미 실행 중
    AlreadyRunning,
    /// 스케줄링 에러
    Scheduling(String),
}

impl fmt::Display for CollectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database(e) => write!(f, "Database error: {}", e),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::Ingest(e) => write!(f, "Ingest error: {}", e),
            Self::Calendar(msg) => write!(f, "Market calendar error: {}", msg),
            Self::AlreadyRunning => write!(f, "Streaming is already running"),
            Self::Scheduling(msg) => write!(f, "Scheduling error: {}", msg),
        }
    }
}

impl std::error::Error for CollectorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Database(e) => Some(e),
            Self::Ingest(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for CollectorError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err)
    }
}

impl From<IngestError> for CollectorError {
    fn from(err: IngestError) -> Self {
        Self::Ingest(err)
    }
}

impl From<LoadError> for CollectorError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::Database(e) => Self::Database(e),
            other => Self::Ingest(IngestError::Load(other)),
        }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;
