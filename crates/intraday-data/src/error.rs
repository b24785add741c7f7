//! 데이터 계층 에러 타입.
//!
//! ETL 단계별로 에러를 분리하고, 심볼 단위 파이프라인은 [`IngestError`]로 묶어서 반환합니다.
//! 재시도 여부 판단(`is_retryable`)은 수집 루프의 재시도 정책에서 사용합니다.

use thiserror::Error;

/// 시세 API 추출 에러.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// 네트워크/HTTP 전송 실패
    #[error("HTTP 요청 실패: {0}")]
    Http(#[from] reqwest::Error),

    /// API가 요청을 거부함 (잘못된 심볼 등)
    #[error("API 에러 [{symbol}]: {message}")]
    Api { symbol: String, message: String },

    /// Rate limit 초과
    #[error("Rate limit 초과 [{symbol}]: {message}")]
    RateLimited { symbol: String, message: String },

    /// 시계열 데이터 없음
    #[error("시계열 데이터 없음: {symbol}")]
    NoData { symbol: String },

    /// 응답 파싱 실패
    #[error("응답 파싱 실패: {0}")]
    Parse(String),
}

impl ExtractionError {
    /// 일시적인 오류인지 여부.
    ///
    /// 네트워크 오류와 Rate limit만 재시도 대상입니다.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::RateLimited { .. })
    }
}

/// 원본 데이터 변환 에러.
#[derive(Debug, Error)]
pub enum TransformError {
    /// 타임스탬프 형식 오류
    #[error("잘못된 타임스탬프 형식: {0}")]
    InvalidTimestamp(String),

    /// 숫자 필드 파싱 실패
    #[error("숫자 파싱 실패 ({field}): {value}")]
    InvalidNumber { field: &'static str, value: String },

    /// 유효한 레코드가 하나도 없음
    #[error("유효한 가격 레코드 없음: {symbol}")]
    NoValidRecords { symbol: String },
}

/// 저장 에러.
#[derive(Debug, Error)]
pub enum LoadError {
    /// 데이터베이스 에러
    #[error("데이터베이스 에러: {0}")]
    Database(#[from] sqlx::Error),

    /// 저장 대상 검증 실패
    #[error("저장 불가: {0}")]
    Rejected(String),
}

/// 심볼 단위 ETL 파이프라인 에러.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

impl IngestError {
    /// 재시도 가능 여부.
    ///
    /// 변환 에러는 같은 입력에 대해 항상 같은 결과를 내므로 재시도하지 않습니다.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Extraction(e) => e.is_retryable(),
            Self::Transform(_) => false,
            Self::Load(LoadError::Database(_)) => true,
            Self::Load(LoadError::Rejected(_)) => false,
        }
    }

    /// 로그/리포트용 단계 이름.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Extraction(_) => "extract",
            Self::Transform(_) => "transform",
            Self::Load(_) => "load",
        }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, IngestError>;
