//! 시세 데이터 제공자.

pub mod alpha_vantage;

use async_trait::async_trait;

use crate::error::ExtractionError;
use crate::model::{Interval, RawSeries};

pub use alpha_vantage::{AlphaVantageClient, AlphaVantageConfig};

/// 외부 시세 API에서 원본 시계열을 가져오는 trait.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// 심볼의 인트라데이 시계열 조회.
    ///
    /// # Errors
    ///
    /// - `ExtractionError::Http`: 네트워크 실패
    /// - `ExtractionError::RateLimited`: API 호출 한도 초과
    /// - `ExtractionError::Api`: 잘못된 심볼 등 API 거부
    /// - `ExtractionError::NoData`: 시계열이 비어 있음
    async fn fetch(&self, symbol: &str, interval: Interval) -> Result<RawSeries, ExtractionError>;

    /// 로깅용 제공자 이름
    fn provider_name(&self) -> &str;
}
