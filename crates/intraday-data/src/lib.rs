//! 인트라데이 시세 데이터 계층.
//!
//! 외부 시세 API 추출, 정규화, PostgreSQL 저장을 담당하며
//! 수집 루프에는 [`SymbolIngestor`] 하나로 노출됩니다.

pub mod error;
pub mod model;
pub mod pipeline;
pub mod provider;
pub mod storage;
pub mod transform;

pub use error::{ExtractionError, IngestError, LoadError, TransformError};
pub use model::{
    EtlJobLog, EtlStatus, IntradayBar, Interval, JobStatus, RawBar, RawSeries, SeriesMetadata,
};
pub use pipeline::{EtlPipeline, SymbolIngestor};
pub use provider::{AlphaVantageClient, AlphaVantageConfig, Extractor};
pub use storage::{connect, Loader, PostgresLoader, ETL_STATUS_WINDOW_DAYS};
pub use transform::{IntradayTransformer, Transformer};
