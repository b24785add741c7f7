//! 장중 시세 수집기.
//!
//! 시장 세션을 인식하는 폴링 루프, 시뮬레이션 스트리밍, 세션 기반 잡 스케줄러를 제공합니다.
//! 심볼 단위 ETL은 `intraday-data` 크레이트의 [`SymbolIngestor`](intraday_data::SymbolIngestor)에 위임합니다.
//!
//! # 구성
//!
//! - [`modules::calendar`]: 거래일/세션 판정과 다음 개장·마감 시각 계산
//! - [`modules::polling`]: 연속/장중/적응형 폴링 엔진
//! - [`modules::streaming`]: 백그라운드 스트리밍 워커 시작/중지
//! - [`modules::scheduler`]: 세션 게이트가 걸린 반복 잡
//! - [`service`]: 위 구성요소를 묶은 파사드

pub mod config;
pub mod error;
pub mod modules;
pub mod service;
pub mod stats;

pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
pub use service::{IngestionService, StopAck, StreamAck};
pub use stats::{CycleResult, RunStatistics, RunTermination, SymbolFailure};
