//! 원본 시계열을 정규화된 [`IntradayBar`] 레코드로 변환.
//!
//! - 타임스탬프는 API가 보고한 타임존 기준으로 해석한 뒤 UTC로 변환합니다.
//!   타임존 정보가 없거나 알 수 없으면 UTC로 간주합니다.
//! - OHLCV 정합성 검사를 통과하지 못한 행은 경고 후 건너뜁니다.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::TransformError;
use crate::model::{IntradayBar, RawBar, RawSeries};

/// 허용하는 최대 가격
const MAX_PRICE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// 지원하는 타임스탬프 형식
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// 원본 시계열 정규화 trait.
pub trait Transformer: Send + Sync {
    fn normalize(&self, raw: &RawSeries) -> Result<Vec<IntradayBar>, TransformError>;
}

/// Alpha Vantage 응답용 변환기.
#[derive(Debug, Clone, Default)]
pub struct IntradayTransformer;

impl IntradayTransformer {
    pub fn new() -> Self {
        Self
    }

    fn parse_decimal(field: &'static str, value: &str) -> Result<Decimal, TransformError> {
        Decimal::from_str(value.trim()).map_err(|_| TransformError::InvalidNumber {
            field,
            value: value.to_string(),
        })
    }

    fn parse_volume(value: &str) -> Result<i64, TransformError> {
        let trimmed = value.trim();
        trimmed
            .parse::<i64>()
            .or_else(|_| {
                // 일부 응답은 "12345.0" 형태로 옴
                Decimal::from_str(trimmed)
                    .ok()
                    .and_then(|d| i64::try_from(d.trunc()).ok())
                    .ok_or(())
            })
            .map_err(|_| TransformError::InvalidNumber {
                field: "volume",
                value: value.to_string(),
            })
    }

    /// 타임스탬프 문자열을 주어진 타임존 기준으로 해석.
    pub fn parse_timestamp(value: &str, tz: Tz) -> Result<DateTime<Utc>, TransformError> {
        let value = value.trim();

        let naive = TIMESTAMP_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(value, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .ok_or_else(|| TransformError::InvalidTimestamp(value.to_string()))?;

        // DST 전환으로 모호한 시각은 이른 쪽을 사용
        tz.from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| TransformError::InvalidTimestamp(value.to_string()))
    }

    /// OHLCV 정합성 검사.
    pub fn is_valid_bar(open: Decimal, high: Decimal, low: Decimal, close: Decimal, volume: i64) -> bool {
        let prices = [open, high, low, close];

        if prices.iter().any(|p| *p <= Decimal::ZERO || *p > MAX_PRICE) {
            return false;
        }
        if volume < 0 {
            return false;
        }
        if high < open.max(close) {
            return false;
        }
        if low > open.min(close) {
            return false;
        }

        true
    }

    fn convert_bar(
        raw: &RawSeries,
        timestamp: &str,
        bar: &RawBar,
        tz: Tz,
    ) -> Result<Option<IntradayBar>, TransformError> {
        let timestamp = Self::parse_timestamp(timestamp, tz)?;
        let open = Self::parse_decimal("open", &bar.open)?;
        let high = Self::parse_decimal("high", &bar.high)?;
        let low = Self::parse_decimal("low", &bar.low)?;
        let close = Self::parse_decimal("close", &bar.close)?;
        let volume = Self::parse_volume(&bar.volume)?;

        if !Self::is_valid_bar(open, high, low, close, volume) {
            return Ok(None);
        }

        Ok(Some(IntradayBar {
            symbol: raw.symbol.clone(),
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            interval: raw.interval,
        }))
    }
}

impl Transformer for IntradayTransformer {
    fn normalize(&self, raw: &RawSeries) -> Result<Vec<IntradayBar>, TransformError> {
        let tz = raw
            .metadata
            .time_zone
            .as_deref()
            .and_then(|name| name.parse::<Tz>().ok())
            .unwrap_or(Tz::UTC);

        let mut bars = Vec::with_capacity(raw.time_series.len());

        for (timestamp, bar) in &raw.time_series {
            match Self::convert_bar(raw, timestamp, bar, tz) {
                Ok(Some(record)) => bars.push(record),
                Ok(None) => {
                    warn!(symbol = %raw.symbol, timestamp = %timestamp, "비정상 OHLCV 데이터, 건너뜀");
                }
                Err(e) => {
                    warn!(symbol = %raw.symbol, timestamp = %timestamp, error = %e, "가격 데이터 파싱 실패, 건너뜀");
                }
            }
        }

        if bars.is_empty() {
            return Err(TransformError::NoValidRecords {
                symbol: raw.symbol.clone(),
            });
        }

        bars.sort_by_key(|b| b.timestamp);

        debug!(
            symbol = %raw.symbol,
            records = bars.len(),
            skipped = raw.time_series.len() - bars.len(),
            "변환 완료"
        );

        Ok(bars)
    }
}
