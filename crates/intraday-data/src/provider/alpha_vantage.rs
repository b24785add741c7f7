//! Alpha Vantage 인트라데이 시세 수집기.
//!
//! `TIME_SERIES_INTRADAY` 엔드포인트를 호출합니다.
//! 무료 플랜은 분당 5회 호출 제한이 있으므로 호출 간 최소 간격을 클라이언트에서 강제합니다.
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! let client = AlphaVantageClient::new(AlphaVantageConfig::new("API_KEY"))?;
//! let series = client.fetch("AAPL", Interval::M5).await?;
//! ```

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::Extractor;
use crate::error::ExtractionError;
use crate::model::{Interval, RawBar, RawSeries, SeriesMetadata};

/// 기본 API 주소
pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";

// ============================================================================
// 설정
// ============================================================================

#[derive(Clone)]
pub struct AlphaVantageConfig {
    pub api_key: String,
    pub base_url: String,
    /// 호출 간 최소 간격 (무료 플랜: 60초 / 5회 = 12초)
    pub rate_limit_delay: Duration,
    /// 요청 타임아웃
    pub request_timeout: Duration,
}

impl std::fmt::Debug for AlphaVantageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlphaVantageConfig")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("rate_limit_delay", &self.rate_limit_delay)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl AlphaVantageConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            rate_limit_delay: Duration::from_secs(12),
            request_timeout: Duration::from_secs(30),
        }
    }
}

// ============================================================================
// 클라이언트
// ============================================================================

/// Alpha Vantage API 클라이언트.
pub struct AlphaVantageClient {
    client: Client,
    config: AlphaVantageConfig,
    /// 마지막 호출 시각 (Rate limit 용)
    last_call: Mutex<Option<Instant>>,
}

impl AlphaVantageClient {
    pub fn new(config: AlphaVantageConfig) -> Result<Self, ExtractionError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            config,
            last_call: Mutex::new(None),
        })
    }

    /// 호출 간 최소 간격 보장.
    ///
    /// 잠금을 대기 시간 동안 유지하므로 동시 호출도 순서대로 간격을 지킵니다.
    async fn throttle(&self) {
        let mut last_call = self.last_call.lock().await;

        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.config.rate_limit_delay {
                let wait = self.config.rate_limit_delay - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "Rate limit 대기");
                tokio::time::sleep(wait).await;
            }
        }

        *last_call = Some(Instant::now());
    }

    /// 응답 JSON을 원본 시계열로 해석.
    fn parse_response(
        symbol: &str,
        interval: Interval,
        body: Value,
    ) -> Result<RawSeries, ExtractionError> {
        if let Some(message) = body.get("Error Message").and_then(Value::as_str) {
            return Err(ExtractionError::Api {
                symbol: symbol.to_string(),
                message: message.to_string(),
            });
        }

        // 호출 한도 초과 시 "Note" 또는 "Information" 필드로 안내 메시지가 옵니다
        for key in ["Note", "Information"] {
            if let Some(message) = body.get(key).and_then(Value::as_str) {
                return Err(ExtractionError::RateLimited {
                    symbol: symbol.to_string(),
                    message: message.to_string(),
                });
            }
        }

        let series_key = format!("Time Series ({})", interval.as_str());
        let series = match body.get(&series_key) {
            Some(series) => series.clone(),
            None => {
                warn!(symbol = symbol, key = %series_key, "응답에 시계열 키 없음");
                return Err(ExtractionError::NoData {
                    symbol: symbol.to_string(),
                });
            }
        };

        let time_series: BTreeMap<String, RawBar> = serde_json::from_value(series)
            .map_err(|e| ExtractionError::Parse(format!("{}: {}", symbol, e)))?;

        if time_series.is_empty() {
            return Err(ExtractionError::NoData {
                symbol: symbol.to_string(),
            });
        }

        let meta = body.get("Meta Data");
        let meta_field = |key: &str| {
            meta.and_then(|m| m.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Ok(RawSeries {
            symbol: symbol.to_string(),
            interval,
            time_series,
            metadata: SeriesMetadata {
                last_refreshed: meta_field("3. Last Refreshed"),
                time_zone: meta_field("6. Time Zone"),
                extracted_at: Utc::now(),
            },
        })
    }
}

#[async_trait]
impl Extractor for AlphaVantageClient {
    async fn fetch(&self, symbol: &str, interval: Interval) -> Result<RawSeries, ExtractionError> {
        let symbol = symbol.trim().to_uppercase();
        self.throttle().await;

        debug!(symbol = %symbol, interval = %interval, "인트라데이 데이터 요청");

        let response = self
            .client
            .get(&self.config.base_url)
            .query(&[
                ("function", "TIME_SERIES_INTRADAY"),
                ("symbol", symbol.as_str()),
                ("interval", interval.as_str()),
                ("apikey", self.config.api_key.as_str()),
                ("outputsize", "compact"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ExtractionError::Parse(format!("{}: {}", symbol, e)))?;

        let series = Self::parse_response(&symbol, interval, body)?;

        info!(
            symbol = %symbol,
            points = series.time_series.len(),
            "인트라데이 데이터 추출 완료"
        );

        Ok(series)
    }

    fn provider_name(&self) -> &str {
        "AlphaVantage"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_error_message() {
        let body = json!({ "Error Message": "Invalid API call." });
        let err = AlphaVantageClient::parse_response("ZZZZ", Interval::M5, body).unwrap_err();
        assert!(matches!(err, ExtractionError::Api { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_parse_rate_limit_note() {
        let body = json!({ "Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute" });
        let err = AlphaVantageClient::parse_response("AAPL", Interval::M5, body).unwrap_err();
        assert!(matches!(err, ExtractionError::RateLimited { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_parse_missing_series_key() {
        // 다른 간격의 시계열이 오면 데이터 없음으로 처리
        let body = json!({ "Time Series (1min)": {} });
        let err = AlphaVantageClient::parse_response("AAPL", Interval::M5, body).unwrap_err();
        assert!(matches!(err, ExtractionError::NoData { .. }));
    }

    #[test]
    fn test_parse_series() {
        let body = json!({
            "Meta Data": {
                "3. Last Refreshed": "2024-01-15 16:00:00",
                "6. Time Zone": "US/Eastern"
            },
            "Time Series (5min)": {
                "2024-01-15 16:00:00": {
                    "1. open": "185.10", "2. high": "185.60",
                    "3. low": "185.00", "4. close": "185.50", "5. volume": "120034"
                },
                "2024-01-15 15:55:00": {
                    "1. open": "185.00", "2. high": "185.20",
                    "3. low": "184.90", "4. close": "185.10", "5. volume": "98000"
                }
            }
        });

        let series = AlphaVantageClient::parse_response("AAPL", Interval::M5, body).unwrap();
        assert_eq!(series.time_series.len(), 2);
        assert_eq!(series.metadata.time_zone.as_deref(), Some("US/Eastern"));
        assert_eq!(
            series.metadata.last_refreshed.as_deref(),
            Some("2024-01-15 16:00:00")
        );
    }
}
