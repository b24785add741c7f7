//! 인트라데이 시세 도메인 모델.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 인트라데이 봉 간격.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1min")]
    M1,
    #[serde(rename = "5min")]
    M5,
    #[serde(rename = "15min")]
    M15,
    #[serde(rename = "30min")]
    M30,
    #[serde(rename = "60min")]
    M60,
}

impl Interval {
    /// API 파라미터 문자열 (예: "5min")
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "1min",
            Self::M5 => "5min",
            Self::M15 => "15min",
            Self::M30 => "30min",
            Self::M60 => "60min",
        }
    }

    /// 봉 하나의 길이 (분)
    pub fn minutes(&self) -> u32 {
        match self {
            Self::M1 => 1,
            Self::M5 => 5,
            Self::M15 => 15,
            Self::M30 => 30,
            Self::M60 => 60,
        }
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::M5
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1min" => Ok(Self::M1),
            "5min" => Ok(Self::M5),
            "15min" => Ok(Self::M15),
            "30min" => Ok(Self::M30),
            "60min" => Ok(Self::M60),
            other => Err(format!("지원하지 않는 간격: {}", other)),
        }
    }
}

/// API 응답의 봉 하나 (문자열 그대로).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    #[serde(rename = "1. open")]
    pub open: String,
    #[serde(rename = "2. high")]
    pub high: String,
    #[serde(rename = "3. low")]
    pub low: String,
    #[serde(rename = "4. close")]
    pub close: String,
    #[serde(rename = "5. volume")]
    pub volume: String,
}

/// 추출 메타데이터
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesMetadata {
    /// API가 보고한 마지막 갱신 시각
    pub last_refreshed: Option<String>,
    /// API가 보고한 타임존 (예: "US/Eastern")
    pub time_zone: Option<String>,
    /// 추출 시각
    pub extracted_at: DateTime<Utc>,
}

/// 추출 단계 결과 (정규화 전).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSeries {
    pub symbol: String,
    pub interval: Interval,
    /// 타임스탬프 문자열 → 봉
    pub time_series: BTreeMap<String, RawBar>,
    pub metadata: SeriesMetadata,
}

/// 정규화된 인트라데이 OHLCV 레코드.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntradayBar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
    pub interval: Interval,
}

/// ETL 작업 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Success,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

/// `etl_job_logs` 테이블 한 행.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlJobLog {
    pub job_name: String,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub records_processed: i64,
    pub total_records: i64,
    pub error_message: Option<String>,
}

/// 최근 기간의 `etl_job_logs` 집계.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtlStatus {
    /// 집계 시작 시각 (이 시각 이후 기록된 작업만 포함)
    pub since: DateTime<Utc>,
    pub total_jobs: i64,
    pub successful_jobs: i64,
    pub failed_jobs: i64,
    /// 종료 시각 없이 `RUNNING`으로 남은 작업
    pub running_jobs: i64,
    /// 가장 최근 작업 시작 시각
    pub last_run: Option<DateTime<Utc>>,
}

impl EtlStatus {
    pub fn is_running(&self) -> bool {
        self.running_jobs > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_parse() {
        assert_eq!("5min".parse::<Interval>().unwrap(), Interval::M5);
        assert_eq!(" 60MIN ".parse::<Interval>().unwrap(), Interval::M60);
        assert!("2min".parse::<Interval>().is_err());
        assert_eq!(Interval::M15.to_string(), "15min");
        assert_eq!(Interval::M30.minutes(), 30);
    }

    #[test]
    fn test_raw_bar_deserialize() {
        let json = r#"{"1. open":"189.10","2. high":"189.50","3. low":"188.90","4. close":"189.30","5. volume":"12345"}"#;
        let bar: RawBar = serde_json::from_str(json).unwrap();
        assert_eq!(bar.open, "189.10");
        assert_eq!(bar.volume, "12345");
    }
}
