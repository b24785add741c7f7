//! 인트라데이 가격 PostgreSQL 저장소.
//!
//! # 테이블
//!
//! - `stocks`: 종목 마스터 (심볼 최초 수집 시 자동 등록)
//! - `stock_prices_intraday`: OHLCV, `(stock_symbol, timestamp, interval)` 유니크
//! - `etl_job_logs`: 심볼 단위 ETL 실행 기록
//!
//! 가격 저장은 UNNEST 패턴 일괄 upsert를 사용합니다.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, instrument};

use super::Loader;
use crate::error::LoadError;
use crate::model::{EtlJobLog, EtlStatus, IntradayBar};

/// 한 번에 upsert할 최대 행 수
const UPSERT_CHUNK_SIZE: usize = 500;

const SCHEMA_STATEMENTS: [&str; 10] = [
    r#"
    CREATE TABLE IF NOT EXISTS stocks (
        id SERIAL PRIMARY KEY,
        symbol VARCHAR(16) NOT NULL UNIQUE,
        name VARCHAR(255),
        exchange VARCHAR(32),
        currency VARCHAR(8) NOT NULL DEFAULT 'USD',
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stock_prices_intraday (
        id BIGSERIAL PRIMARY KEY,
        stock_symbol VARCHAR(16) NOT NULL REFERENCES stocks(symbol),
        timestamp TIMESTAMPTZ NOT NULL,
        open_price NUMERIC(18, 6) NOT NULL,
        high_price NUMERIC(18, 6) NOT NULL,
        low_price NUMERIC(18, 6) NOT NULL,
        close_price NUMERIC(18, 6) NOT NULL,
        volume BIGINT NOT NULL,
        interval VARCHAR(8) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (stock_symbol, timestamp, interval)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS etl_job_logs (
        id BIGSERIAL PRIMARY KEY,
        job_name VARCHAR(64) NOT NULL,
        status VARCHAR(16) NOT NULL,
        start_time TIMESTAMPTZ NOT NULL,
        end_time TIMESTAMPTZ,
        records_processed BIGINT NOT NULL DEFAULT 0,
        total_records BIGINT NOT NULL DEFAULT 0,
        error_message TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_stock_exchange ON stocks(exchange)",
    "CREATE INDEX IF NOT EXISTS idx_intraday_symbol_timestamp ON stock_prices_intraday(stock_symbol, timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_intraday_timestamp ON stock_prices_intraday(timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_intraday_symbol_interval ON stock_prices_intraday(stock_symbol, interval)",
    "CREATE INDEX IF NOT EXISTS idx_etl_job_status ON etl_job_logs(status)",
    "CREATE INDEX IF NOT EXISTS idx_etl_job_start_time ON etl_job_logs(start_time)",
    "CREATE INDEX IF NOT EXISTS idx_etl_job_name ON etl_job_logs(job_name)",
];

/// 연결 풀 생성.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, LoadError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// 인트라데이 가격 저장소.
#[derive(Clone)]
pub struct PostgresLoader {
    pool: PgPool,
}

impl PostgresLoader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 테이블/인덱스 생성 (이미 있으면 무시).
    pub async fn ensure_schema(&self) -> Result<(), LoadError> {
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("인트라데이 스키마 확인 완료");
        Ok(())
    }

    /// 종목 마스터 등록 (이미 있으면 무시).
    async fn ensure_stock(&self, symbol: &str) -> Result<(), LoadError> {
        sqlx::query(
            r#"
            INSERT INTO stocks (symbol, name, exchange, is_active)
            VALUES ($1, $2, 'NYSE', TRUE)
            ON CONFLICT (symbol) DO NOTHING
            "#,
        )
        .bind(symbol)
        .bind(format!("{} Stock", symbol))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Loader for PostgresLoader {
    #[instrument(skip(self, bars), fields(count = bars.len()))]
    async fn upsert(&self, symbol: &str, bars: &[IntradayBar]) -> Result<u64, LoadError> {
        if bars.is_empty() {
            return Ok(0);
        }

        if let Some(other) = bars.iter().find(|b| b.symbol != symbol) {
            return Err(LoadError::Rejected(format!(
                "심볼 불일치: {} != {}",
                other.symbol, symbol
            )));
        }

        self.ensure_stock(symbol).await?;

        let mut affected = 0u64;

        for chunk in bars.chunks(UPSERT_CHUNK_SIZE) {
            let symbols: Vec<&str> = chunk.iter().map(|b| b.symbol.as_str()).collect();
            let timestamps: Vec<DateTime<Utc>> = chunk.iter().map(|b| b.timestamp).collect();
            let opens: Vec<Decimal> = chunk.iter().map(|b| b.open).collect();
            let highs: Vec<Decimal> = chunk.iter().map(|b| b.high).collect();
            let lows: Vec<Decimal> = chunk.iter().map(|b| b.low).collect();
            let closes: Vec<Decimal> = chunk.iter().map(|b| b.close).collect();
            let volumes: Vec<i64> = chunk.iter().map(|b| b.volume).collect();
            let intervals: Vec<&str> = chunk.iter().map(|b| b.interval.as_str()).collect();

            let result = sqlx::query(
                r#"
                INSERT INTO stock_prices_intraday
                    (stock_symbol, timestamp, open_price, high_price, low_price, close_price, volume, interval)
                SELECT * FROM UNNEST(
                    $1::varchar[], $2::timestamptz[],
                    $3::numeric[], $4::numeric[], $5::numeric[], $6::numeric[],
                    $7::bigint[], $8::varchar[]
                )
                ON CONFLICT (stock_symbol, timestamp, interval) DO UPDATE SET
                    open_price = EXCLUDED.open_price,
                    high_price = EXCLUDED.high_price,
                    low_price = EXCLUDED.low_price,
                    close_price = EXCLUDED.close_price,
                    volume = EXCLUDED.volume,
                    updated_at = NOW()
                "#,
            )
            .bind(&symbols)
            .bind(&timestamps)
            .bind(&opens)
            .bind(&highs)
            .bind(&lows)
            .bind(&closes)
            .bind(&volumes)
            .bind(&intervals)
            .execute(&self.pool)
            .await?;

            affected += result.rows_affected();
        }

        debug!(symbol = symbol, affected, "인트라데이 가격 저장 완료");

        Ok(affected)
    }

    async fn record_job(&self, log: &EtlJobLog) -> Result<(), LoadError> {
        sqlx::query(
            r#"
            INSERT INTO etl_job_logs
                (job_name, status, start_time, end_time, records_processed, total_records, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&log.job_name)
        .bind(log.status.as_str())
        .bind(log.start_time)
        .bind(log.end_time)
        .bind(log.records_processed)
        .bind(log.total_records)
        .bind(&log.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn etl_status(&self, since: DateTime<Utc>) -> Result<EtlStatus, LoadError> {
        let (total_jobs, successful_jobs, failed_jobs, running_jobs, last_run): (
            i64,
            i64,
            i64,
            i64,
            Option<DateTime<Utc>>,
        ) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status = 'SUCCESS'),
                COUNT(*) FILTER (WHERE status = 'FAILED'),
                COUNT(*) FILTER (WHERE status = 'RUNNING'),
                MAX(start_time)
            FROM etl_job_logs
            WHERE created_at >= $1
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(EtlStatus {
            since,
            total_jobs,
            successful_jobs,
            failed_jobs,
            running_jobs,
            last_run,
        })
    }
}
