//! Intraday collector CLI.

use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use intraday_collector::{
    config::mask_database_url,
    modules::{wait_for_shutdown_signal, MarketCalendar, PollingStrategy},
    CollectorConfig, IngestionService,
};
use intraday_data::{connect, PostgresLoader};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "intraday-collector")]
#[command(about = "Intraday market data collector", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    /// 항상 수집
    Continuous,
    /// 정규장 시간에만 수집
    MarketHours,
    /// 신규 데이터가 없으면 주기를 늘림
    Adaptive,
}

#[derive(Subcommand)]
enum Commands {
    /// 테이블/인덱스 생성
    InitDb,

    /// 폴링 실행 (max-iterations 미지정 시 종료 시그널까지)
    Poll {
        #[arg(long, value_enum, default_value = "continuous")]
        strategy: StrategyArg,

        /// 수집 심볼 (쉼표로 구분, 예: "AAPL,MSFT"). 미지정 시 DEFAULT_SYMBOLS
        #[arg(long)]
        symbols: Option<String>,

        /// 사이클 간격 (분)
        #[arg(long)]
        interval_minutes: Option<u64>,

        #[arg(long)]
        max_iterations: Option<u64>,

        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// 백그라운드 스트리밍 시작, 종료 시그널 또는 완료 시 통계 출력
    Stream {
        #[arg(long)]
        symbols: Option<String>,

        #[arg(long, default_value = "5")]
        interval_minutes: u64,

        #[arg(long)]
        max_iterations: Option<u64>,
    },

    /// 한 사이클만 수집
    Once {
        #[arg(long)]
        symbols: Option<String>,
    },

    /// 데몬 모드: 프리마켓/정규장/애프터마켓 기본 잡 실행
    Schedule {
        /// 잡 평가 주기 (초, 1 이상). 미지정 시 SCHEDULER_TICK_SECONDS
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        tick_seconds: Option<u64>,
    },

    /// 현재 시장 상태 조회
    MarketStatus,

    /// 최근 7일 ETL 작업 로그 집계
    EtlStatus,
}

fn parse_symbols(arg: Option<String>, config: &CollectorConfig) -> Vec<String> {
    match arg {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => config.default_symbols.clone(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // 로깅 초기화 (intraday_collector, intraday_data 모두 포함)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "intraday_collector={},intraday_data={}",
                    cli.log_level, cli.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Intraday Collector 시작");

    let config = CollectorConfig::from_env()?;
    let masked_url = mask_database_url(&config.database.url);
    tracing::debug!(
        database_url = %masked_url,
        interval = %config.interval,
        symbols = ?config.default_symbols,
        "설정 로드 완료"
    );

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&config.database.url, config.database.max_connections).await?;
            PostgresLoader::new(pool).ensure_schema().await?;
            println!("✅ 스키마 초기화 완료");
        }
        Commands::MarketStatus => {
            let calendar = MarketCalendar::new(config.market.clone());
            print_json(&calendar.status(chrono::Utc::now())?)?;
        }
        Commands::EtlStatus => {
            let service = IngestionService::from_config(&config).await?;
            print_json(&service.etl_status().await?)?;
        }
        Commands::Once { symbols } => {
            let service = IngestionService::from_config(&config).await?;
            let result = service
                .run_single_cycle(parse_symbols(symbols, &config))
                .await?;
            print_json(&result)?;
        }
        Commands::Poll {
            strategy,
            symbols,
            interval_minutes,
            max_iterations,
            batch_size,
        } => {
            let service = IngestionService::from_config(&config).await?;

            let mut builder = service
                .polling_builder(parse_symbols(symbols, &config))
                .max_iterations(max_iterations);
            if let Some(minutes) = interval_minutes {
                builder = builder.interval_minutes(minutes);
            }
            if let Some(size) = batch_size {
                builder = builder.batch_size(size);
            }
            let polling = builder.build()?;

            let strategy = match strategy {
                StrategyArg::Continuous => PollingStrategy::Continuous,
                StrategyArg::MarketHours => PollingStrategy::MarketHours(service.calendar().clone()),
                StrategyArg::Adaptive => PollingStrategy::Adaptive,
            };

            // 종료 시그널 → 진행 중인 폴링 취소
            let shutdown = service.shutdown_token();
            tokio::spawn(async move {
                wait_for_shutdown_signal().await;
                shutdown.cancel();
            });

            let stats = service.poll(&polling, &strategy).await;
            print_json(&stats)?;
        }
        Commands::Stream {
            symbols,
            interval_minutes,
            max_iterations,
        } => {
            let service = IngestionService::from_config(&config).await?;
            let ack = service.start_streaming(
                parse_symbols(symbols, &config),
                interval_minutes,
                max_iterations,
            )?;
            print_json(&ack)?;

            let signal = wait_for_shutdown_signal();
            tokio::pin!(signal);
            loop {
                tokio::select! {
                    _ = &mut signal => {
                        service.request_stop_streaming();
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {
                        if !service.get_streaming_status().is_running {
                            break;
                        }
                    }
                }
            }

            let stopped = service.stop_streaming().await;
            print_json(&stopped)?;
        }
        Commands::Schedule { tick_seconds } => {
            let service = IngestionService::from_config(&config).await?;
            let symbols = config.default_symbols.clone();

            service.schedule_pre_market_job(
                "pre_market",
                symbols.clone(),
                config.scheduler.pre_market_interval_minutes,
            )?;
            service.schedule_market_hours_job(
                "market_hours",
                symbols.clone(),
                config.scheduler.market_hours_interval_minutes,
            )?;
            service.schedule_after_hours_job(
                "after_hours",
                symbols,
                config.scheduler.after_hours_interval_minutes,
            )?;

            let tick = tick_seconds
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.scheduler.tick());

            tracing::info!(
                tick_secs = tick.as_secs(),
                pre_market = config.scheduler.pre_market_interval_minutes,
                market_hours = config.scheduler.market_hours_interval_minutes,
                after_hours = config.scheduler.after_hours_interval_minutes,
                "=== 데몬 모드 시작 ==="
            );
            print_json(&service.get_scheduled_jobs()?)?;

            let shutdown = service.shutdown_token();
            tokio::spawn(async move {
                wait_for_shutdown_signal().await;
                shutdown.cancel();
            });

            service.run_scheduler(tick).await;
            tracing::info!("데몬 종료");
        }
    }

    Ok(())
}
