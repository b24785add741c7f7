//! 시뮬레이션 스트리밍 컨트롤러.
//!
//! 폴링 엔진을 백그라운드 tokio 태스크로 띄우고 시작/중지/상태 조회를 제공합니다.
//!
//! ```text
//! Stopped ──start──> Running ──stop/신호──> Stopping ──루프 종료──> Stopped
//!                       └──── max_iterations 도달 / fail-fast ────> Stopped
//! ```
//!
//! 호출자와 워커는 취소 토큰, 실행 플래그, 통계 스냅샷 채널로만 통신합니다.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};

use chrono::{DateTime, Utc};
use intraday_data::SymbolIngestor;
use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::polling::{CycleCallback, PollingEngine, PollingSettings, PollingStrategy};
use crate::error::CollectorError;
use crate::stats::RunStatistics;
use crate::Result;

/// 스트리밍 시작 요청
#[derive(Clone)]
pub struct StreamRequest {
    pub symbols: Vec<String>,
    pub interval_minutes: u64,
    /// None이면 중지 요청까지 계속 실행
    pub max_iterations: Option<u64>,
    pub strategy: PollingStrategy,
    pub on_cycle: Option<CycleCallback>,
}

impl StreamRequest {
    pub fn new<I, S>(symbols: I, interval_minutes: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
            interval_minutes,
            max_iterations: None,
            strategy: PollingStrategy::Continuous,
            on_cycle: None,
        }
    }

    pub fn max_iterations(mut self, max: Option<u64>) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn strategy(mut self, strategy: PollingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn on_cycle(mut self, callback: CycleCallback) -> Self {
        self.on_cycle = Some(callback);
        self
    }
}

/// 스트리밍 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamingPhase {
    Stopped,
    Running,
    Stopping,
}

/// 스트리밍 상태 스냅샷
#[derive(Debug, Clone, Serialize)]
pub struct StreamingStatus {
    pub is_running: bool,
    /// 중지 요청이 전달되었는지
    pub stop_event_set: bool,
    /// 워커 태스크가 살아 있는지
    pub thread_alive: bool,
    pub phase: StreamingPhase,
    pub last_cycle_timestamp: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

struct Worker {
    /// stop()이 가져가면 None
    handle: Option<JoinHandle<RunStatistics>>,
    /// stop()이 join 중
    joining: bool,
    cancel: CancellationToken,
    stats_rx: watch::Receiver<Option<Arc<RunStatistics>>>,
}

impl Worker {
    fn is_alive(&self) -> bool {
        match &self.handle {
            Some(handle) => !handle.is_finished(),
            None => self.joining,
        }
    }
}

/// 스트리밍 컨트롤러. 인스턴스당 워커는 최대 하나입니다.
pub struct StreamingController {
    ingestor: Arc<dyn SymbolIngestor>,
    settings: PollingSettings,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<Worker>>,
    /// 동시에 들어온 stop() 직렬화
    stop_lock: tokio::sync::Mutex<()>,
}

impl StreamingController {
    pub fn new(ingestor: Arc<dyn SymbolIngestor>, settings: PollingSettings) -> Self {
        Self {
            ingestor,
            settings,
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            stop_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        // 워커 상태는 단순 대입만 하므로 poison 상태여도 그대로 사용
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 백그라운드 스트리밍 시작. 즉시 반환합니다.
    ///
    /// tokio 런타임 안에서 호출해야 합니다.
    pub fn start(&self, request: StreamRequest) -> Result<()> {
        let mut worker = self.lock_worker();

        if worker.as_ref().is_some_and(Worker::is_alive) {
            warn!("스트리밍이 이미 실행 중입니다");
            return Err(CollectorError::AlreadyRunning);
        }

        let config = self
            .settings
            .builder(request.symbols)
            .interval_minutes(request.interval_minutes)
            .max_iterations(request.max_iterations)
            .build()?;

        let cancel = CancellationToken::new();
        let (stats_tx, stats_rx) = watch::channel(None);

        let mut engine = PollingEngine::new(self.ingestor.clone())
            .with_cancellation(cancel.clone())
            .with_stats_sender(stats_tx);
        if let Some(callback) = request.on_cycle {
            engine = engine.with_cycle_callback(callback);
        }

        info!(
            symbols = ?config.symbols(),
            interval_minutes = config.interval_minutes(),
            max_iterations = ?config.max_iterations(),
            strategy = request.strategy.name(),
            "스트리밍 시작"
        );

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let strategy = request.strategy;

        let handle = tokio::spawn(async move {
            let stats = engine.run(&config, &strategy).await;
            running.store(false, Ordering::SeqCst);
            stats
        });

        *worker = Some(Worker {
            handle: Some(handle),
            joining: false,
            cancel,
            stats_rx,
        });

        Ok(())
    }

    /// 중지 요청 후 워커 종료까지 대기합니다.
    ///
    /// 실행 중이 아니면 아무 것도 하지 않고 None을 반환합니다 (멱등).
    /// 스스로 완료된 실행도 실행 중이 아닌 것으로 봅니다.
    pub async fn stop(&self) -> Option<RunStatistics> {
        let _guard = self.stop_lock.lock().await;

        let (handle, cancel) = {
            let mut worker = self.lock_worker();
            match worker.as_mut() {
                Some(w) if w.handle.as_ref().is_some_and(JoinHandle::is_finished) => {
                    debug!("스트리밍이 이미 완료됨");
                    return None;
                }
                Some(w) => {
                    let handle = w.handle.take();
                    w.joining = handle.is_some();
                    (handle, w.cancel.clone())
                }
                None => (None, CancellationToken::new()),
            }
        };

        let Some(handle) = handle else {
            debug!("실행 중인 스트리밍 없음");
            return None;
        };

        info!("스트리밍 중지 요청");
        cancel.cancel();

        let stats = match handle.await {
            Ok(stats) => Some(stats),
            Err(e) => {
                error!(error = %e, "스트리밍 워커 비정상 종료");
                None
            }
        };
        self.running.store(false, Ordering::SeqCst);
        if let Some(w) = self.lock_worker().as_mut() {
            w.joining = false;
        }

        info!("스트리밍 중지 완료");
        stats
    }

    /// 대기 없이 취소만 전달합니다 (시그널 핸들러 경로).
    pub fn request_stop(&self) -> bool {
        let worker = self.lock_worker();
        match worker.as_ref() {
            Some(w) if w.is_alive() => {
                w.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.lock_worker().as_ref().is_some_and(Worker::is_alive)
    }

    /// 현재 상태 스냅샷. 블로킹하지 않습니다.
    pub fn get_status(&self) -> StreamingStatus {
        let worker = self.lock_worker();
        let running = self.running.load(Ordering::SeqCst);

        let (stop_event_set, thread_alive, last_cycle_timestamp) = match worker.as_ref() {
            Some(w) => (
                w.cancel.is_cancelled(),
                w.is_alive(),
                w.stats_rx
                    .borrow()
                    .as_ref()
                    .and_then(|stats| stats.last_cycle_at),
            ),
            None => (false, false, None),
        };

        let phase = if thread_alive && stop_event_set {
            StreamingPhase::Stopping
        } else if thread_alive && running {
            StreamingPhase::Running
        } else {
            StreamingPhase::Stopped
        };

        StreamingStatus {
            is_running: running && thread_alive,
            stop_event_set,
            thread_alive,
            phase,
            last_cycle_timestamp,
            timestamp: Utc::now(),
        }
    }

    /// 현재(또는 마지막) 실행 통계 스냅샷
    pub fn latest_statistics(&self) -> Option<Arc<RunStatistics>> {
        self.lock_worker()
            .as_ref()
            .and_then(|w| w.stats_rx.borrow().clone())
    }
}

impl Drop for StreamingController {
    fn drop(&mut self) {
        let worker = self.worker.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(w) = worker.as_ref() {
            w.cancel.cancel();
        }
    }
}

/// Ctrl+C 또는 SIGTERM 대기.
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Ctrl+C 핸들러 설치 실패");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "SIGTERM 핸들러 설치 실패");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Ctrl+C 수신, 종료 시작");
        }
        _ = terminate => {
            warn!("SIGTERM 수신, 종료 시작");
        }
    }
}
