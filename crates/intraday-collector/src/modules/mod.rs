//! 수집 루프 모듈.

pub mod calendar;
pub mod ingest;
pub mod polling;
pub mod scheduler;
pub mod streaming;

pub use calendar::{MarketCalendar, MarketSchedule, MarketSession, MarketStatusReport};
pub use ingest::{ingest_batch, with_retry, RetryOutcome, RetryPolicy};
pub use polling::{
    AdaptiveBackoff, CycleCallback, GateFn, PollingConfig, PollingConfigBuilder, PollingEngine,
    PollingSettings, PollingStrategy, MAX_INTERVAL_MINUTES,
};
pub use scheduler::{
    JobCallback, JobOutcome, JobReport, JobScheduler, ScheduledJob, SchedulerSnapshot, SessionGate,
    SkipReason,
};
pub use streaming::{
    wait_for_shutdown_signal, StreamRequest, StreamingController, StreamingPhase, StreamingStatus,
};
