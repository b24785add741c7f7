//! 시장 운영 시간 캘린더.
//!
//! 거래일/세션(프리마켓, 정규장, 애프터마켓) 판정과 다음 개장/마감 시각 계산을 담당합니다.
//! 모든 판정은 호출자가 넘긴 `now`에 대해서만 계산되며 내부 상태를 바꾸지 않습니다.
//!
//! 세션 시간 범위는 `[시작, 끝)` 반열림 구간이라 네 판정은 서로 겹치지 않습니다.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::CollectorError;
use crate::Result;

/// 기본 거래일 (월~금)
pub const WEEKDAYS: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

/// 다음 개장/마감 탐색 범위 (오늘 포함 8일)
const SEARCH_DAYS: u64 = 7;

/// 시장 운영 시간 설정 (현지 시각 기준 정시 단위)
#[derive(Debug, Clone)]
pub struct MarketSchedule {
    pre_market_start_hour: u32,
    open_hour: u32,
    close_hour: u32,
    after_hours_end_hour: u32,
    timezone: Tz,
    trading_days: HashSet<Weekday>,
    holidays: HashSet<NaiveDate>,
}

impl Default for MarketSchedule {
    fn default() -> Self {
        Self {
            pre_market_start_hour: 4,
            open_hour: 9,
            close_hour: 16,
            after_hours_end_hour: 20,
            timezone: Tz::UTC,
            trading_days: WEEKDAYS.into_iter().collect(),
            holidays: HashSet::new(),
        }
    }
}

impl MarketSchedule {
    /// 시간 범위를 검증해서 생성합니다. 타임존은 UTC, 거래일은 월~금.
    pub fn new(
        pre_market_start_hour: u32,
        open_hour: u32,
        close_hour: u32,
        after_hours_end_hour: u32,
    ) -> Result<Self> {
        let hours = [
            pre_market_start_hour,
            open_hour,
            close_hour,
            after_hours_end_hour,
        ];
        if hours.iter().any(|h| *h >= 24) {
            return Err(CollectorError::Config(format!(
                "시장 시간은 0~23 범위여야 합니다: {:?}",
                hours
            )));
        }

        if !(pre_market_start_hour <= open_hour
            && open_hour <= close_hour
            && close_hour <= after_hours_end_hour)
        {
            return Err(CollectorError::Config(format!(
                "시장 시간 순서 오류: pre({}) <= open({}) <= close({}) <= after({}) 이어야 합니다",
                pre_market_start_hour, open_hour, close_hour, after_hours_end_hour
            )));
        }

        Ok(Self {
            pre_market_start_hour,
            open_hour,
            close_hour,
            after_hours_end_hour,
            ..Self::default()
        })
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// 거래일 교체 (빈 집합이면 다음 개장/마감 계산이 실패합니다)
    pub fn with_trading_days(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.trading_days = days.into_iter().collect();
        self
    }

    pub fn with_holidays(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(dates);
        self
    }

    pub fn pre_market_start_hour(&self) -> u32 {
        self.pre_market_start_hour
    }

    pub fn open_hour(&self) -> u32 {
        self.open_hour
    }

    pub fn close_hour(&self) -> u32 {
        self.close_hour
    }

    pub fn after_hours_end_hour(&self) -> u32 {
        self.after_hours_end_hour
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}

/// 시장 세션
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketSession {
    PreMarket,
    MarketHours,
    AfterHours,
    /// 세션 밖 (휴장일 포함)
    Closed,
}

impl MarketSession {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreMarket => "pre_market",
            Self::MarketHours => "market_hours",
            Self::AfterHours => "after_hours",
            Self::Closed => "closed",
        }
    }
}

/// 시장 상태 조회 결과
#[derive(Debug, Clone, Serialize)]
pub struct MarketStatusReport {
    pub timestamp: DateTime<Utc>,
    pub timezone: String,
    pub local_time: String,
    pub session: MarketSession,
    pub is_trading_day: bool,
    pub is_market_open: bool,
    pub is_pre_market: bool,
    pub is_after_hours: bool,
    pub next_market_open: DateTime<Utc>,
    pub next_market_close: DateTime<Utc>,
}

/// 시장 캘린더
#[derive(Debug, Clone, Default)]
pub struct MarketCalendar {
    schedule: MarketSchedule,
}

impl MarketCalendar {
    pub fn new(schedule: MarketSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &MarketSchedule {
        &self.schedule
    }

    fn is_trading_date(&self, date: NaiveDate) -> bool {
        self.schedule.trading_days.contains(&date.weekday())
            && !self.schedule.holidays.contains(&date)
    }

    /// 현지 시각 기준 거래일이고 `start <= hour < end`인지
    fn in_window(&self, now: DateTime<Utc>, start: u32, end: u32) -> bool {
        let local = now.with_timezone(&self.schedule.timezone);
        if !self.is_trading_date(local.date_naive()) {
            return false;
        }
        let hour = local.hour();
        start <= hour && hour < end
    }

    /// 거래일 여부 (요일이 거래일이고 휴장일이 아님)
    pub fn is_trading_day(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.schedule.timezone);
        self.is_trading_date(local.date_naive())
    }

    pub fn is_market_open(&self, now: DateTime<Utc>) -> bool {
        self.in_window(now, self.schedule.open_hour, self.schedule.close_hour)
    }

    pub fn is_pre_market(&self, now: DateTime<Utc>) -> bool {
        self.in_window(
            now,
            self.schedule.pre_market_start_hour,
            self.schedule.open_hour,
        )
    }

    pub fn is_after_hours(&self, now: DateTime<Utc>) -> bool {
        self.in_window(
            now,
            self.schedule.close_hour,
            self.schedule.after_hours_end_hour,
        )
    }

    /// 현재 세션. 네 구간은 겹치지 않으므로 최대 하나만 해당합니다.
    pub fn session(&self, now: DateTime<Utc>) -> MarketSession {
        if self.is_market_open(now) {
            MarketSession::MarketHours
        } else if self.is_pre_market(now) {
            MarketSession::PreMarket
        } else if self.is_after_hours(now) {
            MarketSession::AfterHours
        } else {
            MarketSession::Closed
        }
    }

    /// `now` 이후(초과) 가장 가까운 개장 시각.
    ///
    /// 정확히 개장 시각이면 이미 개장 상태이므로 다음 거래일 개장을 반환합니다.
    pub fn next_market_open(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.next_boundary(now, self.schedule.open_hour, "개장")
    }

    /// `now` 이후(초과) 가장 가까운 마감 시각.
    pub fn next_market_close(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.next_boundary(now, self.schedule.close_hour, "마감")
    }

    fn next_boundary(&self, now: DateTime<Utc>, hour: u32, label: &str) -> Result<DateTime<Utc>> {
        if self.schedule.trading_days.is_empty() {
            return Err(CollectorError::Calendar(
                "거래일이 설정되지 않았습니다".to_string(),
            ));
        }

        let tz = self.schedule.timezone;
        let today = now.with_timezone(&tz).date_naive();

        for offset in 0..=SEARCH_DAYS {
            let Some(date) = today.checked_add_days(Days::new(offset)) else {
                break;
            };
            if !self.is_trading_date(date) {
                continue;
            }
            let Some(naive) = date.and_hms_opt(hour, 0, 0) else {
                continue;
            };
            // DST로 존재하지 않는 시각이면 해당 날짜는 건너뜀
            let Some(candidate) = tz.from_local_datetime(&naive).earliest() else {
                continue;
            };
            let candidate = candidate.with_timezone(&Utc);
            if candidate > now {
                return Ok(candidate);
            }
        }

        Err(CollectorError::Calendar(format!(
            "{}일 이내에 다음 {} 시각이 없습니다 (기준: {})",
            SEARCH_DAYS, label, now
        )))
    }

    /// 시장 상태 요약
    pub fn status(&self, now: DateTime<Utc>) -> Result<MarketStatusReport> {
        let local = now.with_timezone(&self.schedule.timezone);

        Ok(MarketStatusReport {
            timestamp: now,
            timezone: self.schedule.timezone.name().to_string(),
            local_time: local.format("%Y-%m-%d %H:%M:%S").to_string(),
            session: self.session(now),
            is_trading_day: self.is_trading_day(now),
            is_market_open: self.is_market_open(now),
            is_pre_market: self.is_pre_market(now),
            is_after_hours: self.is_after_hours(now),
            next_market_open: self.next_market_open(now)?,
            next_market_close: self.next_market_close(now)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_open_boundary() {
        let calendar = MarketCalendar::default();
        // 2024-01-15 월요일
        assert!(!calendar.is_market_open(utc(2024, 1, 15, 8, 59)));
        assert!(calendar.is_pre_market(utc(2024, 1, 15, 8, 59)));
        assert!(calendar.is_market_open(utc(2024, 1, 15, 9, 0)));
        assert!(calendar.is_market_open(utc(2024, 1, 15, 9, 1)));
        assert!(!calendar.is_market_open(utc(2024, 1, 15, 16, 0)));
        assert!(calendar.is_after_hours(utc(2024, 1, 15, 16, 0)));
    }

    #[test]
    fn test_sessions_mutually_exclusive() {
        let calendar = MarketCalendar::default();

        for hour in 0..24 {
            let now = utc(2024, 1, 16, hour, 30);
            let flags = [
                calendar.is_pre_market(now),
                calendar.is_market_open(now),
                calendar.is_after_hours(now),
            ];
            assert!(flags.iter().filter(|f| **f).count() <= 1, "hour {}", hour);
        }

        assert_eq!(calendar.session(utc(2024, 1, 16, 2, 0)), MarketSession::Closed);
        assert_eq!(calendar.session(utc(2024, 1, 16, 5, 0)), MarketSession::PreMarket);
        assert_eq!(calendar.session(utc(2024, 1, 16, 12, 0)), MarketSession::MarketHours);
        assert_eq!(calendar.session(utc(2024, 1, 16, 18, 0)), MarketSession::AfterHours);
        assert_eq!(calendar.session(utc(2024, 1, 16, 21, 0)), MarketSession::Closed);
    }

    #[test]
    fn test_weekend_and_holiday() {
        let holiday = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let calendar = MarketCalendar::new(MarketSchedule::default().with_holidays([holiday]));

        // 토요일 정오
        assert!(!calendar.is_trading_day(utc(2024, 1, 13, 12, 0)));
        assert!(!calendar.is_market_open(utc(2024, 1, 13, 12, 0)));
        // 휴장일
        assert!(!calendar.is_trading_day(utc(2024, 1, 15, 12, 0)));
        assert_eq!(calendar.session(utc(2024, 1, 15, 12, 0)), MarketSession::Closed);
        assert!(calendar.is_trading_day(utc(2024, 1, 16, 12, 0)));
    }

    #[test]
    fn test_next_market_open_strictly_after() {
        let calendar = MarketCalendar::default();

        // 개장 직전 → 당일 개장
        assert_eq!(
            calendar.next_market_open(utc(2024, 1, 15, 8, 59)).unwrap(),
            utc(2024, 1, 15, 9, 0)
        );
        // 정확히 개장 시각 → 다음 거래일
        assert_eq!(
            calendar.next_market_open(utc(2024, 1, 15, 9, 0)).unwrap(),
            utc(2024, 1, 16, 9, 0)
        );
        // 개장 직후 → 다음 거래일
        assert_eq!(
            calendar.next_market_open(utc(2024, 1, 15, 9, 1)).unwrap(),
            utc(2024, 1, 16, 9, 0)
        );
        // 금요일 저녁 → 월요일
        assert_eq!(
            calendar.next_market_open(utc(2024, 1, 19, 17, 0)).unwrap(),
            utc(2024, 1, 22, 9, 0)
        );
        // 정확히 마감 시각 → 다음 거래일 마감
        assert_eq!(
            calendar.next_market_close(utc(2024, 1, 15, 16, 0)).unwrap(),
            utc(2024, 1, 16, 16, 0)
        );
    }

    #[test]
    fn test_next_open_skips_holiday() {
        let holiday = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();
        let calendar = MarketCalendar::new(MarketSchedule::default().with_holidays([holiday]));

        assert_eq!(
            calendar.next_market_open(utc(2024, 1, 15, 12, 0)).unwrap(),
            utc(2024, 1, 17, 9, 0)
        );
    }

    #[test]
    fn test_empty_trading_days_is_calendar_error() {
        let calendar = MarketCalendar::new(MarketSchedule::default().with_trading_days(Vec::<Weekday>::new()));

        let result = calendar.next_market_open(utc(2024, 1, 15, 12, 0));
        assert!(matches!(result, Err(CollectorError::Calendar(_))));
        assert!(calendar.status(utc(2024, 1, 15, 12, 0)).is_err());
    }

    #[test]
    fn test_local_timezone_evaluation() {
        let schedule = MarketSchedule::new(4, 9, 16, 20)
            .unwrap()
            .with_timezone(chrono_tz::America::New_York);
        let calendar = MarketCalendar::new(schedule);

        // 2024-07-15 13:30 UTC = 09:30 EDT
        assert!(calendar.is_market_open(utc(2024, 7, 15, 13, 30)));
        // 2024-01-15 13:30 UTC = 08:30 EST
        assert!(calendar.is_pre_market(utc(2024, 1, 15, 13, 30)));
        // 개장은 14:00 UTC (09:00 EST)
        assert_eq!(
            calendar.next_market_open(utc(2024, 1, 15, 13, 30)).unwrap(),
            utc(2024, 1, 15, 14, 0)
        );
    }

    #[test]
    fn test_invalid_schedule_rejected() {
        assert!(MarketSchedule::new(4, 9, 16, 24).is_err());
        assert!(MarketSchedule::new(10, 9, 16, 20).is_err());
        assert!(MarketSchedule::new(4, 17, 16, 20).is_err());
        assert!(MarketSchedule::new(0, 0, 0, 0).is_ok());
    }
}
