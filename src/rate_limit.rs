use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{AppError, Result};

fn one_minute() -> chrono::Duration {
    chrono::Duration::seconds(60)
}

/// Time source for the limiter. Tests inject a manual clock; production
/// uses [`SystemClock`].
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Ready,
    Wait(Duration),
    DailyExhausted,
}

/// Shared throttle for all scoring oracle calls. Enforces a trailing-minute
/// ceiling and a calendar-day ceiling (the provider's free tier resets by
/// date, not by a rolling 24 h window).
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    per_minute: u32,
    per_day: u32,
    minute_window: VecDeque<DateTime<Utc>>,
    day: NaiveDate,
    daily_count: u32,
}

impl RateLimiter {
    pub fn new(per_minute: u32, per_day: u32) -> Self {
        Self::with_clock(per_minute, per_day, Arc::new(SystemClock))
    }

    pub fn with_clock(per_minute: u32, per_day: u32, clock: Arc<dyn Clock>) -> Self {
        let day = clock.now().date_naive();
        Self {
            clock,
            per_minute,
            per_day,
            minute_window: VecDeque::new(),
            day,
            daily_count: 0,
        }
    }

    /// Rebuild the daily counter after a process restart, typically from a
    /// count of today's persisted evaluations.
    pub fn seed_daily_usage(&mut self, count: u32) {
        self.roll_day(self.clock.now());
        self.daily_count = count;
    }

    /// Reports whether a request may go out now, must wait for the minute
    /// window to roll over, or is blocked for the rest of the day.
    pub fn check(&mut self) -> Slot {
        let now = self.clock.now();
        self.roll_day(now);
        self.drop_stale(now);

        if self.daily_count >= self.per_day {
            return Slot::DailyExhausted;
        }

        if self.minute_window.len() >= self.per_minute as usize {
            // Oldest entry leaves the window first
            let oldest = *self.minute_window.front().unwrap_or(&now);
            let wait = (oldest + one_minute()) - now;
            return Slot::Wait(wait.to_std().unwrap_or(Duration::ZERO));
        }

        Slot::Ready
    }

    /// Blocks until a slot is free under both ceilings and claims it.
    /// Fails fast with [`AppError::QuotaExhausted`] once the day is spent;
    /// sleeping until midnight would blow any sane batch timeout.
    pub async fn acquire(&mut self) -> Result<()> {
        loop {
            match self.check() {
                Slot::Ready => {
                    let now = self.clock.now();
                    self.minute_window.push_back(now);
                    self.daily_count += 1;
                    return Ok(());
                }
                Slot::Wait(wait) => {
                    tracing::debug!(?wait, "rate limit reached, waiting for minute window");
                    tokio::time::sleep(wait).await;
                }
                Slot::DailyExhausted => return Err(AppError::QuotaExhausted),
            }
        }
    }

    pub fn requests_today(&self) -> u32 {
        self.daily_count
    }

    fn roll_day(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.day {
            self.day = today;
            self.daily_count = 0;
        }
    }

    fn drop_stale(&mut self, now: DateTime<Utc>) {
        while let Some(front) = self.minute_window.front() {
            if now - *front >= one_minute() {
                self.minute_window.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        fn starting_at(now: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(now),
            })
        }

        fn advance(&self, by: chrono::Duration) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn sixth_request_waits_for_the_window_to_roll() {
        let clock = ManualClock::starting_at(noon());
        let mut limiter = RateLimiter::with_clock(5, 1000, clock.clone());

        for _ in 0..5 {
            limiter.acquire().await.unwrap();
        }

        match limiter.check() {
            Slot::Wait(wait) => assert_eq!(wait, Duration::from_secs(60)),
            other => panic!("expected Wait, got {other:?}"),
        }

        clock.advance(chrono::Duration::seconds(30));
        match limiter.check() {
            Slot::Wait(wait) => assert_eq!(wait, Duration::from_secs(30)),
            other => panic!("expected Wait, got {other:?}"),
        }

        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(limiter.check(), Slot::Ready);
    }

    #[tokio::test]
    async fn daily_ceiling_fails_fast() {
        let clock = ManualClock::starting_at(noon());
        let mut limiter = RateLimiter::with_clock(100, 2, clock.clone());

        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();

        assert!(matches!(
            limiter.acquire().await,
            Err(AppError::QuotaExhausted)
        ));
    }

    #[tokio::test]
    async fn daily_counter_resets_on_the_next_calendar_day() {
        let clock = ManualClock::starting_at(noon());
        let mut limiter = RateLimiter::with_clock(100, 1, clock.clone());

        limiter.acquire().await.unwrap();
        assert_eq!(limiter.check(), Slot::DailyExhausted);

        clock.advance(chrono::Duration::hours(13));
        assert_eq!(limiter.check(), Slot::Ready);
        assert_eq!(limiter.requests_today(), 0);
    }

    #[tokio::test]
    async fn seeded_usage_counts_against_the_day() {
        let clock = ManualClock::starting_at(noon());
        let mut limiter = RateLimiter::with_clock(100, 10, clock);

        limiter.seed_daily_usage(10);
        assert_eq!(limiter.check(), Slot::DailyExhausted);
        assert!(matches!(
            limiter.acquire().await,
            Err(AppError::QuotaExhausted)
        ));
    }
}
