//! Rate limiting over a rolling window. Admissions beyond the limit are
//! deferred, not dropped: contending callers sleep for the average
//! inter-arrival time compatible with the long-run rate and poll again,
//! which spreads wake-ups instead of stampeding the admission counter when
//! the window rolls over. Once the window is full, every caller is admitted
//! within at most `limit` polling cycles.

use super::base::{event, SleepFn};
use crate::{utils, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

/// Rate-limit configuration: at most `limit` admissions per rolling
/// `window_ms`. Both fields must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub limit: u32,
    pub window_ms: u64,
}

impl RateLimit {
    pub fn new(limit: u32, window_ms: u64) -> Result<Self> {
        let config = RateLimit { limit, window_ms };
        config.is_valid()?;
        Ok(config)
    }

    pub fn is_valid(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(Error::msg("rate limit must admit at least one call"));
        }
        if self.window_ms == 0 {
            return Err(Error::msg("invalid rate limit window_ms"));
        }
        Ok(())
    }

    /// Back-pressure delay handed to deferred callers: `ceil(window / limit)`.
    pub fn defer_ms(&self) -> u64 {
        (self.window_ms + self.limit as u64 - 1) / self.limit as u64
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).unwrap();
        write!(f, "{}", fmtted)
    }
}

/// Verdict of one admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Defer(u64),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Per-service admission bucket. The observable number of admissions inside
/// any trailing window never exceeds `limit`.
#[derive(Debug)]
pub struct RateLimiter {
    service: String,
    config: RateLimit,
    // admission timestamps inside the rolling window, oldest first
    admissions: Mutex<VecDeque<u64>>,
}

impl RateLimiter {
    pub fn new(service: impl Into<String>, config: RateLimit) -> Self {
        RateLimiter {
            service: service.into(),
            config,
            admissions: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &RateLimit {
        &self.config
    }

    /// Try to record an admission at the current time. Full windows defer
    /// the caller by [`RateLimit::defer_ms`].
    pub fn admit(&self) -> Admission {
        let now = utils::curr_time_millis();
        let mut admissions = self.admissions.lock().unwrap();
        while let Some(&ts) = admissions.front() {
            if now.saturating_sub(ts) >= self.config.window_ms {
                admissions.pop_front();
            } else {
                break;
            }
        }
        if (admissions.len() as u32) < self.config.limit {
            admissions.push_back(now);
            return Admission::Admitted;
        }
        drop(admissions);
        event::emit_rate_limited(&self.service);
        Admission::Defer(self.config.defer_ms())
    }

    /// Run `thunk` under the limiter, sleeping through deferrals until a
    /// slot is available. Contending callers are independently scheduled;
    /// no FIFO order is imposed.
    pub fn call<R>(&self, sleep_fn: &SleepFn, thunk: impl FnOnce() -> R) -> R {
        loop {
            match self.admit() {
                Admission::Admitted => return thunk(),
                Admission::Defer(delay_ms) => (**sleep_fn)(delay_ms),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn rejects_zero_limit_and_zero_window() {
        assert!(RateLimit::new(0, 1_000).is_err());
        assert!(RateLimit::new(5, 0).is_err());
        assert!(RateLimit::new(5, 1_000).is_ok());
    }

    #[test]
    fn defer_delay_is_ceiling_of_window_over_limit() {
        assert_eq!(RateLimit::new(5, 10).unwrap().defer_ms(), 2);
        assert_eq!(RateLimit::new(3, 10).unwrap().defer_ms(), 4);
        assert_eq!(RateLimit::new(1, 1_000).unwrap().defer_ms(), 1_000);
    }

    #[test]
    fn admits_up_to_limit_then_defers() {
        let limiter = RateLimiter::new("limiter_test", RateLimit::new(2, 1_000).unwrap());
        assert!(limiter.admit().is_admitted());
        assert!(limiter.admit().is_admitted());
        assert_eq!(limiter.admit(), Admission::Defer(500));
    }

    #[test]
    fn window_rolls_over() {
        let limiter = RateLimiter::new("limiter_test_roll", RateLimit::new(2, 40).unwrap());
        assert!(limiter.admit().is_admitted());
        assert!(limiter.admit().is_admitted());
        assert!(!limiter.admit().is_admitted());
        utils::sleep_for_ms(45);
        assert!(limiter.admit().is_admitted());
    }

    #[test]
    fn call_sleeps_excess_callers() {
        let limiter = RateLimiter::new("limiter_test_sleep", RateLimit::new(2, 60).unwrap());
        let sleeps = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&sleeps);
        let sleep_fn: SleepFn = Arc::new(move |ms| {
            counter.fetch_add(1, Ordering::SeqCst);
            utils::sleep_for_ms(ms);
        });

        for i in 0..3 {
            assert_eq!(limiter.call(&sleep_fn, || i), i);
        }
        // the third admission had to wait for the window to roll
        assert!(sleeps.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn concurrent_admissions_stay_within_limit() {
        let limiter = Arc::new(RateLimiter::new(
            "limiter_test_parallel",
            RateLimit::new(4, 10_000).unwrap(),
        ));
        let admitted = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let limiter = Arc::clone(&limiter);
            let admitted = Arc::clone(&admitted);
            handles.push(std::thread::spawn(move || {
                if limiter.admit().is_admitted() {
                    admitted.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(admitted.load(Ordering::SeqCst), 4);
    }
}
