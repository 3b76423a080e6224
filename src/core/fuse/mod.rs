//!  Fuse State Machine:
//!
//!                failures in window > max_failures
//!
//!     +----------------+ ----------------------------> +----------------+
//!     |                |                               |                |
//!     |       Ok       |   ask at since+refresh (or    |     Blown      |
//!     |                |   later), or explicit reset   |  (since=now)   |
//!     |                | <---------------------------- |                |
//!     +----------------+                               +----------------+
//!
//! There is no half-open state: probing after the refresh interval is
//! implicit in the next ask, which transitions the fuse back to Ok lazily.

use super::base::event;
use crate::{utils, Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

/// `Strategy` decides when a fuse blows.
///
/// `Standard` blows once more than `max_failures` melts land within the
/// sliding `window_ms`. `FaultInjection` keeps the same failure accounting
/// and additionally reports Blown on a `rate` fraction of asks regardless of
/// the underlying state, for callers rehearsing their degraded paths.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Strategy {
    Standard {
        max_failures: u32,
        window_ms: u64,
    },
    FaultInjection {
        rate: f64,
        max_failures: u32,
        window_ms: u64,
    },
}

impl Default for Strategy {
    fn default() -> Strategy {
        Strategy::Standard {
            max_failures: 10,
            window_ms: 10_000,
        }
    }
}

impl Strategy {
    pub fn max_failures(&self) -> u32 {
        match self {
            Strategy::Standard { max_failures, .. }
            | Strategy::FaultInjection { max_failures, .. } => *max_failures,
        }
    }

    pub fn window_ms(&self) -> u64 {
        match self {
            Strategy::Standard { window_ms, .. }
            | Strategy::FaultInjection { window_ms, .. } => *window_ms,
        }
    }

    pub fn is_valid(&self) -> Result<()> {
        if self.window_ms() == 0 {
            return Err(Error::msg("invalid window_ms"));
        }
        if let Strategy::FaultInjection { rate, .. } = self {
            if !(0.0..=1.0).contains(rate) {
                return Err(Error::msg(
                    "invalid fault injection rate (valid range: [0.0, 1.0])",
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).unwrap();
        write!(f, "{}", fmtted)
    }
}

/// States of the fuse state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Ok,
    Blown { since: u64 },
}

/// Verdict of one ask. A missing service is reported by the registry, not
/// here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AskResult {
    Ok,
    Blown,
}

impl AskResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, AskResult::Ok)
    }

    pub fn is_blown(&self) -> bool {
        matches!(self, AskResult::Blown)
    }
}

#[derive(Debug, Default)]
struct FuseInner {
    // failure timestamps inside the sliding window, oldest first
    melts: VecDeque<u64>,
    state: State,
}

impl Default for State {
    fn default() -> State {
        State::Ok
    }
}

/// A named circuit breaker attached to one external service.
///
/// `ask` and `melt` are linearizable against each other; all mutation goes
/// through the inner lock.
#[derive(Debug)]
pub struct Fuse {
    service: String,
    strategy: Strategy,
    refresh_ms: u64,
    inner: Mutex<FuseInner>,
}

impl Fuse {
    pub fn new(service: impl Into<String>, strategy: Strategy, refresh_ms: u64) -> Self {
        Fuse {
            service: service.into(),
            strategy,
            refresh_ms,
            inner: Mutex::new(FuseInner::default()),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn current_state(&self) -> State {
        self.inner.lock().unwrap().state
    }

    /// Number of failures currently inside the sliding window.
    pub fn recent_failures(&self) -> usize {
        let now = utils::curr_time_millis();
        let mut inner = self.inner.lock().unwrap();
        evict_stale(&mut inner.melts, now, self.strategy.window_ms());
        inner.melts.len()
    }

    /// Pure read with a lazy transition: a fuse blown for at least
    /// `refresh_ms` resets to Ok before answering.
    pub fn ask(&self) -> AskResult {
        let mut inner = self.inner.lock().unwrap();
        if let State::Blown { since } = inner.state {
            if utils::curr_time_millis() >= since.saturating_add(self.refresh_ms) {
                inner.state = State::Ok;
                inner.melts.clear();
                drop(inner);
                event::emit_fuse_ok(&self.service);
                return self.injected_verdict();
            }
            return AskResult::Blown;
        }
        drop(inner);
        self.injected_verdict()
    }

    /// Record a failure at the current time. Crossing the threshold blows
    /// the fuse with `since = now`; a melt while already Blown is recorded
    /// but never extends `since`.
    pub fn melt(&self) {
        let now = utils::curr_time_millis();
        let mut inner = self.inner.lock().unwrap();
        evict_stale(&mut inner.melts, now, self.strategy.window_ms());
        inner.melts.push_back(now);
        let blew = inner.state == State::Ok
            && inner.melts.len() as u64 > self.strategy.max_failures() as u64;
        if blew {
            inner.state = State::Blown { since: now };
        }
        drop(inner);
        event::emit_fuse_melt(&self.service);
        if blew {
            event::emit_fuse_blown(&self.service);
        }
    }

    /// Force the fuse back to Ok and clear the failure counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        let was_blown = matches!(inner.state, State::Blown { .. });
        inner.state = State::Ok;
        inner.melts.clear();
        drop(inner);
        if was_blown {
            event::emit_fuse_ok(&self.service);
        }
    }

    fn injected_verdict(&self) -> AskResult {
        if let Strategy::FaultInjection { rate, .. } = self.strategy {
            if rand::thread_rng().gen::<f64>() < rate {
                return AskResult::Blown;
            }
        }
        AskResult::Ok
    }
}

fn evict_stale(melts: &mut VecDeque<u64>, now: u64, window_ms: u64) {
    while let Some(&ts) = melts.front() {
        if now.saturating_sub(ts) >= window_ms {
            melts.pop_front();
        } else {
            break;
        }
    }
}
