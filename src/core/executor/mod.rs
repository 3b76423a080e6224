//! The per-call orchestrator. One call resolves its registry entry once,
//! then walks the retry-delay sequence; each attempt asks the fuse, goes
//! through the rate limiter, runs the thunk under a panic guard and feeds
//! the classified outcome back into the fuse and the retry driver.
//!
//! Ordering contract: the fuse ask precedes rate limiting, rate-limiting
//! sleeps precede the thunk, and exactly one melt is recorded per failed
//! attempt. The success path never melts.

use super::base::{CallError, Outcome, Reason};
use super::fuse::AskResult;
use super::registry;
use super::retry::RetryPolicy;
use crate::{logging, utils};
use std::sync::Arc;

/// What the previous attempt left behind, for when the budget runs out.
enum LastFailure {
    None,
    Retry(Option<Arc<Reason>>),
    Raised(crate::Error),
}

impl LastFailure {
    fn into_error(self) -> CallError {
        match self {
            LastFailure::Retry(reason) => CallError::exhausted(reason),
            LastFailure::Raised(err) => CallError::Raised(err),
            LastFailure::None => CallError::exhausted(None),
        }
    }
}

pub(crate) fn execute<T, F>(
    service: &str,
    policy: Option<&RetryPolicy>,
    mut thunk: F,
) -> Result<T, CallError>
where
    F: FnMut() -> Outcome<T>,
{
    let entry = match registry::lookup(service) {
        Some(entry) => entry,
        None => {
            logging::error!("[Executor] No fuse installed for service {}", service);
            return Err(CallError::not_found(service));
        }
    };
    let policy = match policy {
        Some(policy) => policy.clone(),
        None => entry.default_retry().clone(),
    };

    let start = utils::curr_time_millis();
    let deadline = policy.expiry_ms.map(|ms| start.saturating_add(ms));
    let mut delays = policy.delays();
    let mut last = LastFailure::None;
    let mut first_attempt = true;

    loop {
        if first_attempt {
            first_attempt = false;
        } else {
            // the sequence is unbounded, so next() always yields
            let delay = delays.next().unwrap_or(0);
            if let Some(deadline) = deadline {
                if utils::curr_time_millis().saturating_add(delay) >= deadline {
                    return Err(last.into_error());
                }
            }
            if delay > 0 {
                (**entry.sleep_fn())(delay);
            }
        }

        match entry.fuse().ask() {
            AskResult::Blown => return Err(CallError::blown(service)),
            AskResult::Ok => {}
        }

        let guarded = match entry.limiter() {
            Some(limiter) => limiter.call(entry.sleep_fn(), || run_guarded(&mut thunk)),
            None => run_guarded(&mut thunk),
        };

        match guarded {
            Ok(Outcome::Value(value)) => return Ok(value),
            Ok(Outcome::Retry) => {
                entry.fuse().melt();
                last = LastFailure::Retry(None);
            }
            Ok(Outcome::RetryWith(reason)) => {
                entry.fuse().melt();
                last = LastFailure::Retry(Some(reason));
            }
            Ok(Outcome::Raised(err)) => {
                entry.fuse().melt();
                if policy.is_retriable(&err) {
                    last = LastFailure::Raised(err);
                } else {
                    return Err(CallError::Raised(err));
                }
            }
            Err(payload) => {
                // the melt must land even when the thunk panicked
                entry.fuse().melt();
                std::panic::resume_unwind(payload);
            }
        }
    }
}

fn run_guarded<T, F>(thunk: &mut F) -> std::thread::Result<Outcome<T>>
where
    F: FnMut() -> Outcome<T>,
{
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| thunk()))
}
