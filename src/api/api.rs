use crate::core::executor;
use crate::core::registry;
use crate::{Error, Result};

pub use crate::core::base::{
    clear_event_listeners, register_event_listeners, CallError, EventListener, Outcome, Reason,
    ReasonTrait, ReasonUnknown, SleepFn,
};
pub use crate::core::fuse::{AskResult, State, Strategy};
pub use crate::core::limiter::{Admission, RateLimit};
pub use crate::core::registry::{Service, ServiceOptions, StartResult};
pub use crate::core::retry::{Backoff, DelaySequence, RetryClassifier, RetryPolicy};

/// Register `service` with the given options, installing its fuse and,
/// when configured, its rate limiter.
///
/// Starting an already-started service is idempotent: the entry is
/// reinstalled with the new options and `StartResult::Restarted` is
/// returned. Calls already in flight finish against the entry they
/// resolved. Invalid options (zero windows, out-of-range fault-injection
/// rate) are rejected.
pub fn start(service: &str, options: ServiceOptions) -> Result<StartResult> {
    registry::install(service, options)
}

/// Tear the service down. Subsequent calls fail with
/// [`CallError::FuseNotFound`].
pub fn stop(service: &str) -> std::result::Result<(), CallError> {
    registry::remove(service)
}

/// Force the service's fuse back to Ok, clearing its failure counters. The
/// rate limiter keeps its admission history.
pub fn reset(service: &str) -> std::result::Result<(), CallError> {
    registry::reset(service)
}

/// Run `thunk` under the service's fuse, rate limiter and retry policy.
///
/// `policy` overrides the service's default retry policy for this call
/// only. Each attempt asks the fuse first (a blown fuse fails the call with
/// [`CallError::FuseBlown`] without invoking the thunk), then acquires a
/// rate-limiter admission (deferrals sleep, and those sleeps count toward
/// the policy's expiry), then runs the thunk. Failed attempts melt the fuse
/// exactly once; the success path never melts.
///
/// Raised errors come back untouched inside [`CallError::Raised`], either
/// immediately when their class is not retriable, or as the last captured
/// error once retries are exhausted.
pub fn call<T, F>(
    service: &str,
    policy: Option<&RetryPolicy>,
    thunk: F,
) -> std::result::Result<T, CallError>
where
    F: FnMut() -> Outcome<T>,
{
    executor::execute(service, policy, thunk)
}

/// Like [`call`], but folds the structured error variants into
/// [`crate::Error`] so the result composes with `?`. A raised thunk error
/// passes through as-is; the pipeline's own verdicts are converted.
pub fn call_strict<T, F>(service: &str, policy: Option<&RetryPolicy>, thunk: F) -> Result<T>
where
    F: FnMut() -> Outcome<T>,
{
    call(service, policy, thunk).map_err(|err| match err {
        CallError::Raised(raised) => raised,
        other => Error::new(other),
    })
}
