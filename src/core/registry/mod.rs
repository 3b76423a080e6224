//! Process-wide registry mapping each service identifier to its fuse, rate
//! limiter, default retry policy and sleep hook. The registry exclusively
//! owns per-service state; callers hold only the identifier.
//!
//! Reinstalling a service swaps the whole entry: calls already in flight
//! keep the `Arc` they resolved and finish against the state they observed.

use super::base::{CallError, SleepFn};
use super::fuse::{Fuse, Strategy};
use super::limiter::{RateLimit, RateLimiter};
use super::retry::RetryPolicy;
use crate::{logging, utils, Result};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

lazy_static! {
    static ref SERVICES: RwLock<HashMap<String, Arc<Service>>> = RwLock::new(HashMap::new());
}

/// Outcome of `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartResult {
    Started,
    /// The service was already started; its entry has been reinstalled with
    /// the new options.
    Restarted,
}

/// Options accepted by `start`.
pub struct ServiceOptions {
    pub strategy: Strategy,
    /// Time after blowing before the fuse auto-resets.
    pub refresh_ms: u64,
    /// Absent means pass-through: calls run without admission control.
    pub rate_limit: Option<RateLimit>,
    /// Default retry policy for calls that do not carry their own.
    pub retry: RetryPolicy,
    /// Blocking hook used for deferrals and inter-attempt delays; a real
    /// sleep when absent.
    pub sleep_fn: Option<SleepFn>,
}

impl Default for ServiceOptions {
    fn default() -> ServiceOptions {
        ServiceOptions {
            strategy: Strategy::default(),
            refresh_ms: 60_000,
            rate_limit: None,
            retry: RetryPolicy::default(),
            sleep_fn: None,
        }
    }
}

impl ServiceOptions {
    pub fn is_valid(&self) -> Result<()> {
        self.strategy.is_valid()?;
        if let Some(rate_limit) = &self.rate_limit {
            rate_limit.is_valid()?;
        }
        self.retry.is_valid()?;
        Ok(())
    }
}

impl fmt::Debug for ServiceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceOptions")
            .field("strategy", &self.strategy)
            .field("refresh_ms", &self.refresh_ms)
            .field("rate_limit", &self.rate_limit)
            .field("retry", &self.retry)
            .field("sleep_fn", &self.sleep_fn.as_ref().map(|_| "<sleep_fn>"))
            .finish()
    }
}

/// One registered service: the pipeline state shared by all of its callers.
pub struct Service {
    fuse: Fuse,
    limiter: Option<RateLimiter>,
    default_retry: RetryPolicy,
    sleep_fn: SleepFn,
}

impl Service {
    pub fn fuse(&self) -> &Fuse {
        &self.fuse
    }

    pub fn limiter(&self) -> Option<&RateLimiter> {
        self.limiter.as_ref()
    }

    pub fn default_retry(&self) -> &RetryPolicy {
        &self.default_retry
    }

    pub fn sleep_fn(&self) -> &SleepFn {
        &self.sleep_fn
    }
}

fn default_sleep_fn() -> SleepFn {
    Arc::new(utils::sleep_for_ms)
}

/// Install a service entry, replacing any previous one under the same name.
pub fn install(service: &str, options: ServiceOptions) -> Result<StartResult> {
    options.is_valid()?;
    let entry = Arc::new(Service {
        fuse: Fuse::new(service, options.strategy, options.refresh_ms),
        limiter: options
            .rate_limit
            .map(|config| RateLimiter::new(service, config)),
        default_retry: options.retry,
        sleep_fn: options.sleep_fn.unwrap_or_else(default_sleep_fn),
    });
    let previous = SERVICES.write().unwrap().insert(service.into(), entry);
    match previous {
        Some(_) => {
            logging::info!(
                "[Registry] Service {} was already started, reinstalled with new options",
                service
            );
            Ok(StartResult::Restarted)
        }
        None => Ok(StartResult::Started),
    }
}

/// Remove a service entry. In-flight calls holding the entry finish
/// normally; new calls fail with `FuseNotFound`.
pub fn remove(service: &str) -> std::result::Result<(), CallError> {
    match SERVICES.write().unwrap().remove(service) {
        Some(_) => Ok(()),
        None => Err(CallError::not_found(service)),
    }
}

/// Force the service's fuse back to Ok. The rate limiter is untouched.
pub fn reset(service: &str) -> std::result::Result<(), CallError> {
    match lookup(service) {
        Some(entry) => {
            entry.fuse().reset();
            Ok(())
        }
        None => Err(CallError::not_found(service)),
    }
}

pub fn lookup(service: &str) -> Option<Arc<Service>> {
    SERVICES.read().unwrap().get(service).cloned()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn start_then_lookup() {
        assert_eq!(
            install("registry_basic", ServiceOptions::default()).unwrap(),
            StartResult::Started
        );
        let entry = lookup("registry_basic").unwrap();
        assert_eq!(entry.fuse().service(), "registry_basic");
        assert!(entry.limiter().is_none());
    }

    #[test]
    fn restart_swaps_entry_but_inflight_holders_keep_theirs() {
        install("registry_restart", ServiceOptions::default()).unwrap();
        let old = lookup("registry_restart").unwrap();

        let options = ServiceOptions {
            strategy: Strategy::Standard {
                max_failures: 1,
                window_ms: 1_000,
            },
            ..Default::default()
        };
        assert_eq!(
            install("registry_restart", options).unwrap(),
            StartResult::Restarted
        );

        let new = lookup("registry_restart").unwrap();
        assert!(!Arc::ptr_eq(&old, &new));
        assert_eq!(new.fuse().strategy().max_failures(), 1);
        // the old entry is still usable by whoever resolved it
        assert!(old.fuse().ask().is_ok());
    }

    #[test]
    fn remove_unknown_service_is_not_found() {
        assert!(remove("registry_never_started").unwrap_err().is_not_found());
    }

    #[test]
    fn stop_then_lookup_fails() {
        install("registry_stop", ServiceOptions::default()).unwrap();
        remove("registry_stop").unwrap();
        assert!(lookup("registry_stop").is_none());
    }

    #[test]
    fn reset_clears_fuse_only() {
        let options = ServiceOptions {
            strategy: Strategy::Standard {
                max_failures: 0,
                window_ms: 10_000,
            },
            rate_limit: Some(RateLimit::new(1, 10_000).unwrap()),
            ..Default::default()
        };
        install("registry_reset", options).unwrap();
        let entry = lookup("registry_reset").unwrap();

        entry.fuse().melt();
        assert!(entry.fuse().ask().is_blown());
        assert!(entry.limiter().unwrap().admit().is_admitted());

        reset("registry_reset").unwrap();
        assert!(entry.fuse().ask().is_ok());
        // limiter still remembers its admission
        assert!(!entry.limiter().unwrap().admit().is_admitted());
    }

    #[test]
    fn invalid_options_are_rejected() {
        let options = ServiceOptions {
            strategy: Strategy::FaultInjection {
                rate: 7.0,
                max_failures: 10,
                window_ms: 1_000,
            },
            ..Default::default()
        };
        assert!(install("registry_invalid", options).is_err());
        assert!(lookup("registry_invalid").is_none());
    }
}
