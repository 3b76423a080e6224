//! Retry policies and their delay sequences. A policy turns into a lazy,
//! unbounded sequence of inter-attempt delays; the orchestrator walks the
//! sequence and stops on success, on a non-retriable error, on a blown fuse
//! or when the policy's expiry budget runs out.

use crate::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Base delay progression before capping and randomization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Backoff {
    /// `d_n = initial_ms · 2^n`
    Exponential { initial_ms: u64 },
    /// `d_n = initial_ms + n · initial_ms · factor`
    Linear { initial_ms: u64, factor: f64 },
}

impl Default for Backoff {
    fn default() -> Backoff {
        Backoff::Exponential { initial_ms: 100 }
    }
}

impl Backoff {
    /// Delay of the n-th retry (0-based), saturating on overflow.
    pub fn delay_ms(&self, n: u32) -> u64 {
        match *self {
            Backoff::Exponential { initial_ms } => {
                let factor = 1u64.checked_shl(n).unwrap_or(u64::MAX);
                initial_ms.saturating_mul(factor)
            }
            Backoff::Linear { initial_ms, factor } => {
                let grown = n as f64 * initial_ms as f64 * factor;
                initial_ms.saturating_add(grown as u64)
            }
        }
    }

    pub fn is_valid(&self) -> Result<()> {
        if let Backoff::Linear { factor, .. } = self {
            if !factor.is_finite() || *factor < 0.0 {
                return Err(Error::msg("invalid linear backoff factor"));
            }
        }
        Ok(())
    }
}

/// Classifier deciding whether a raised error counts as retriable.
pub type RetryClassifier = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Per-call retry policy, overriding the per-service default when passed to
/// `call`.
///
/// The data fields serialize like any other configuration; the error
/// classifiers are code and are skipped. An empty classifier set means no
/// raised error is retried: failures propagate after a single melt.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub backoff: Backoff,
    /// Multiply every delay by a uniform random factor in `[1.0, 2.0)`.
    pub randomize: bool,
    /// Upper bound applied to each base delay, before randomization.
    pub cap_ms: Option<u64>,
    /// Total time budget measured from the start of the first attempt.
    pub expiry_ms: Option<u64>,
    #[serde(skip)]
    retry_on: Vec<RetryClassifier>,
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        RetryPolicy {
            backoff: Backoff::default(),
            randomize: false,
            cap_ms: None,
            expiry_ms: None,
            retry_on: Vec::new(),
        }
    }
}

impl RetryPolicy {
    pub fn new(backoff: Backoff) -> Self {
        RetryPolicy {
            backoff,
            ..Default::default()
        }
    }

    pub fn with_randomize(mut self, randomize: bool) -> Self {
        self.randomize = randomize;
        self
    }

    pub fn with_cap_ms(mut self, cap_ms: u64) -> Self {
        self.cap_ms = Some(cap_ms);
        self
    }

    pub fn with_expiry_ms(mut self, expiry_ms: u64) -> Self {
        self.expiry_ms = Some(expiry_ms);
        self
    }

    /// Treat raised errors of class `E` as retriable.
    pub fn retry_on<E>(mut self) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.retry_on.push(Arc::new(|err: &Error| err.is::<E>()));
        self
    }

    /// Treat raised errors matching `classifier` as retriable.
    pub fn retry_if(
        mut self,
        classifier: impl Fn(&Error) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.retry_on.push(Arc::new(classifier));
        self
    }

    pub fn is_retriable(&self, err: &Error) -> bool {
        self.retry_on.iter().any(|classifier| classifier(err))
    }

    pub fn is_valid(&self) -> Result<()> {
        self.backoff.is_valid()
    }

    /// The lazy delay sequence this policy generates.
    pub fn delays(&self) -> DelaySequence {
        DelaySequence {
            backoff: self.backoff,
            randomize: self.randomize,
            cap_ms: self.cap_ms,
            n: 0,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("backoff", &self.backoff)
            .field("randomize", &self.randomize)
            .field("cap_ms", &self.cap_ms)
            .field("expiry_ms", &self.expiry_ms)
            .field("retry_on", &self.retry_on.len())
            .finish()
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).unwrap();
        write!(f, "{}", fmtted)
    }
}

/// Unbounded iterator of inter-attempt delays: base progression, then cap,
/// then randomization.
#[derive(Debug, Clone)]
pub struct DelaySequence {
    backoff: Backoff,
    randomize: bool,
    cap_ms: Option<u64>,
    n: u32,
}

impl Iterator for DelaySequence {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let mut delay = self.backoff.delay_ms(self.n);
        self.n = self.n.saturating_add(1);
        if let Some(cap) = self.cap_ms {
            delay = delay.min(cap);
        }
        if self.randomize && delay > 0 {
            delay = (delay as f64 * rand::thread_rng().gen_range(1.0..2.0)) as u64;
        }
        Some(delay)
    }
}
