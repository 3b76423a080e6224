#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # Fusebox
//!
//! Fusebox protects a process's outbound calls to unreliable external
//! services. For each logically distinct dependency it keeps three
//! coordinated controls: a **fuse** (circuit breaker), a **rate limiter**
//! and a **retry policy**, and exposes a single wrapping operation that runs
//! a caller-supplied thunk under all three. The caller performs the actual
//! network or IO work; Fusebox contributes the failure-handling discipline
//! around it.
//!
//! Generally, there are three steps when using Fusebox:
//! 1. `start` a named service with its fuse, rate-limit and retry defaults.
//! 2. Wrap each outbound invocation in [`call`] (or [`call_async`] /
//!    [`call_stream`] with the `async` feature).
//! 3. Signal retry or failure from the thunk through [`Outcome`].
//!
//! ## Add Dependency
//!
//! Add the dependency in `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! fusebox = { version = "0.1.0", features = ["full"] }
//! ```
//!
//! Optional features:
//! - async: the asynchronous façade, `call_async` and `call_stream` (enabled
//!   by default).
//! - logger_env: use `env_logger` to initialize logging.
//! - logger_log4rs: use `log4rs` to initialize logging.
//!
//! ## Start a Service
//!
//! A service is registered under a process-unique name. `start` installs the
//! fuse and (optionally) the rate limiter; restarting an already-started
//! service reinstalls it with the new options while in-flight calls finish
//! against the state they resolved.
//!
//! ```
//! use fusebox::{start, ServiceOptions, Strategy, RateLimit};
//!
//! let options = ServiceOptions {
//!     strategy: Strategy::Standard { max_failures: 5, window_ms: 10_000 },
//!     refresh_ms: 30_000,
//!     rate_limit: Some(RateLimit::new(100, 1_000).unwrap()),
//!     ..Default::default()
//! };
//! start("doc-payments", options).unwrap();
//! ```
//!
//! ## Wrap Calls
//!
//! The thunk reports its result through [`Outcome`]: `Value` is returned
//! verbatim, `Retry`/`RetryWith` request another attempt, and `Raised`
//! carries an error whose class decides between retrying and propagating.
//!
//! ```
//! use fusebox::{start, call, ServiceOptions, Outcome, RetryPolicy, Backoff};
//!
//! start("doc-quotes", ServiceOptions::default()).unwrap();
//! let policy = RetryPolicy::new(Backoff::Linear { initial_ms: 0, factor: 1.0 });
//! let result = call("doc-quotes", Some(&policy), || Outcome::Value(42));
//! assert_eq!(result.unwrap(), 42);
//! ```
//!
//! When the fuse for a service has blown, [`call`] fails fast with
//! [`CallError::FuseBlown`] until the refresh interval elapses, without
//! invoking the thunk at all.
//!
//! ## Observation Hooks
//!
//! Fuse state transitions, melts and rate-limit deferrals are published to
//! registered [`EventListener`]s; see [`register_event_listeners`]. Fusebox
//! never fails because no listener is attached.

// This module is not intended to be part of the public API. In general, any
// `doc(hidden)` code is not part of Fusebox's public and stable API.
#[macro_use]
#[doc(hidden)]
pub mod macros;

/// Fusebox API
pub mod api;
/// Core implementations of Fusebox: the fuse state machine, the rolling
/// admission window of the rate limiter, the retry delay sequences, the
/// per-service registry and the orchestrator that composes them.
pub mod core;
/// Adapters for different logging crates.
pub mod logging;
// Utility functions for Fusebox.
pub mod utils;

// re-export preludes
pub use crate::core::*;
pub use api::*;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
