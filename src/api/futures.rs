//! Asynchronous façade. `call_async` runs one wrapped call on a blocking
//! task; `call_stream` maps an input sequence through wrapped calls with
//! bounded parallelism, yielding per-input results in input order.
//!
//! The pipeline itself stays blocking: each in-flight call occupies one
//! blocking thread through its sleeps and its thunk. Dropping the returned
//! future or stream stops pulling; inputs not yet spawned never run, while
//! attempts already on a blocking thread complete against their entry.

use crate::core::base::{CallError, Outcome};
use crate::core::executor;
use crate::core::retry::RetryPolicy;
use futures::stream::{self, Stream, StreamExt};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Options of [`call_stream`].
///
/// `retry` is accepted here as well as positionally; the positional policy
/// argument takes precedence when both are supplied.
#[derive(Debug, Clone, Default)]
pub struct StreamOpts {
    /// Upper bound on in-flight calls; defaults to the available
    /// parallelism.
    pub max_concurrency: Option<usize>,
    /// Per-item deadline. An item that misses it yields
    /// `ExitReason::TimedOut`; no deadline when absent.
    pub timeout_ms: Option<u64>,
    pub retry: Option<RetryPolicy>,
}

/// Why a stream item did not produce a value.
#[derive(Debug)]
pub enum ExitReason {
    Error(CallError),
    Panicked(String),
    TimedOut,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Error(err) => write!(f, "{}", err),
            ExitReason::Panicked(msg) => write!(f, "worker panicked: {}", msg),
            ExitReason::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Per-input result of [`call_stream`], in input order.
#[derive(Debug)]
pub enum StreamItem<T> {
    Ok(T),
    Exited(ExitReason),
}

impl<T> StreamItem<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, StreamItem::Ok(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            StreamItem::Ok(value) => Some(value),
            StreamItem::Exited(_) => None,
        }
    }

    pub fn exit_reason(&self) -> Option<&ExitReason> {
        match self {
            StreamItem::Ok(_) => None,
            StreamItem::Exited(reason) => Some(reason),
        }
    }
}

/// Run one wrapped call on a background blocking task and await its result.
///
/// Semantics match [`call`](crate::call); a panicking thunk melts the fuse
/// and resumes unwinding on the awaiting task.
pub async fn call_async<T, F>(
    service: &str,
    policy: Option<RetryPolicy>,
    thunk: F,
) -> Result<T, CallError>
where
    T: Send + 'static,
    F: FnMut() -> Outcome<T> + Send + 'static,
{
    let service = service.to_owned();
    let task =
        tokio::task::spawn_blocking(move || executor::execute(&service, policy.as_ref(), thunk));
    match task.await {
        Ok(result) => result,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(err) => Err(CallError::Raised(crate::Error::new(err))),
    }
}

/// Map `inputs` through wrapped calls with bounded parallelism.
///
/// Up to `max_concurrency` calls run at once; results come back in input
/// order, each tagged `Ok` or `Exited`. The stream pulls from `inputs` only
/// as fast as downstream consumes. A panicking worker is reported on its
/// own item and does not abort the others.
pub fn call_stream<I, T, F>(
    inputs: I,
    service: &str,
    policy: Option<RetryPolicy>,
    opts: StreamOpts,
    map_thunk: F,
) -> impl Stream<Item = StreamItem<T>>
where
    I: IntoIterator,
    I::Item: Send + 'static,
    T: Send + 'static,
    F: Fn(&I::Item) -> Outcome<T> + Send + Sync + 'static,
{
    let max_concurrency = opts
        .max_concurrency
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
        .max(1);
    let policy = policy.or(opts.retry);
    let timeout_ms = opts.timeout_ms;
    let service = service.to_owned();
    let map_thunk = Arc::new(map_thunk);

    stream::iter(inputs)
        .map(move |item| {
            let service = service.clone();
            let policy = policy.clone();
            let map_thunk = Arc::clone(&map_thunk);
            async move {
                let task = tokio::task::spawn_blocking(move || {
                    executor::execute(&service, policy.as_ref(), move || (*map_thunk)(&item))
                });
                let joined = match timeout_ms {
                    Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), task).await {
                        Ok(joined) => joined,
                        Err(_) => return StreamItem::Exited(ExitReason::TimedOut),
                    },
                    None => task.await,
                };
                match joined {
                    Ok(Ok(value)) => StreamItem::Ok(value),
                    Ok(Err(err)) => StreamItem::Exited(ExitReason::Error(err)),
                    Err(err) if err.is_panic() => {
                        StreamItem::Exited(ExitReason::Panicked(panic_message(err.into_panic())))
                    }
                    Err(_) => StreamItem::Exited(ExitReason::Panicked("task cancelled".into())),
                }
            }
        })
        .buffered(max_concurrency)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).into()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".into()
    }
}
