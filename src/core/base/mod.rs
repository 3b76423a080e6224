pub mod error;
pub mod event;
pub mod outcome;

pub use self::error::*;
pub use self::event::*;
pub use self::outcome::*;

use std::sync::Arc;

/// Hook invoked whenever the pipeline has to block the calling task, with
/// the delay in milliseconds. Tests install a recording hook; production
/// uses a real sleep.
pub type SleepFn = Arc<dyn Fn(u64) + Send + Sync>;
