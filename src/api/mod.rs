//! mod `api` provides the topmost fundamental APIs for users using fusebox.
//! A service must be `start`ed before its calls can be wrapped; `call` and
//! its strict/async/stream variants then run caller-supplied thunks under
//! the service's fuse, rate limiter and retry policy.

mod api;
cfg_async! {
    mod futures;
}

pub use self::api::*;
cfg_async! {
    pub use self::futures::*;
}
