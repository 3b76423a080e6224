use crate::{utils, Error};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Arbitrary payload attached to a retry request, surfaced verbatim in
/// [`CallError::RetriesExhausted`](super::CallError) when the attempts run out.
pub trait ReasonTrait: Any + fmt::Debug + utils::AsAny + Send + Sync {}
impl<T: Any + fmt::Debug + utils::AsAny + Send + Sync> ReasonTrait for T {}
pub type Reason = dyn ReasonTrait;

/// Distinguished reason reported when the last attempt requested a retry
/// without supplying one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReasonUnknown;

impl fmt::Display for ReasonUnknown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reason unknown")
    }
}

/// Result of one thunk invocation, as seen by the pipeline.
///
/// `Value` terminates the call successfully and is returned verbatim.
/// `Retry` and `RetryWith` request another attempt and melt the service's
/// fuse. `Raised` carries an error; whether it is retried depends on the
/// retry policy's classifiers.
#[derive(Debug)]
pub enum Outcome<T> {
    Value(T),
    Retry,
    RetryWith(Arc<Reason>),
    Raised(Error),
}

impl<T> Outcome<T> {
    /// Convenience for building `RetryWith` without spelling out the
    /// unsized coercion.
    pub fn retry_with<R: ReasonTrait>(reason: R) -> Self {
        Outcome::RetryWith(Arc::new(reason))
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Outcome::Value(_))
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, Outcome::Retry | Outcome::RetryWith(_))
    }

    pub fn is_raised(&self) -> bool {
        matches!(self, Outcome::Raised(_))
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Outcome::Value(value),
            Err(err) => Outcome::Raised(Error::new(err)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::AsAny;

    #[test]
    fn retry_with_reason_downcast() {
        let outcome: Outcome<()> = Outcome::retry_with("boom");
        match outcome {
            Outcome::RetryWith(reason) => {
                assert_eq!(reason.as_any().downcast_ref::<&str>(), Some(&"boom"));
            }
            _ => panic!("expected RetryWith"),
        }
    }

    #[test]
    fn from_result() {
        let ok: Outcome<u32> = Ok::<_, std::io::Error>(7).into();
        assert!(ok.is_value());

        let err: Outcome<u32> =
            Err::<u32, _>(std::io::Error::new(std::io::ErrorKind::Other, "io")).into();
        assert!(err.is_raised());
    }

    #[test]
    fn classification_helpers() {
        assert!(Outcome::Value(1).is_value());
        assert!(Outcome::<()>::Retry.is_retry());
        assert!(Outcome::<()>::retry_with(503_u16).is_retry());
        assert!(!Outcome::<()>::Retry.is_raised());
    }
}
