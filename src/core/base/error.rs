use super::{Reason, ReasonUnknown};
use crate::Error;
use std::fmt;
use std::sync::Arc;

/// CallError indicates why a wrapped call did not produce a value.
///
/// The first three variants are produced by the pipeline itself; `Raised`
/// carries the thunk's own error unchanged. A raised error is never wrapped:
/// the value inside `Raised` is the error the thunk reported, so callers can
/// downcast it back to its concrete type.
#[derive(Debug)]
pub enum CallError {
    /// `start` was never called for the service, or `stop` has been.
    FuseNotFound { service: String },
    /// The service's fuse was open at the moment of ask.
    FuseBlown { service: String },
    /// The retry budget ran out with the last attempt still requesting a
    /// retry. `reason` is the payload of the last `RetryWith`, or
    /// [`ReasonUnknown`] for a bare `Retry`.
    RetriesExhausted { reason: Arc<Reason> },
    /// The thunk raised an error that the policy does not retry, or retries
    /// on it were exhausted.
    Raised(Error),
}

impl CallError {
    pub fn not_found(service: impl Into<String>) -> Self {
        CallError::FuseNotFound {
            service: service.into(),
        }
    }

    pub fn blown(service: impl Into<String>) -> Self {
        CallError::FuseBlown {
            service: service.into(),
        }
    }

    pub fn exhausted(reason: Option<Arc<Reason>>) -> Self {
        CallError::RetriesExhausted {
            reason: reason.unwrap_or_else(|| Arc::new(ReasonUnknown)),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CallError::FuseNotFound { .. })
    }

    pub fn is_blown(&self) -> bool {
        matches!(self, CallError::FuseBlown { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, CallError::RetriesExhausted { .. })
    }

    pub fn is_raised(&self) -> bool {
        matches!(self, CallError::Raised(_))
    }

    /// The service the error refers to, for the fuse-related variants.
    pub fn service(&self) -> Option<&str> {
        match self {
            CallError::FuseNotFound { service } | CallError::FuseBlown { service } => {
                Some(service)
            }
            _ => None,
        }
    }

    /// The exhaustion reason, when this is `RetriesExhausted`.
    pub fn reason(&self) -> Option<&Arc<Reason>> {
        match self {
            CallError::RetriesExhausted { reason } => Some(reason),
            _ => None,
        }
    }

    /// The raised error, when this is `Raised`.
    pub fn raised(&self) -> Option<&Error> {
        match self {
            CallError::Raised(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::FuseNotFound { service } => {
                write!(f, "no fuse installed for service {}", service)
            }
            CallError::FuseBlown { service } => {
                write!(f, "fuse blown for service {}", service)
            }
            CallError::RetriesExhausted { reason } => {
                write!(f, "retries exhausted, last reason: {:?}", reason)
            }
            CallError::Raised(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CallError::Raised(err) => {
                let source: &(dyn std::error::Error + 'static) = err.as_ref();
                Some(source)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::AsAny;

    #[test]
    fn variant_helpers() {
        let not_found = CallError::not_found("abc");
        assert!(not_found.is_not_found());
        assert_eq!(not_found.service(), Some("abc"));

        let blown = CallError::blown("abc");
        assert!(blown.is_blown());
        assert_eq!(blown.service(), Some("abc"));

        let raised = CallError::Raised(Error::msg("io down"));
        assert!(raised.is_raised());
        assert!(raised.service().is_none());
        assert_eq!(format!("{}", raised), "io down");
    }

    #[test]
    fn exhausted_defaults_to_reason_unknown() {
        let bare = CallError::exhausted(None);
        let reason = bare.reason().unwrap();
        assert!(reason.as_any().downcast_ref::<ReasonUnknown>().is_some());

        let tagged = CallError::exhausted(Some(Arc::new("boom")));
        let reason = tagged.reason().unwrap();
        assert_eq!(reason.as_any().downcast_ref::<&str>(), Some(&"boom"));
    }

    #[test]
    fn raised_keeps_original_class() {
        let original = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        let err = CallError::Raised(Error::new(original));
        let raised = err.raised().unwrap();
        assert!(raised.is::<std::io::Error>());
    }
}
