//! The contract of the remote management API.
//!
//! The engine never talks to the network itself. Callers implement
//! [`RemoteClient`] on top of whatever transport and authentication their
//! remote system needs and hand it to the functions in [`crate::reconcile`]
//! and [`crate::identity`].
use snafu::Snafu;

use crate::{
    identity::{LookupScope, SecondaryKey},
    value::RemoteObject,
};

/// How a remote call failed, as reported by the transport.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum TransportErrorKind {
    /// The call may succeed when repeated.
    Transient,

    /// The call will keep failing, for example because of rejected credentials.
    Permanent,

    /// The call was cancelled by the caller.
    Cancelled,

    /// The call did not complete in time.
    TimedOut,
}

/// An opaque failure of the transport layer.
///
/// The engine never retries. It passes these errors through unchanged and
/// never maps them onto "not found".
#[derive(Clone, Debug, PartialEq, Eq, Snafu)]
#[snafu(display("{kind} transport failure: {message}"))]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind == TransportErrorKind::Permanent
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::Transient | TransportErrorKind::TimedOut
        )
    }
}

#[derive(Debug, Snafu)]
pub enum RemoteError {
    #[snafu(display("remote resource {reference:?} was not found"))]
    NotFound { reference: String },

    #[snafu(display("remote call failed"), context(false))]
    Transport { source: TransportError },
}

impl RemoteError {
    /// Whether the error means the resource does not exist (any more).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Transport { source } => Some(source),
            Self::NotFound { .. } => None,
        }
    }
}

/// A remote object together with the opaque reference the remote system
/// addresses it by.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteResource {
    pub reference: String,
    pub object: RemoteObject,
}

/// Returns true if `result` failed because the resource does not exist.
pub fn is_not_found<T>(result: &Result<T, RemoteError>) -> bool {
    matches!(result, Err(error) if error.is_not_found())
}

/// Basic operations of the remote management API.
///
/// Implementations must be safe to share between threads. Every call is
/// blocking from the engine's point of view.
pub trait RemoteClient: Send + Sync {
    /// Creates a resource of `resource_type` and returns it with its new
    /// reference.
    fn create(
        &self,
        resource_type: &str,
        payload: &RemoteObject,
    ) -> Result<RemoteResource, RemoteError>;

    fn read(&self, reference: &str) -> Result<RemoteObject, RemoteError>;

    /// Applies `payload` to an existing resource and returns the updated
    /// object.
    fn update(&self, reference: &str, payload: &RemoteObject)
    -> Result<RemoteObject, RemoteError>;

    fn delete(&self, reference: &str) -> Result<(), RemoteError>;

    /// Searches `resource_type` for resources whose `key.field` equals
    /// `key.value`, restricted to `scope`.
    fn list(
        &self,
        resource_type: &str,
        scope: &LookupScope,
        key: &SecondaryKey,
    ) -> Result<Vec<RemoteResource>, TransportError>;
}
