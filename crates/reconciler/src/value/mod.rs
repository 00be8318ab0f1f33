//! The value layer of the engine.
//!
//! Every configuration field is wrapped in a [`TriState`], which keeps the
//! difference between a value that was explicitly cleared ([`TriState::Null`])
//! and a value that is not determined yet ([`TriState::Unknown`]). The two are
//! never collapsed into the same sentinel: writing an unknown value to the
//! remote system is an error, while writing a null value removes the field.
//!
//! On top of that this module defines the dynamic tree a [`ResourceModel`] is
//! made of ([`ModelValue`] and [`Scalar`]) and the remote-native
//! [`RemoteObject`].

mod model;
mod scalar;

pub use model::*;
pub use scalar::*;

/// The remote system's native representation of a resource.
///
/// A missing key and an explicit JSON `null` both mean "absent".
pub type RemoteObject = serde_json::Map<String, serde_json::Value>;

/// A configuration value with three-valued semantics.
///
/// ```
/// # use reconciler::value::TriState;
/// let port: TriState<i64> = Some(8080).into();
/// assert_eq!(port, TriState::Known(8080));
///
/// let cleared: TriState<i64> = None.into();
/// assert!(cleared.is_null());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TriState<T> {
    /// The value was explicitly cleared or is absent.
    #[default]
    Null,

    /// The value will be determined later, usually by the remote system.
    Unknown,

    /// A concrete value.
    Known(T),
}

impl<T> TriState<T> {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// Returns the contained value if it is [`TriState::Known`].
    pub fn known(&self) -> Option<&T> {
        match self {
            Self::Known(value) => Some(value),
            Self::Null | Self::Unknown => None,
        }
    }

    /// Consumes `self` and returns the contained value if it is [`TriState::Known`].
    pub fn into_known(self) -> Option<T> {
        match self {
            Self::Known(value) => Some(value),
            Self::Null | Self::Unknown => None,
        }
    }

    /// Maps the known value, keeping [`TriState::Null`] and [`TriState::Unknown`] as they are.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> TriState<U> {
        match self {
            Self::Null => TriState::Null,
            Self::Unknown => TriState::Unknown,
            Self::Known(value) => TriState::Known(f(value)),
        }
    }

    /// Fallible version of [`TriState::map`].
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<TriState<U>, E> {
        Ok(match self {
            Self::Null => TriState::Null,
            Self::Unknown => TriState::Unknown,
            Self::Known(value) => TriState::Known(f(value)?),
        })
    }
}

impl<T> From<Option<T>> for TriState<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Known(value),
            None => Self::Null,
        }
    }
}
