use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// The primitive kinds a leaf field can have.
///
/// [`ScalarKind::Timestamp`] is stored as an RFC 3339 string on the
/// configuration side and as integer epoch seconds on the remote side.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ScalarKind {
    String,
    Integer,
    Float,
    Bool,
    Timestamp,
}

impl ScalarKind {
    /// Parses `input` as a value of this kind.
    ///
    /// Returns [`None`] if `input` is not a valid textual representation.
    /// Surrounding whitespace is not accepted. Timestamps are checked for validity but kept in their textual form.
    pub fn parse(self, input: &str) -> Option<Scalar> {
        match self {
            Self::String => Some(Scalar::String(input.to_owned())),
            Self::Integer => input.parse().ok().map(Scalar::Integer),
            Self::Float => input.parse().ok().map(Scalar::Float),
            Self::Bool => input.parse().ok().map(Scalar::Bool),
            Self::Timestamp => input
                .parse::<jiff::Timestamp>()
                .ok()
                .map(|_| Scalar::String(input.to_owned())),
        }
    }

    /// Returns whether `scalar` is an acceptable value for a field of this kind.
    pub fn accepts(self, scalar: &Scalar) -> bool {
        match (self, scalar) {
            (Self::String, Scalar::String(_))
            | (Self::Integer, Scalar::Integer(_))
            | (Self::Float, Scalar::Float(_) | Scalar::Integer(_))
            | (Self::Bool, Scalar::Bool(_)) => true,
            (Self::Timestamp, Scalar::String(input)) => Self::Timestamp.parse(input).is_some(),
            _ => false,
        }
    }
}

/// A dynamically typed primitive value.
///
/// The serde representation is untagged, so `"7"`, `7`, `7.5` and `true`
/// deserialize into the string, integer, float and boolean variants.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    /// The natural kind of this value. Timestamps are reported as strings.
    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::String(_) => ScalarKind::String,
            Self::Integer(_) => ScalarKind::Integer,
            Self::Float(_) => ScalarKind::Float,
            Self::Bool(_) => ScalarKind::Bool,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(value) => f.write_str(value),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
