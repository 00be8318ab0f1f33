//! Per-primitive conversion between configuration values and remote values.
//!
//! The two generic functions [`to_remote`] and [`from_remote`] implement the
//! tri-state rules every codec shares: a [`TriState::Null`] value is absent on
//! the remote side, an absent remote value is [`TriState::Null`] and a
//! [`TriState::Unknown`] value can never be written.
//!
//! The [`FieldCodec`] implementations handle the value mapping itself.
use serde_json::Value;
use snafu::{OptionExt, Snafu};

use crate::value::{Scalar, ScalarKind, TriState};

mod timestamp;

pub use timestamp::TimestampCodec;

#[derive(Debug, PartialEq, Snafu)]
pub enum ConversionError {
    #[snafu(display("value is not known yet and cannot be written"))]
    UnknownNotWritable,

    #[snafu(display("collection elements cannot be null"))]
    NullElement,

    #[snafu(display("invalid timestamp {input:?}: {reason}"))]
    BadTimestamp { input: String, reason: String },

    #[snafu(display("expected {expected}, found {found}"))]
    TypeMismatch { expected: String, found: String },
}

impl ConversionError {
    pub(crate) fn type_mismatch(expected: impl ToString, found: impl ToString) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

/// Converts a tri-state configuration value into an optional remote value.
///
/// ```
/// # use reconciler::{codec, value::TriState};
/// assert_eq!(codec::to_remote(TriState::Known(5)), Ok(Some(5)));
/// assert_eq!(codec::to_remote::<i64>(TriState::Null), Ok(None));
/// assert!(codec::to_remote::<i64>(TriState::Unknown).is_err());
/// ```
pub fn to_remote<T>(value: TriState<T>) -> Result<Option<T>, ConversionError> {
    match value {
        TriState::Null => Ok(None),
        TriState::Unknown => UnknownNotWritableSnafu.fail(),
        TriState::Known(value) => Ok(Some(value)),
    }
}

/// Converts an optional remote value into a tri-state configuration value.
///
/// Never produces [`TriState::Unknown`].
pub fn from_remote<T>(value: Option<T>) -> TriState<T> {
    value.into()
}

/// A conversion pair between a configuration value and its remote form.
pub trait FieldCodec {
    type Config;
    type Remote;

    fn encode(&self, value: Self::Config) -> Result<Self::Remote, ConversionError>;

    fn decode(&self, value: Self::Remote) -> Result<Self::Config, ConversionError>;

    fn to_remote(
        &self,
        value: TriState<Self::Config>,
    ) -> Result<Option<Self::Remote>, ConversionError> {
        to_remote(value)?.map(|value| self.encode(value)).transpose()
    }

    fn from_remote(
        &self,
        value: Option<Self::Remote>,
    ) -> Result<TriState<Self::Config>, ConversionError> {
        from_remote(value).try_map(|value| self.decode(value))
    }
}

/// Maps a [`Scalar`] to and from a JSON value according to a [`ScalarKind`].
///
/// Timestamps are delegated to [`TimestampCodec`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScalarCodec {
    pub kind: ScalarKind,
}

impl ScalarCodec {
    pub fn new(kind: ScalarKind) -> Self {
        Self { kind }
    }
}

impl FieldCodec for ScalarCodec {
    type Config = Scalar;
    type Remote = Value;

    fn encode(&self, value: Scalar) -> Result<Value, ConversionError> {
        match (self.kind, value) {
            (ScalarKind::String, Scalar::String(value)) => Ok(Value::String(value)),
            (ScalarKind::Integer, Scalar::Integer(value)) => Ok(Value::from(value)),
            (ScalarKind::Float, Scalar::Integer(value)) => float_value(value as f64),
            (ScalarKind::Float, Scalar::Float(value)) => float_value(value),
            (ScalarKind::Bool, Scalar::Bool(value)) => Ok(Value::Bool(value)),
            (ScalarKind::Timestamp, Scalar::String(value)) => {
                TimestampCodec.encode(value).map(Value::from)
            }
            (kind, value) => Err(ConversionError::type_mismatch(kind, value.kind())),
        }
    }

    fn decode(&self, value: Value) -> Result<Scalar, ConversionError> {
        let found = json_type_name(&value);
        let scalar = match self.kind {
            ScalarKind::String => value.as_str().map(Scalar::from),
            ScalarKind::Integer => value.as_i64().map(Scalar::Integer),
            ScalarKind::Float => value.as_f64().map(Scalar::Float),
            ScalarKind::Bool => value.as_bool().map(Scalar::Bool),
            ScalarKind::Timestamp => match value.as_i64() {
                Some(seconds) => return TimestampCodec.decode(seconds).map(Scalar::String),
                None => None,
            },
        };

        scalar.with_context(|| TypeMismatchSnafu {
            expected: self.kind.to_string(),
            found,
        })
    }
}

fn float_value(value: f64) -> Result<Value, ConversionError> {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .with_context(|| TypeMismatchSnafu {
            expected: "finite float",
            found: value.to_string(),
        })
}

/// The JSON type of `value`, used in type mismatch errors.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(number) if number.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case(ScalarKind::String, Scalar::from("mail.example.com"), json!("mail.example.com"))]
    #[case(ScalarKind::Integer, Scalar::Integer(-3), json!(-3))]
    #[case(ScalarKind::Float, Scalar::Float(0.25), json!(0.25))]
    #[case(ScalarKind::Bool, Scalar::Bool(false), json!(false))]
    #[case(
        ScalarKind::Timestamp,
        Scalar::from("2024-03-01T12:00:00Z"),
        json!(1_709_294_400)
    )]
    fn scalar_round_trip(
        #[case] kind: ScalarKind,
        #[case] config: Scalar,
        #[case] remote: Value,
    ) {
        let codec = ScalarCodec::new(kind);

        let encoded = codec.to_remote(TriState::Known(config.clone())).unwrap();
        assert_eq!(encoded, Some(remote.clone()));
        assert_eq!(
            codec.from_remote(Some(remote)).unwrap(),
            TriState::Known(config)
        );
    }

    #[rstest]
    #[case(ScalarKind::String)]
    #[case(ScalarKind::Timestamp)]
    fn null_and_unknown(#[case] kind: ScalarKind) {
        let codec = ScalarCodec::new(kind);

        assert_eq!(codec.to_remote(TriState::Null), Ok(None));
        assert_eq!(
            codec.to_remote(TriState::Unknown),
            Err(ConversionError::UnknownNotWritable)
        );
        assert_eq!(codec.from_remote(None), Ok(TriState::Null));
    }

    #[rstest]
    #[case(ScalarKind::Integer, json!("7"), "string")]
    #[case(ScalarKind::Bool, json!(1), "integer")]
    #[case(ScalarKind::String, json!({"a": 1}), "object")]
    #[case(ScalarKind::Timestamp, json!("2024-03-01T12:00:00Z"), "string")]
    fn decode_type_mismatch(#[case] kind: ScalarKind, #[case] remote: Value, #[case] found: &str) {
        let err = ScalarCodec::new(kind).decode(remote).unwrap_err();
        assert_eq!(err, ConversionError::type_mismatch(kind, found));
    }

    #[test]
    fn encode_type_mismatch() {
        let err = ScalarCodec::new(ScalarKind::Integer)
            .encode(Scalar::from("abc"))
            .unwrap_err();
        assert_eq!(err.to_string(), "expected integer, found string");
    }

    #[test]
    fn float_accepts_integers() {
        let codec = ScalarCodec::new(ScalarKind::Float);
        assert_eq!(codec.encode(Scalar::Integer(2)), Ok(json!(2.0)));
    }
}
