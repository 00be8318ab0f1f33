use jiff::Timestamp;

use crate::codec::{ConversionError, FieldCodec};

/// Converts RFC 3339 timestamps to integer seconds since the Unix epoch.
///
/// The remote side has second precision, so inputs with a sub-second part are
/// rejected instead of being truncated. Decoding always yields the canonical
/// UTC form (`2024-03-01T12:00:00Z`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimestampCodec;

impl FieldCodec for TimestampCodec {
    type Config = String;
    type Remote = i64;

    fn encode(&self, value: String) -> Result<i64, ConversionError> {
        let timestamp: Timestamp =
            value
                .parse()
                .map_err(|err: jiff::Error| ConversionError::BadTimestamp {
                    input: value.clone(),
                    reason: err.to_string(),
                })?;

        if timestamp.subsec_nanosecond() != 0 {
            return Err(ConversionError::BadTimestamp {
                input: value,
                reason: "sub-second precision is not supported".to_owned(),
            });
        }

        Ok(timestamp.as_second())
    }

    fn decode(&self, value: i64) -> Result<String, ConversionError> {
        Timestamp::from_second(value)
            .map(|timestamp| timestamp.to_string())
            .map_err(|err| ConversionError::BadTimestamp {
                input: value.to_string(),
                reason: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::value::TriState;

    #[rstest]
    #[case("1970-01-01T00:00:00Z", 0)]
    #[case("2024-03-01T12:00:00Z", 1_709_294_400)]
    #[case("1969-12-31T23:59:59Z", -1)]
    fn canonical_round_trip(#[case] input: &str, #[case] seconds: i64) {
        let encoded = TimestampCodec.encode(input.to_owned()).unwrap();
        assert_eq!(encoded, seconds);
        assert_eq!(TimestampCodec.decode(encoded).unwrap(), input);
    }

    #[test]
    fn offsets_are_normalized_to_utc() {
        let encoded = TimestampCodec
            .encode("2024-03-01T13:00:00+01:00".to_owned())
            .unwrap();
        assert_eq!(
            TimestampCodec.decode(encoded).unwrap(),
            "2024-03-01T12:00:00Z"
        );
    }

    #[rstest]
    #[case("tomorrow")]
    #[case("2024-13-01T00:00:00Z")]
    #[case("2024-03-01T12:00:00.5Z")]
    fn invalid_input(#[case] input: &str) {
        let err = TimestampCodec.encode(input.to_owned()).unwrap_err();
        assert!(
            matches!(&err, ConversionError::BadTimestamp { input: bad, .. } if bad == input),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn out_of_range_seconds() {
        assert!(matches!(
            TimestampCodec.decode(i64::MAX),
            Err(ConversionError::BadTimestamp { .. })
        ));
    }

    #[test]
    fn tri_state_handling() {
        assert_eq!(TimestampCodec.to_remote(TriState::Null), Ok(None));
        assert_eq!(TimestampCodec.from_remote(None), Ok(TriState::Null));
        assert_eq!(
            TimestampCodec.to_remote(TriState::Unknown),
            Err(ConversionError::UnknownNotWritable)
        );
    }
}
