//! Sensor readings as published on the local broker
//!
//! Payload format is plain ASCII: `<sensor> <value>`, e.g. `lux 100`.
//! Only the first two space-separated fields are read; anything after the
//! value is ignored.

use std::fmt;
use thiserror::Error;

/// Why an inbound payload could not be turned into a [`Reading`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("payload is not valid text: {0}")]
    Decode(#[from] std::str::Utf8Error),
    #[error("payload has no value field: {0:?}")]
    MissingValue(String),
    #[error("value field is not an integer: {0:?}")]
    InvalidValue(String),
}

/// One parsed sensor reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub sensor: String,
    pub value: i64,
}

impl Reading {
    /// Parse raw payload bytes
    pub fn parse(payload: &[u8]) -> Result<Self, ParseError> {
        let text = std::str::from_utf8(payload)?;
        Self::parse_str(text)
    }

    /// Parse already-decoded payload text
    pub fn parse_str(text: &str) -> Result<Self, ParseError> {
        let mut fields = text.split(' ');
        // split always yields at least one item
        let sensor = fields.next().unwrap_or_default();
        let Some(raw_value) = fields.next() else {
            return Err(ParseError::MissingValue(text.to_string()));
        };

        // Tolerate a trailing newline from line-oriented publishers
        let value = raw_value
            .trim()
            .parse::<i64>()
            .map_err(|_| ParseError::InvalidValue(raw_value.to_string()))?;

        Ok(Self { sensor: sensor.to_string(), value })
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.sensor, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_reading() {
        let reading = Reading::parse(b"lux 100").unwrap();
        assert_eq!(reading.sensor, "lux");
        assert_eq!(reading.value, 100);
    }

    #[test]
    fn test_parse_negative_value() {
        let reading = Reading::parse(b"temp -12").unwrap();
        assert_eq!(reading.value, -12);
    }

    #[test]
    fn test_parse_trailing_newline() {
        let reading = Reading::parse(b"lux 42\n").unwrap();
        assert_eq!(reading.value, 42);
    }

    #[test]
    fn test_parse_ignores_extra_fields() {
        let reading = Reading::parse(b"lux 7 extra stuff").unwrap();
        assert_eq!(reading, Reading { sensor: "lux".to_string(), value: 7 });
    }

    #[test]
    fn test_parse_missing_separator() {
        let err = Reading::parse(b"lux100").unwrap_err();
        assert_eq!(err, ParseError::MissingValue("lux100".to_string()));
    }

    #[test]
    fn test_parse_empty_payload() {
        assert!(matches!(Reading::parse(b""), Err(ParseError::MissingValue(_))));
    }

    #[test]
    fn test_parse_non_integer_value() {
        let err = Reading::parse(b"lux abc").unwrap_err();
        assert_eq!(err, ParseError::InvalidValue("abc".to_string()));
    }

    #[test]
    fn test_parse_double_space_is_invalid() {
        // Split on a single space: the second field is empty
        assert!(matches!(Reading::parse(b"lux  100"), Err(ParseError::InvalidValue(_))));
    }

    #[test]
    fn test_parse_invalid_utf8() {
        let err = Reading::parse(&[0x6c, 0x75, 0x78, 0x20, 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, ParseError::Decode(_)));
    }

    #[test]
    fn test_parse_error_clones_with_cause() {
        let err = Reading::parse(&[0xff]).unwrap_err();
        let copy = err.clone();
        assert_eq!(copy, err);
        assert!(copy.to_string().starts_with("payload is not valid text"));
    }

    #[test]
    fn test_display_round_trip_text() {
        let reading = Reading { sensor: "lux".to_string(), value: 300 };
        assert_eq!(reading.to_string(), "lux 300");
    }
}
