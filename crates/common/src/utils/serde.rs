//! Serialization utilities for common data types

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serde helpers storing a [`Duration`] as whole milliseconds (`u64`).
///
/// Every `*_ms` field in the configuration files goes through this module.
///
/// # Usage
/// ```rust
/// use std::time::Duration;
///
/// use rampart_common::duration_millis;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Example {
///     #[serde(with = "duration_millis")]
///     timeout: Duration,
/// }
/// ```
pub mod duration_millis {
    use super::{Deserialize, Deserializer, Duration, Serializer};

    type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

    /// Serialize a Duration as milliseconds, saturating at `u64::MAX`.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    /// Deserialize milliseconds into a Duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Convert a duration to fractional milliseconds, the unit request samples and
/// latency statistics are expressed in.
#[must_use]
pub fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    //! Unit tests for serialization utilities
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct TestStruct {
        #[serde(with = "duration_millis")]
        timeout_ms: Duration,
    }

    /// Validates that a duration field reads and writes plain milliseconds.
    ///
    /// Assertions:
    /// - Confirms JSON output is `{"timeout_ms":1500}`.
    /// - Confirms `{"timeout_ms":250}` parses to 250ms.
    #[test]
    fn test_duration_millis_wire_format() {
        let data = TestStruct { timeout_ms: Duration::from_millis(1500) };
        let json = serde_json::to_string(&data).expect("serialize");
        assert_eq!(json, r#"{"timeout_ms":1500}"#);

        let parsed: TestStruct = serde_json::from_str(r#"{"timeout_ms":250}"#).expect("parse");
        assert_eq!(parsed.timeout_ms, Duration::from_millis(250));
    }

    #[test]
    fn test_as_millis_f64_keeps_fraction() {
        assert!((as_millis_f64(Duration::from_micros(1500)) - 1.5).abs() < f64::EPSILON);
    }
}
