//! Timestamp parsing shared by the tape readers.

use chrono::NaiveDateTime;

/// Format of every datetime field on the processed tapes.
pub(crate) const DTM_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Parse a tape timestamp, microsecond precision, seconds-only accepted.
pub(crate) fn parse_dtm(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value.trim(), DTM_FORMAT)
}

/// Serde adapter for mandatory tape timestamps.
pub(crate) mod serde_dtm {
    use super::{DTM_FORMAT, parse_dtm};
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(DTM_FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_dtm(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional tape timestamps; an empty field is `None`.
pub(crate) mod serde_dtm_opt {
    use super::{DTM_FORMAT, parse_dtm};
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(value) => serializer.collect_str(&value.format(DTM_FORMAT)),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        parse_dtm(&raw).map(Some).map_err(serde::de::Error::custom)
    }
}
