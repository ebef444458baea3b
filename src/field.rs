//! The atomic (tag, value) pair, with fallible typed views.

use crate::error::{FixError, Result};
use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};

/// The FIX "null" sentinel. A field carrying this exact text is normalized
/// to absent by every typed accessor, not just by equality comparisons.
const NULL_SENTINEL: &str = "-2147483648";

/// An atomic (tag, value) pair. The value is logically a byte string;
/// [`Field::as_str`] exposes it as text when valid UTF-8, and the other
/// accessors parse it into the FIX scalar types.
#[derive(Debug, Clone)]
pub struct Field {
    tag: u32,
    raw: Bytes,
}

impl Field {
    pub fn new(tag: u32, value: impl Into<Bytes>) -> Self {
        Self {
            tag,
            raw: value.into(),
        }
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn as_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.raw).map_err(|_| FixError::NotUtf8(self.tag))
    }

    fn is_null(&self) -> bool {
        self.raw.as_ref() == NULL_SENTINEL.as_bytes()
    }

    /// Parses the value as a signed integer. Returns `Ok(None)` if the
    /// value is the FIX null sentinel.
    pub fn as_int(&self) -> Result<Option<i64>> {
        if self.is_null() {
            return Ok(None);
        }
        let text = self.as_str()?;
        text.parse::<i64>()
            .map(Some)
            .map_err(|_| FixError::FieldFormat {
                tag: self.tag,
                expected: "integer",
                value: text.to_string(),
            })
    }

    /// Parses the value as a decimal. FIX decimals have no fixed precision
    /// contract here; `f64` is sufficient for a core engine that does not
    /// itself perform pricing arithmetic.
    pub fn as_decimal(&self) -> Result<Option<f64>> {
        if self.is_null() {
            return Ok(None);
        }
        let text = self.as_str()?;
        text.parse::<f64>()
            .map(Some)
            .map_err(|_| FixError::FieldFormat {
                tag: self.tag,
                expected: "decimal",
                value: text.to_string(),
            })
    }

    /// Parses a `"Y"`/`"N"` boolean field.
    pub fn as_bool(&self) -> Result<Option<bool>> {
        if self.is_null() {
            return Ok(None);
        }
        match self.as_str()? {
            "Y" => Ok(Some(true)),
            "N" => Ok(Some(false)),
            other => Err(FixError::FieldFormat {
                tag: self.tag,
                expected: "Y/N boolean",
                value: other.to_string(),
            }),
        }
    }

    /// Parses a FIX `UTCTimestamp` (`YYYYMMDD-HH:MM:SS[.sss]`).
    pub fn as_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        if self.is_null() {
            return Ok(None);
        }
        let text = self.as_str()?;
        let parsed = NaiveDateTime::parse_from_str(text, "%Y%m%d-%H:%M:%S%.f").map_err(|_| {
            FixError::FieldFormat {
                tag: self.tag,
                expected: "UTCTimestamp",
                value: text.to_string(),
            }
        })?;
        Ok(Some(DateTime::from_naive_utc_and_offset(parsed, Utc)))
    }
}

/// Equality is defined across representations: a field compares equal to
/// an integer, text, or byte slice whose canonical string form matches the
/// field's raw text.
impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag && self.raw == other.raw
    }
}
impl Eq for Field {}

impl PartialEq<i64> for Field {
    fn eq(&self, other: &i64) -> bool {
        self.as_str().map(|s| s == other.to_string()).unwrap_or(false)
    }
}

impl PartialEq<&str> for Field {
    fn eq(&self, other: &&str) -> bool {
        self.as_str().map(|s| s == *other).unwrap_or(false)
    }
}

impl PartialEq<[u8]> for Field {
    fn eq(&self, other: &[u8]) -> bool {
        self.raw.as_ref() == other
    }
}
