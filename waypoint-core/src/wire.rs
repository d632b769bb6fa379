//! Wire encoding helpers for data leaving the engine.
//!
//! JSON consumers commonly decode numbers as IEEE-754 doubles, which cannot
//! represent every 64-bit integer. Positions are therefore rendered as decimal
//! strings. Decoding accepts either a decimal string or a JSON integer.
//!
//! Use with `#[serde(with = "waypoint_core::wire::decimal")]`, or
//! `wire::decimal_option` for `Option<u64>` fields.

use std::fmt;

use serde::{Deserializer, de};

struct DecimalVisitor;

impl de::Visitor<'_> for DecimalVisitor {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative 64-bit integer or its decimal string")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
        Ok(value)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
        u64::try_from(value).map_err(|_| E::invalid_value(de::Unexpected::Signed(value), &self))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
        parse_decimal(value).ok_or_else(|| E::invalid_value(de::Unexpected::Str(value), &self))
    }
}

/// Parse a canonical decimal string: ASCII digits only, no sign.
pub(crate) fn parse_decimal(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

pub mod decimal {
    use serde::{Deserializer, Serializer};

    /// Serialize a `u64` as a decimal string.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    /// Deserialize a `u64` from a decimal string or an integer.
    ///
    /// # Errors
    ///
    /// Fails on negative numbers, floats and non-decimal strings.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        super::deserialize_u64(deserializer)
    }
}

pub mod decimal_option {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize an `Option<u64>` as a decimal string or `null`.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.collect_str(value),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize an `Option<u64>` from `null`, a decimal string or an integer.
    ///
    /// # Errors
    ///
    /// Fails on negative numbers, floats and non-decimal strings.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u64>, D::Error> {
        #[derive(Deserialize)]
        struct Wrapper(#[serde(with = "super::decimal")] u64);

        Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(value)| value))
    }
}

fn deserialize_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    deserializer.deserialize_any(DecimalVisitor)
}
