//! Consistency tokens.
//!
//! A token tells a reader how far it must have caught up before answering:
//! read-your-writes across an HTTP boundary. Tokens travel in cookies and
//! query strings, so they only contain lowercase ASCII letters, digits and
//! `.`:
//!
//! - `g.<global position>` for a [`Checkpoint::Global`]
//! - `s.<position>.<hex of the stream name>` for a [`Checkpoint::Stream`]
//!
//! Positions are written in decimal, so every `u64` survives exactly. The
//! format is stable: changing it invalidates tokens already handed out.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::wire::parse_decimal;

const GLOBAL_TAG: &str = "g";
const STREAM_TAG: &str = "s";
const SEPARATOR: char = '.';

/// The position a reader must have reached.
///
/// The JSON form carries positions as decimal strings:
/// `{"global_position":"10"}` or `{"stream_name":"foo","position":"10"}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Checkpoint {
    /// A position within a single stream.
    Stream {
        stream_name: String,
        #[serde(with = "crate::wire::decimal")]
        position: u64,
    },
    /// A position within the whole log.
    Global {
        #[serde(with = "crate::wire::decimal")]
        global_position: u64,
    },
}

impl Checkpoint {
    #[must_use]
    pub const fn global(global_position: u64) -> Self {
        Self::Global { global_position }
    }

    #[must_use]
    pub fn stream(stream_name: impl Into<String>, position: u64) -> Self {
        Self::Stream {
            stream_name: stream_name.into(),
            position,
        }
    }

    /// The position, whichever shape this is.
    #[must_use]
    pub const fn position(&self) -> u64 {
        match self {
            Self::Stream { position, .. } => *position,
            Self::Global { global_position } => *global_position,
        }
    }
}

/// Error from [`deserialize_checkpoint`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("unrecognised checkpoint token `{0}`")]
    UnknownShape(String),
    #[error("invalid position `{0}` in checkpoint token")]
    InvalidPosition(String),
    #[error("invalid stream name `{0}` in checkpoint token")]
    InvalidStreamName(String),
}

/// Encode a checkpoint as an opaque, transport-safe token.
#[must_use]
pub fn serialize_checkpoint(checkpoint: &Checkpoint) -> String {
    match checkpoint {
        Checkpoint::Global { global_position } => format!("{GLOBAL_TAG}{SEPARATOR}{global_position}"),
        Checkpoint::Stream {
            stream_name,
            position,
        } => format!(
            "{STREAM_TAG}{SEPARATOR}{position}{SEPARATOR}{}",
            hex::encode(stream_name)
        ),
    }
}

/// Decode a token produced by [`serialize_checkpoint`].
///
/// Only the canonical encoding is accepted, so decoding is the exact inverse of
/// encoding.
///
/// # Errors
///
/// Returns a [`TokenError`] describing the first malformed part.
pub fn deserialize_checkpoint(token: &str) -> Result<Checkpoint, TokenError> {
    let unknown = || TokenError::UnknownShape(token.to_string());
    let (tag, rest) = token.split_once(SEPARATOR).ok_or_else(unknown)?;
    match tag {
        GLOBAL_TAG => Ok(Checkpoint::global(position(rest)?)),
        STREAM_TAG => {
            let (position_text, name) = rest.split_once(SEPARATOR).ok_or_else(unknown)?;
            Ok(Checkpoint::stream(stream_name(name)?, position(position_text)?))
        }
        _ => Err(unknown()),
    }
}

fn position(text: &str) -> Result<u64, TokenError> {
    // No leading zeros: "007" would not round-trip.
    let canonical = text == "0" || !text.starts_with('0');
    parse_decimal(text)
        .filter(|_| canonical)
        .ok_or_else(|| TokenError::InvalidPosition(text.to_string()))
}

fn stream_name(text: &str) -> Result<String, TokenError> {
    let invalid = || TokenError::InvalidStreamName(text.to_string());
    if text.bytes().any(|b| b.is_ascii_uppercase()) {
        return Err(invalid());
    }
    let bytes = hex::decode(text).map_err(|_| invalid())?;
    String::from_utf8(bytes).map_err(|_| invalid())
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&serialize_checkpoint(self))
    }
}

impl FromStr for Checkpoint {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        deserialize_checkpoint(s)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn any_checkpoint() -> impl Strategy<Value = Checkpoint> {
        prop_oneof![
            any::<u64>().prop_map(Checkpoint::global),
            (".*", any::<u64>()).prop_map(|(name, position)| Checkpoint::stream(name, position)),
        ]
    }

    proptest! {
        #[test]
        fn tokens_round_trip(checkpoint in any_checkpoint()) {
            let token = serialize_checkpoint(&checkpoint);
            prop_assert_eq!(deserialize_checkpoint(&token), Ok(checkpoint));
        }

        #[test]
        fn tokens_are_transport_safe(checkpoint in any_checkpoint()) {
            let token = serialize_checkpoint(&checkpoint);
            prop_assert!(token
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.'));
        }
    }

    #[test]
    fn shapes_are_not_conflated() {
        let global = Checkpoint::global(10);
        let stream = Checkpoint::stream("foo", 10);
        assert_eq!(serialize_checkpoint(&global), "g.10");
        assert_eq!(serialize_checkpoint(&stream), "s.10.666f6f");
        assert_eq!(deserialize_checkpoint("g.10"), Ok(global));
        assert_eq!(deserialize_checkpoint("s.10.666f6f"), Ok(stream));
    }

    #[test]
    fn extremes_survive() {
        for checkpoint in [
            Checkpoint::global(0),
            Checkpoint::global(u64::MAX),
            Checkpoint::stream("", u64::MAX),
            Checkpoint::stream("Order-ä.b", 9_007_199_254_740_993),
        ] {
            let token = checkpoint.to_string();
            assert_eq!(token.parse::<Checkpoint>(), Ok(checkpoint));
        }
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for (token, expected) in [
            ("", TokenError::UnknownShape(String::new())),
            ("x.1", TokenError::UnknownShape("x.1".into())),
            ("g", TokenError::UnknownShape("g".into())),
            ("s.1", TokenError::UnknownShape("s.1".into())),
            ("g.-1", TokenError::InvalidPosition("-1".into())),
            ("g.007", TokenError::InvalidPosition("007".into())),
            ("g.18446744073709551616", TokenError::InvalidPosition("18446744073709551616".into())),
            ("s.1.zz", TokenError::InvalidStreamName("zz".into())),
            ("s.1.666F6F", TokenError::InvalidStreamName("666F6F".into())),
            ("s.1.ff", TokenError::InvalidStreamName("ff".into())),
        ] {
            assert_eq!(deserialize_checkpoint(token), Err(expected), "{token}");
        }
    }

    #[test]
    fn json_shape_uses_decimal_strings() {
        let stream = serde_json::to_value(Checkpoint::stream("foo", 10)).unwrap();
        assert_eq!(
            stream,
            serde_json::json!({ "stream_name": "foo", "position": "10" })
        );
        let global = serde_json::to_value(Checkpoint::global(u64::MAX)).unwrap();
        assert_eq!(
            global,
            serde_json::json!({ "global_position": "18446744073709551615" })
        );

        let back: Checkpoint = serde_json::from_value(global).unwrap();
        assert_eq!(back, Checkpoint::global(u64::MAX));
        let back: Checkpoint =
            serde_json::from_str(r#"{"stream_name":"foo","position":10}"#).unwrap();
        assert_eq!(back, Checkpoint::stream("foo", 10));
    }
}
