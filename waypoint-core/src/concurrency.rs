//! Optimistic concurrency for appends.
//!
//! Every append states what it expects the target stream to look like through
//! an [`ExpectedVersion`]. Stores reject the append with a
//! [`ConcurrencyConflict`] when the expectation does not hold.

use std::fmt;

use thiserror::Error;

/// Expectation about the current version of a stream at append time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpectedVersion {
    /// No check: last writer wins.
    #[default]
    Any,
    /// The stream must not exist yet.
    NoStream,
    /// The stream's last position must equal this value.
    Exact(u64),
}

impl ExpectedVersion {
    /// Check the expectation against the stream's current version (`None` for
    /// a stream with no events).
    ///
    /// # Errors
    ///
    /// Returns a [`ConcurrencyConflict`] describing the mismatch.
    pub fn check(self, current: Option<u64>) -> Result<(), ConcurrencyConflict> {
        let holds = match self {
            Self::Any => true,
            Self::NoStream => current.is_none(),
            Self::Exact(expected) => current == Some(expected),
        };
        if holds {
            Ok(())
        } else {
            Err(ConcurrencyConflict {
                expected: self,
                actual: current,
            })
        }
    }
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any version"),
            Self::NoStream => f.write_str("no stream"),
            Self::Exact(version) => write!(f, "version {version}"),
        }
    }
}

/// Error indicating that the stream changed under an optimistic append.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", format_conflict(.expected, .actual.as_ref()))]
pub struct ConcurrencyConflict {
    /// What the writer expected.
    pub expected: ExpectedVersion,
    /// The stream's actual last position; `None` when the stream is empty.
    pub actual: Option<u64>,
}

fn format_conflict(expected: &ExpectedVersion, actual: Option<&u64>) -> String {
    match (expected, actual) {
        (ExpectedVersion::NoStream, Some(actual)) => format!(
            "concurrency conflict: expected new stream, found version {actual} (hint: another \
             writer created this stream; reload and retry)"
        ),
        (expected, Some(actual)) => format!(
            "concurrency conflict: expected {expected}, found version {actual} (hint: stream was \
             modified; reload and retry)"
        ),
        (expected, None) => {
            format!("concurrency conflict: expected {expected}, found no stream")
        }
    }
}
