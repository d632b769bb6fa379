//! Stream addressing.
//!
//! Streams are named `Category-Identifier`. The category is everything before
//! the *first* `-`; the identifier is everything after it and may itself
//! contain `-`.
//!
//! Category-wide reads accept a category expression: either an exact category
//! name (`Invitation`) or a wildcard prefix (`Invitation#*`) that matches every
//! category whose name starts with the prefix.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between the category and the identifier of a stream name.
pub const CATEGORY_SEPARATOR: char = '-';

/// The only legal wildcard marker in a category expression.
pub const WILDCARD: &str = "#*";

/// Errors raised while parsing stream names and category expressions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// The stream name has no category separator.
    #[error("malformed stream name `{0}`: expected `Category-Identifier`")]
    MalformedStreamName(String),
    /// A `*` appears that is not part of the `#*` wildcard.
    #[error("invalid wildcard in category expression `{0}`: only `#*` is allowed")]
    InvalidWildcard(String),
    /// The wildcard prefix itself contains a category separator.
    #[error("invalid prefix in category expression `{0}`: prefix must not contain `-`")]
    InvalidPrefix(String),
}

/// A category name: the partitioning namespace of a set of streams.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    /// Wrap a category name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Build the name of the stream `id` within this category.
    #[must_use]
    pub fn stream(&self, id: impl AsRef<str>) -> StreamName {
        StreamName(format!("{}{CATEGORY_SEPARATOR}{}", self.0, id.as_ref()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Category {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Category {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Category {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Category {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Extract the category of a stream name.
///
/// Splits at the first `-` only.
///
/// # Errors
///
/// Returns [`AddressError::MalformedStreamName`] if `stream` has no `-`.
pub fn category_from_stream(stream: &str) -> Result<Category, AddressError> {
    stream
        .split_once(CATEGORY_SEPARATOR)
        .map(|(category, _)| Category::new(category))
        .ok_or_else(|| AddressError::MalformedStreamName(stream.to_string()))
}

/// Compute the wildcard prefix of a category expression.
///
/// Returns `Ok(None)` when the expression contains no `*` (an exact category).
///
/// # Errors
///
/// Returns [`AddressError::InvalidWildcard`] if a `*` is not part of `#*`, and
/// [`AddressError::InvalidPrefix`] if the prefix contains a `-`.
pub fn prefix_from_category(expression: &str) -> Result<Option<String>, AddressError> {
    let Some(star) = expression.find('*') else {
        return Ok(None);
    };
    let Some(prefix) = expression.strip_suffix(WILDCARD) else {
        return Err(AddressError::InvalidWildcard(expression.to_string()));
    };
    // The wildcard must be the single trailing `#*`.
    if star != prefix.len() + 1 || prefix.contains('*') {
        return Err(AddressError::InvalidWildcard(expression.to_string()));
    }
    if prefix.contains(CATEGORY_SEPARATOR) {
        return Err(AddressError::InvalidPrefix(expression.to_string()));
    }
    Ok(Some(prefix.to_string()))
}

/// A fully-qualified stream name (`Category-Identifier`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreamName(String);

impl StreamName {
    /// Parse and validate a stream name.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::MalformedStreamName`] if `name` has no `-`.
    pub fn parse(name: impl Into<String>) -> Result<Self, AddressError> {
        let name = name.into();
        if name.contains(CATEGORY_SEPARATOR) {
            Ok(Self(name))
        } else {
            Err(AddressError::MalformedStreamName(name))
        }
    }

    #[must_use]
    pub fn category(&self) -> Category {
        let (category, _) = self.split();
        Category::new(category)
    }

    /// The identifier part (everything after the first `-`).
    #[must_use]
    pub fn id(&self) -> &str {
        self.split().1
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split(&self) -> (&str, &str) {
        // Validated on construction.
        self.0
            .split_once(CATEGORY_SEPARATOR)
            .unwrap_or((self.0.as_str(), ""))
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StreamName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for StreamName {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for StreamName {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<StreamName> for String {
    fn from(name: StreamName) -> Self {
        name.0
    }
}

/// A parsed category expression used to select streams for category reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CategoryFilter {
    /// Matches a single category exactly.
    Exact(Category),
    /// Matches every category whose name starts with the prefix.
    Prefix(String),
}

impl CategoryFilter {
    /// Parse a category expression.
    ///
    /// # Errors
    ///
    /// See [`prefix_from_category`].
    pub fn parse(expression: &str) -> Result<Self, AddressError> {
        Ok(match prefix_from_category(expression)? {
            Some(prefix) => Self::Prefix(prefix),
            None => Self::Exact(Category::new(expression)),
        })
    }

    #[must_use]
    pub fn matches(&self, category: &Category) -> bool {
        match self {
            Self::Exact(expected) => expected == category,
            Self::Prefix(prefix) => category.as_str().starts_with(prefix.as_str()),
        }
    }

    /// Whether the stream belongs to a matching category.
    #[must_use]
    pub fn matches_stream(&self, stream: &StreamName) -> bool {
        self.matches(&stream.category())
    }
}
