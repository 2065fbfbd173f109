//! Record identifier normalization
//!
//! Site-assigned identifiers look like `r123456`. Users often paste the bare
//! number, so a leading digit gets the prefix letter prepended. Anything else
//! that does not start with the prefix letter is rejected rather than guessed.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Prefix letter every record identifier starts with
pub const ID_PREFIX: char = 'r';

/// Errors produced when normalizing a raw identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("record identifier is empty")]
    Empty,

    #[error("malformed record identifier: {0:?}")]
    Malformed(String),
}

/// A validated, normalized record identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    /// Normalizes a raw identifier
    ///
    /// # Rules
    ///
    /// | Input | Result |
    /// |-------|--------|
    /// | `"123"` | `r123` |
    /// | `" r123 "` | `r123` |
    /// | `""` | `IdError::Empty` |
    /// | `"abc"`, `"r"`, `"r1/2"` | `IdError::Malformed` |
    ///
    /// # Example
    ///
    /// ```
    /// use thermomix_scraper::record::RecordId;
    ///
    /// assert_eq!(RecordId::parse("123").unwrap().as_str(), "r123");
    /// assert!(RecordId::parse("").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        let trimmed = raw.trim();
        let first = trimmed.chars().next().ok_or(IdError::Empty)?;

        let candidate = if first.is_ascii_digit() {
            format!("{}{}", ID_PREFIX, trimmed)
        } else {
            trimmed.to_string()
        };

        let rest = candidate
            .strip_prefix(ID_PREFIX)
            .ok_or_else(|| IdError::Malformed(trimmed.to_string()))?;

        if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(IdError::Malformed(trimmed.to_string()));
        }

        Ok(Self(candidate))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
