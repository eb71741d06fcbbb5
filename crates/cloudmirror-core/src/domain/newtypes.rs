//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for remote identifiers and
//! logical remote paths. Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// RemoteId
// ============================================================================

/// Opaque identifier of a node in the remote store
///
/// Drive ids are URL-safe strings such as `1AbC-d_Ef`. The engine never
/// interprets them; it only checks they are usable inside a query string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteId(String);

impl RemoteId {
    /// Create a new RemoteId
    ///
    /// # Errors
    /// Returns `DomainError::InvalidRemoteId` if the id is empty or contains
    /// characters outside `[A-Za-z0-9!._-]`
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidRemoteId(
                "Remote ID cannot be empty".to_string(),
            ));
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '!' | '-' | '_' | '.'))
        {
            return Err(DomainError::InvalidRemoteId(format!(
                "Remote ID contains invalid characters: {id}"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RemoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemoteId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RemoteId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemoteId> for String {
    fn from(id: RemoteId) -> Self {
        id.0
    }
}

// ============================================================================
// LogicalPath
// ============================================================================

/// A slash-separated location in the remote hierarchy
///
/// The remote store has no native path primitive, so a logical path is only
/// a list of names to be resolved one segment at a time. Empty segments are
/// dropped while parsing: `""`, `"/"` and `"a//b/"` parse to `[]`, `[]` and
/// `[a, b]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogicalPath {
    segments: Vec<String>,
}

impl LogicalPath {
    /// Parse a logical path
    ///
    /// # Errors
    /// Returns `DomainError::InvalidLogicalPath` for `.` or `..` segments
    pub fn parse(path: &str) -> Result<Self, DomainError> {
        let mut segments = Vec::new();
        for segment in path.split('/') {
            if segment.is_empty() {
                continue;
            }
            Self::check_segment(segment)
                .map_err(|_| DomainError::InvalidLogicalPath(path.to_string()))?;
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    /// The empty path, denoting the configured root node itself
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Append one segment
    ///
    /// # Errors
    /// Returns an error if the segment is empty, contains `/`, or is `.`/`..`
    pub fn join(&self, segment: &str) -> Result<Self, DomainError> {
        if segment.is_empty() || segment.contains('/') {
            return Err(DomainError::InvalidLogicalPath(format!(
                "Invalid path segment: {segment:?}"
            )));
        }
        Self::check_segment(segment)?;

        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    /// Segments from the root outwards
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether this is the root path
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    fn check_segment(segment: &str) -> Result<(), DomainError> {
        if segment == "." || segment == ".." {
            return Err(DomainError::InvalidLogicalPath(format!(
                "Relative segment not allowed: {segment}"
            )));
        }
        Ok(())
    }
}

impl Display for LogicalPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl FromStr for LogicalPath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LogicalPath {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<LogicalPath> for String {
    fn from(path: LogicalPath) -> Self {
        path.to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
