//! POSIX-style remote paths
//!
//! Paths are stored as an ordered list of non-empty segments. The canonical
//! string form is always `/` followed by the segments joined by `/`, so the
//! root directory renders as a single `/`.

use crate::error::{BridgeError, Result};
use std::fmt;

/// Path separator used by every backend
pub const SEPARATOR: char = '/';

/// Split a path into its non-empty segments.
///
/// Leading, trailing and doubled separators are ignored.
pub fn split_path(path: &str) -> Vec<String> {
    path.split(SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join segments into a canonical absolute path
pub fn join_path<S: AsRef<str>>(segments: &[S]) -> String {
    if segments.is_empty() {
        return SEPARATOR.to_string();
    }

    let mut path = String::new();
    for segment in segments {
        path.push(SEPARATOR);
        path.push_str(segment.as_ref());
    }
    path
}

/// Check that `name` can be used as a single path segment
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(BridgeError::InvalidPath("empty name".to_string()));
    }
    if name.contains(SEPARATOR) {
        return Err(BridgeError::InvalidPath(format!(
            "name '{}' must not contain '{}'",
            name, SEPARATOR
        )));
    }
    Ok(())
}

/// Normalized remote path
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemotePath {
    segments: Vec<String>,
}

impl RemotePath {
    /// The root path
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a path; the leading separator is optional
    pub fn parse(path: &str) -> Self {
        Self {
            segments: split_path(path),
        }
    }

    /// Build a path from already-split segments
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        for segment in &segments {
            validate_name(segment)?;
        }
        Ok(Self { segments })
    }

    /// Path segments, root is empty
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether this is the root path
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Last segment, or `/` for the root
    pub fn name(&self) -> &str {
        match self.segments.last() {
            Some(last) => last,
            None => "/",
        }
    }

    /// Append a single child segment
    pub fn join(&self, name: &str) -> Result<Self> {
        validate_name(name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self { segments })
    }

    /// Parent path, `None` for the root
    pub fn parent(&self) -> Option<Self> {
        let (_, parent) = self.segments.split_last()?;
        Some(Self {
            segments: parent.to_vec(),
        })
    }

    /// Whether `self` lies at or below `other`
    pub fn starts_with(&self, other: &RemotePath) -> bool {
        self.segments.starts_with(&other.segments)
    }

    /// Object-store key prefix: `a/b/` for `/a/b`, empty for the root
    pub fn key_prefix(&self) -> String {
        let mut prefix = String::new();
        for segment in &self.segments {
            prefix.push_str(segment);
            prefix.push(SEPARATOR);
        }
        prefix
    }

    /// Object-store key for the path itself: `a/b` for `/a/b`
    pub fn key(&self) -> String {
        self.segments.join(&SEPARATOR.to_string())
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_path(&self.segments))
    }
}

impl From<&str> for RemotePath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}
