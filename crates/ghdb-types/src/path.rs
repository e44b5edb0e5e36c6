//! Document path validation.
//!
//! Valid document paths:
//! - Must be non-empty and at most [`MAX_PATH_LEN`] bytes
//! - Must not contain `\`, control characters, or `//`
//! - Must not start or end with `/`
//! - Components between slashes must be non-empty, must not start with `.`
//!   and must not have leading or trailing whitespace

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Longest accepted path, in bytes.
pub const MAX_PATH_LEN: usize = 255;

/// Path of a document inside a versioned store, e.g. `users/users.json`.
///
/// A `DocPath` is always relative and normalized, so two equal paths always
/// name the same document and the path can be appended to a repository
/// contents URL or joined onto a directory root without escaping it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(String);

impl DocPath {
    /// Validate and wrap a path.
    ///
    /// # Examples
    ///
    /// ```
    /// use ghdb_types::DocPath;
    ///
    /// assert!(DocPath::new("users/users.json").is_ok());
    /// assert!(DocPath::new("").is_err());
    /// assert!(DocPath::new("../secrets.json").is_err());
    /// ```
    pub fn new(path: impl Into<String>) -> Result<Self, TypeError> {
        let path = path.into();
        validate(&path)?;
        Ok(Self(path))
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Components between slashes.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Final component (the file name).
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Everything before the final component, if any.
    pub fn parent(&self) -> Option<&str> {
        self.0.rsplit_once('/').map(|(parent, _)| parent)
    }

    /// Returns `true` if this path lies under `prefix`.
    ///
    /// An empty prefix matches every path. A prefix matches whole components
    /// only: `users` matches `users/a.json` but not `usersx/a.json`.
    pub fn starts_with(&self, prefix: &str) -> bool {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        self.0 == prefix
            || (self.0.starts_with(prefix) && self.0.as_bytes().get(prefix.len()) == Some(&b'/'))
    }
}

fn invalid(path: &str, reason: impl Into<String>) -> TypeError {
    TypeError::InvalidPath {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn validate(path: &str) -> Result<(), TypeError> {
    if path.is_empty() {
        return Err(invalid(path, "path must not be empty"));
    }
    if path.len() > MAX_PATH_LEN {
        return Err(invalid(
            path,
            format!("path is {} bytes, limit is {MAX_PATH_LEN}", path.len()),
        ));
    }
    if path.contains('\\') {
        return Err(invalid(path, "must not contain '\\'"));
    }
    if path.chars().any(char::is_control) {
        return Err(invalid(path, "must not contain control characters"));
    }
    if path.starts_with('/') || path.ends_with('/') {
        return Err(invalid(path, "must not start or end with '/'"));
    }
    if path.contains("//") {
        return Err(invalid(path, "must not contain consecutive slashes '//'"));
    }

    for component in path.split('/') {
        if component.is_empty() {
            return Err(invalid(path, "path components must not be empty"));
        }
        if component.starts_with('.') {
            return Err(invalid(
                path,
                format!("component must not start with '.': {component:?}"),
            ));
        }
        if component.trim() != component {
            return Err(invalid(
                path,
                format!("component has surrounding whitespace: {component:?}"),
            ));
        }
    }

    Ok(())
}

impl fmt::Debug for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocPath({})", self.0)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocPath {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for DocPath {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl AsRef<str> for DocPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for DocPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DocPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_known_document_paths() {
        for p in [
            "users/users.json",
            "sessions/login-history.json",
            "config/admin-config.json",
            "chat/messages.json",
            "README.md",
        ] {
            assert!(DocPath::new(p).is_ok(), "{p} should be valid");
        }
    }

    #[test]
    fn rejects_empty() {
        assert!(DocPath::new("").is_err());
    }

    #[test]
    fn rejects_traversal_and_hidden_components() {
        assert!(DocPath::new("../etc/passwd").is_err());
        assert!(DocPath::new("users/../config.json").is_err());
        assert!(DocPath::new("users/./a.json").is_err());
        assert!(DocPath::new(".git/config").is_err());
    }

    #[test]
    fn rejects_bad_slashes() {
        assert!(DocPath::new("/users.json").is_err());
        assert!(DocPath::new("users/").is_err());
        assert!(DocPath::new("users//a.json").is_err());
        assert!(DocPath::new("users\\a.json").is_err());
    }

    #[test]
    fn rejects_control_chars_and_padding() {
        assert!(DocPath::new("users/a\n.json").is_err());
        assert!(DocPath::new("users/ a.json").is_err());
    }

    #[test]
    fn rejects_overlong() {
        let long = "a".repeat(MAX_PATH_LEN + 1);
        let err = DocPath::new(long).unwrap_err();
        assert!(matches!(err, TypeError::InvalidPath { .. }));
    }

    #[test]
    fn file_name_and_parent() {
        let p = DocPath::new("sessions/login-history.json").unwrap();
        assert_eq!(p.file_name(), "login-history.json");
        assert_eq!(p.parent(), Some("sessions"));

        let root = DocPath::new("README.md").unwrap();
        assert_eq!(root.file_name(), "README.md");
        assert_eq!(root.parent(), None);
    }

    #[test]
    fn starts_with_matches_whole_components() {
        let p = DocPath::new("users/users.json").unwrap();
        assert!(p.starts_with(""));
        assert!(p.starts_with("users"));
        assert!(p.starts_with("users/"));
        assert!(!p.starts_with("use"));
        assert!(!p.starts_with("sessions"));
    }

    #[test]
    fn serde_roundtrip_and_validation() {
        let p = DocPath::new("chat/messages.json").unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"chat/messages.json\"");
        let back: DocPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);

        let bad: Result<DocPath, _> = serde_json::from_str("\"../x\"");
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn simple_component_paths_are_valid(parts in prop::collection::vec("[a-z0-9_-]{1,12}", 1..5)) {
            let joined = parts.join("/");
            let path = DocPath::new(joined.clone()).unwrap();
            prop_assert_eq!(path.as_str(), joined.as_str());
            prop_assert_eq!(path.components().count(), parts.len());
        }
    }
}
