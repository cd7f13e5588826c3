//! Domain primitives shared by the gate and the build launcher.

use std::fmt;

use crate::error::{HookError, Result};

/// Repository full name as sent by Bitbucket, e.g. `acme/widgets`.
///
/// Guaranteed non-empty, free of surrounding whitespace and free of control
/// characters, so it is safe to embed in a single output line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryName(String);

impl RepositoryName {
    /// Validates and wraps a repository full name.
    ///
    /// # Errors
    ///
    /// Returns `HookError::MalformedRequest` if the name is empty after
    /// trimming or contains control characters.
    pub fn new(name: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(HookError::malformed("repository.full_name is missing"));
        }
        if name.chars().any(char::is_control) {
            return Err(HookError::malformed("repository.full_name contains control characters"));
        }
        Ok(Self(name.to_string()))
    }

    /// The full name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RepositoryName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
