//! Provisioner identifiers and kind tags.

use derive_more::Display;
use uuid::Uuid;

/// Internal unique key of a provisioner declaration.
///
/// Equal to the user-supplied name when one is given, otherwise a random
/// UUID rendered as a string. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("{_0}")]
pub struct ProvisionerId(String);

impl ProvisionerId {
    /// Generate a fresh id using UUIDv4.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Use `name` as the id when it is present and non-empty, else generate one.
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some(name) if !name.is_empty() => Self(name.to_string()),
            _ => Self::generate(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ProvisionerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Type tag selecting which executor and config schema a declaration uses
/// (e.g. `shell`, `file`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("{_0}")]
pub struct ProvisionerKind(String);

impl ProvisionerKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProvisionerKind {
    fn from(kind: &str) -> Self {
        Self(kind.to_string())
    }
}

impl From<String> for ProvisionerKind {
    fn from(kind: String) -> Self {
        Self(kind)
    }
}

impl AsRef<str> for ProvisionerKind {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
