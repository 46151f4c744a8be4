//! Principal identification
//!
//! Every piece of security state in this crate is keyed by an [`Identity`]:
//! the opaque identifier of the principal an operation concerns. In practice
//! this is an email address or a user id issued by the identity provider;
//! nothing in this crate inspects its contents.

use serde::{Deserialize, Serialize};

/// A unique, stable identifier for a principal.
///
/// This value should be treated as opaque. Equality and hashing are exact
/// string comparisons; no normalization is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: &str) -> Self {
        Identity(id.to_string())
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
