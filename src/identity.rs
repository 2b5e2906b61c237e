// Per-process user identity used to correlate requests

use std::fmt;
use uuid::Uuid;

/// Opaque correlation key. Generated once at startup and passed by value;
/// not a credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserIdentity(String);

impl UserIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh `user_` prefixed identity with nine random characters.
    pub fn generate() -> Self {
        let random = Uuid::new_v4().simple().to_string();
        Self(format!("user_{}", &random[..9]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
