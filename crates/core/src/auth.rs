use serde::{Deserialize, Serialize};

/// Role granted to a caller by the upstream identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// Full administrative access, including resend and settings writes.
    Admin,
    /// Read-only access to delivery history and reputation checks.
    Viewer,
}

/// Caller information attached to admin-facing operations.
///
/// Authentication itself is delegated to a managed provider; services only
/// see the resolved subject and role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    subject: String,
    display_name: String,
    role: ActorRole,
}

impl Actor {
    /// Creates an actor from resolved identity data.
    #[must_use]
    pub fn new(subject: impl Into<String>, display_name: impl Into<String>, role: ActorRole) -> Self {
        Self {
            subject: subject.into(),
            display_name: display_name.into(),
            role,
        }
    }

    /// Returns the stable subject claim from the identity provider.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.subject.as_str()
    }

    /// Returns the display name for the caller.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_str()
    }

    /// Returns the caller role.
    #[must_use]
    pub fn role(&self) -> ActorRole {
        self.role
    }

    /// Returns whether the caller holds the administrative role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }
}
