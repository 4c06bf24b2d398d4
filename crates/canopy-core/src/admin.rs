//! Admin console users and roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AdminUserId;

/// Roles in ascending order of privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    /// Read-only access.
    Viewer,
    /// Can edit content and loyalty data.
    Editor,
    /// Can manage admin users.
    Admin,
    /// Full control; created on first login.
    Owner,
}

impl AdminRole {
    /// Whether this role grants at least `required`.
    #[must_use]
    pub fn satisfies(self, required: Self) -> bool {
        self >= required
    }

    /// Lowercase label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Editor => "editor",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }
}

/// Invitation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminStatus {
    /// Invited but never logged in.
    Invited,
    /// Has logged in at least once.
    Active,
}

/// A person with access to the admin console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    /// Identifier.
    pub id: AdminUserId,
    /// Login email, stored lowercase.
    pub email: String,
    /// Granted role.
    pub role: AdminRole,
    /// Invitation state.
    pub status: AdminStatus,
    /// Who sent the invitation; `None` for the bootstrap owner.
    pub invited_by: Option<AdminUserId>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
    /// Last successful login.
    pub last_login_at: Option<DateTime<Utc>>,
}

impl AdminUser {
    /// A pending invitation.
    #[must_use]
    pub fn invite(email: &str, role: AdminRole, invited_by: AdminUserId) -> Self {
        let now = Utc::now();
        Self {
            id: AdminUserId::generate(),
            email: normalize_email(email),
            role,
            status: AdminStatus::Invited,
            invited_by: Some(invited_by),
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    /// The first owner, created when an empty console is logged into.
    #[must_use]
    pub fn bootstrap_owner(email: &str) -> Self {
        let now = Utc::now();
        Self {
            id: AdminUserId::generate(),
            email: normalize_email(email),
            role: AdminRole::Owner,
            status: AdminStatus::Active,
            invited_by: None,
            created_at: now,
            updated_at: now,
            last_login_at: Some(now),
        }
    }

    /// Record a login, activating a pending invitation.
    pub fn record_login(&mut self) {
        let now = Utc::now();
        self.status = AdminStatus::Active;
        self.last_login_at = Some(now);
        self.updated_at = now;
    }
}

/// Trim and lowercase an email for storage and lookup.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
