//! User domain models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account lifecycle state. Only `Active` users may authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Pending,
    Active,
    Suspended,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "inactive" => Ok(Self::Inactive),
            other => Err(format!("unknown user status '{other}'")),
        }
    }
}

/// User type within a tenant. Permissions are granted per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    SuperAdmin,
    Admin,
    Teacher,
    Staff,
    Parent,
    Student,
}

impl UserRole {
    /// Role assigned when nothing else is specified.
    pub const LOWEST: UserRole = UserRole::Student;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Staff => "staff",
            Self::Parent => "parent",
            Self::Student => "student",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_admin" => Ok(Self::SuperAdmin),
            "admin" => Ok(Self::Admin),
            "teacher" => Ok(Self::Teacher),
            "staff" => Ok(Self::Staff),
            "parent" => Ok(Self::Parent),
            "student" => Ok(Self::Student),
            other => Err(format!("unknown user role '{other}'")),
        }
    }
}

/// Persisted user row (internal; carries secrets).
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub tenant_id: String,
    pub school_id: Option<String>,
    pub email: String,
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub sso_provider: Option<String>,
    pub sso_id: Option<String>,
    /// SHA-256 digest of the outstanding reset token.
    pub reset_password_token: Option<String>,
    pub reset_password_expires: Option<DateTime<Utc>>,
    /// SHA-256 digest of the outstanding magic-link token.
    pub magic_link_token: Option<String>,
    pub magic_link_expires: Option<DateTime<Utc>>,
    pub email_verification_token: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Input for creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub tenant_id: String,
    pub school_id: Option<String>,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub email_verification_token: String,
}

/// Verified identity attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub tenant_id: String,
    pub school_id: Option<String>,
    /// Token subject; equals `id`.
    pub sub: String,
}

impl AuthenticatedUser {
    /// Build the principal for `user`, scoped to the given school.
    pub fn from_record(user: &UserRecord, school_id: Option<String>) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.display_name(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            tenant_id: user.tenant_id.clone(),
            school_id,
            sub: user.id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_and_status_parse_their_display_form() {
        for role in [
            UserRole::SuperAdmin,
            UserRole::Admin,
            UserRole::Teacher,
            UserRole::Staff,
            UserRole::Parent,
            UserRole::Student,
        ] {
            assert_eq!(role.to_string().parse::<UserRole>(), Ok(role));
        }
        assert_eq!("suspended".parse::<UserStatus>(), Ok(UserStatus::Suspended));
        assert!("root".parse::<UserRole>().is_err());
    }
}
