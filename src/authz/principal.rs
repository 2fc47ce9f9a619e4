use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::adapters::RawMembership;

/// Coarse system-level role, independent of context roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemRole {
    Admin,
    #[default]
    User,
}

impl SystemRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemRole::Admin => "admin",
            SystemRole::User => "user",
        }
    }
}

impl fmt::Display for SystemRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(SystemRole::Admin),
            "user" => Ok(SystemRole::User),
            other => Err(format!("unknown system role `{other}`")),
        }
    }
}

/// The authenticated user behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub user_id: Uuid,
    pub role: SystemRole,
}

impl CurrentUser {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: SystemRole::User,
        }
    }

    pub fn with_role(mut self, role: SystemRole) -> Self {
        self.role = role;
        self
    }

    pub fn is_system_admin(&self) -> bool {
        self.role == SystemRole::Admin
    }
}

/// Everything the resolution flow needs from the request: the user and a
/// snapshot of all of their memberships.
#[derive(Debug, Clone)]
pub struct RequestScope {
    pub user: CurrentUser,
    pub memberships: Vec<RawMembership>,
}

impl RequestScope {
    pub fn new(user: CurrentUser, memberships: Vec<RawMembership>) -> Self {
        Self { user, memberships }
    }
}
