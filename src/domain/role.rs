use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of account roles.
///
/// Serialized and persisted by variant name (`"Alumni"`), which is also the
/// value carried in access-token claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Student,
    Teacher,
    Alumni,
    Company,
    Admin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Student,
        Role::Teacher,
        Role::Alumni,
        Role::Company,
        Role::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "Student",
            Role::Teacher => "Teacher",
            Role::Alumni => "Alumni",
            Role::Company => "Company",
            Role::Admin => "Admin",
        }
    }

    /// Table holding the role-specific profile row, created together with
    /// the user. Admins have no profile.
    pub fn profile_table(&self) -> Option<&'static str> {
        match self {
            Role::Student => Some("students"),
            Role::Teacher => Some("teachers"),
            Role::Alumni => Some("alumni"),
            Role::Company => Some("companies"),
            Role::Admin => None,
        }
    }

    /// Roles an administrator may provision directly.
    /// Alumni register themselves; admins are seeded out of band.
    pub fn is_admin_provisioned(&self) -> bool {
        matches!(self, Role::Student | Role::Teacher | Role::Company)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role: {}", self.0)
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .copied()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}
