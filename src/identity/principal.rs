use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account role. Serialized with the stored lowercase names; any other value
/// is rejected at deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Usuario,
    Moderador,
    Admin,
    Superuser,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Usuario, Role::Moderador, Role::Admin, Role::Superuser];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Usuario => "usuario",
            Role::Moderador => "moderador",
            Role::Admin => "admin",
            Role::Superuser => "superuser",
        }
    }

    /// Whether logins for this role maintain a consecutive-day streak.
    pub fn tracks_streak(&self) -> bool { matches!(self, Role::Superuser) }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL.into_iter().find(|r| r.as_str() == s).ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// Authenticated identity decoded from a bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub account_id: i32,
    pub role: Role,
}
