//! Account roles.

use serde::{Deserialize, Serialize};

/// Error returned when a role string is not one of the known roles.
#[derive(thiserror::Error, Debug, Clone)]
#[error("unknown role: {0}")]
pub struct RoleError(pub String);

/// Account role with different permission levels.
///
/// The set is closed: a session either resolves to one of these variants or
/// session establishment fails. Nothing downstream branches on raw role
/// strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform operator: moderates shop registrations.
    Admin,
    /// Owns one or more shops and their product listings.
    Shopkeeper,
    /// Browses shops and places orders.
    Customer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Shopkeeper => write!(f, "shopkeeper"),
            Self::Customer => write!(f, "customer"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "shopkeeper" => Ok(Self::Shopkeeper),
            "customer" => Ok(Self::Customer),
            _ => Err(RoleError(s.to_owned())),
        }
    }
}
