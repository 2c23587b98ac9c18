//! Role and ownership checks.
//!
//! Every privileged operation on [`crate::AppState`] passes through
//! these guards before any backend call. They only decide whether the
//! caller may ask; the backend enforces its own row-level rules on top.

use shopconnect_core::{Role, ShopId};
use thiserror::Error;

use crate::types::{Identity, Shop};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("operation requires a signed-in account")]
    NotSignedIn,

    #[error("operation requires the {required} role, account is {actual}")]
    RoleRequired { required: Role, actual: Role },

    /// Shopkeepers only manage their own shops. Admins get no bypass
    /// here; moderation is a separate operation.
    #[error("account does not own shop {shop_id}")]
    NotShopOwner { shop_id: ShopId },
}

/// Require a signed-in account holding exactly `required`.
///
/// # Errors
///
/// [`AuthzError::NotSignedIn`] when nobody is signed in,
/// [`AuthzError::RoleRequired`] when the account holds another role.
pub fn require_role(identity: Option<&Identity>, required: Role) -> Result<&Identity, AuthzError> {
    let identity = identity.ok_or(AuthzError::NotSignedIn)?;
    if identity.role == required {
        Ok(identity)
    } else {
        Err(AuthzError::RoleRequired {
            required,
            actual: identity.role,
        })
    }
}

/// Require that `identity` is the shopkeeper who registered `shop`.
///
/// # Errors
///
/// [`AuthzError::NotShopOwner`] when the shop belongs to someone else.
pub fn require_shop_owner(identity: &Identity, shop: &Shop) -> Result<(), AuthzError> {
    if shop.shopkeeper_id == identity.user_id {
        Ok(())
    } else {
        Err(AuthzError::NotShopOwner { shop_id: shop.id })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shopconnect_core::{Email, ShopStatus, UserId};

    fn identity(role: Role) -> Identity {
        Identity {
            user_id: UserId::generate(),
            email: Email::parse("account@example.test").unwrap(),
            role,
        }
    }

    fn shop_of(owner: UserId) -> Shop {
        Shop {
            id: ShopId::generate(),
            name: "Corner Pottery".to_string(),
            description: "Hand thrown stoneware".to_string(),
            category: "crafts".to_string(),
            address: "1 Market Street".to_string(),
            phone: "555-0100".to_string(),
            email: "shop@example.test".to_string(),
            image_url: None,
            status: ShopStatus::Approved,
            shopkeeper_id: owner,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_require_role_accepts_matching_role() {
        let id = identity(Role::Admin);
        let checked = require_role(Some(&id), Role::Admin).unwrap();
        assert_eq!(checked.user_id, id.user_id);
    }

    #[test]
    fn test_require_role_rejects_signed_out() {
        let err = require_role(None, Role::Customer).unwrap_err();
        assert_eq!(err, AuthzError::NotSignedIn);
    }

    #[test]
    fn test_require_role_rejects_other_role() {
        let id = identity(Role::Customer);
        let err = require_role(Some(&id), Role::Shopkeeper).unwrap_err();
        assert_eq!(
            err,
            AuthzError::RoleRequired {
                required: Role::Shopkeeper,
                actual: Role::Customer,
            }
        );
    }

    #[test]
    fn test_owner_check_accepts_registering_shopkeeper() {
        let id = identity(Role::Shopkeeper);
        let shop = shop_of(id.user_id);
        require_shop_owner(&id, &shop).unwrap();
    }

    #[test]
    fn test_owner_check_rejects_other_shopkeeper() {
        let id = identity(Role::Shopkeeper);
        let shop = shop_of(UserId::generate());
        let err = require_shop_owner(&id, &shop).unwrap_err();
        assert_eq!(err, AuthzError::NotShopOwner { shop_id: shop.id });
    }

    #[test]
    fn test_admin_gets_no_ownership_bypass() {
        let id = identity(Role::Admin);
        let shop = shop_of(UserId::generate());
        assert!(require_shop_owner(&id, &shop).is_err());
    }
}
