//! The one place where role and subscription gating is decided. Handlers
//! describe what they need as a [`Requirement`] and call [`authorize`].

use guildhall_shared::{Role, SubscriptionStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// Signed-in caller, decoded from the session token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Authenticated,
    Admin,
    /// Holds a subscription record (active or past due)
    Subscriber,
    /// Owns the resource, or is an admin
    OwnerOrAdmin(Uuid),
}

/// Decide whether `principal` may proceed. `subscription` is only consulted
/// for [`Requirement::Subscriber`].
pub fn authorize<'a>(
    principal: Option<&'a Principal>,
    subscription: Option<SubscriptionStatus>,
    requirement: Requirement,
) -> CoreResult<&'a Principal> {
    let principal = principal.ok_or(CoreError::Unauthorized)?;

    match requirement {
        Requirement::Authenticated => Ok(principal),
        Requirement::Admin if principal.is_admin() => Ok(principal),
        Requirement::Admin => Err(CoreError::Forbidden("admin role required".to_string())),
        Requirement::Subscriber => match subscription {
            Some(status) if status.is_subscribed() => Ok(principal),
            _ => Err(CoreError::Forbidden("membership subscription required".to_string())),
        },
        Requirement::OwnerOrAdmin(owner) if owner == principal.user_id || principal.is_admin() => {
            Ok(principal)
        }
        Requirement::OwnerOrAdmin(_) => Err(CoreError::Forbidden("not the owner".to_string())),
    }
}
