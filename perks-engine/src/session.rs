//! Session role resolution
//!
//! One canonical resolver from the auth user to an application role. Every
//! view that needs to know "who is this" asks the resolved [`Role`] instead
//! of re-deriving it from raw lookups.

use uuid::Uuid;

use crate::ledger::LedgerClient;
use crate::utils::{AppError, AppResult};

/// The authenticated user as reported by the auth provider
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
    /// Owner flag from the signup metadata
    pub is_store_owner: bool,
}

/// Resolved application role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Unauthenticated,
    StoreOwner {
        store_id: Uuid,
    },
    Customer {
        customer_id: Uuid,
        loyalty_card_id: Uuid,
    },
}

/// Resolve the role for `user` with a single lookup path.
///
/// Owners resolve through their store; everyone else must have a customer
/// profile with a loyalty card, created by signing up through a store's
/// QR code.
pub async fn resolve_role(
    user: Option<&AuthUser>,
    ledger: &dyn LedgerClient,
) -> AppResult<Role> {
    let Some(user) = user else {
        return Ok(Role::Unauthenticated);
    };

    if user.is_store_owner {
        let store = ledger
            .fetch_store_for_owner(user.id)
            .await?
            .ok_or_else(|| AppError::not_found("Store profile not found"))?;
        return Ok(Role::StoreOwner { store_id: store.id });
    }

    let card = ledger.fetch_card_for_user(user.id).await?.ok_or_else(|| {
        AppError::not_found("No loyalty card found. Please sign up via a store's QR code.")
    })?;
    Ok(Role::Customer {
        customer_id: card.customer_id,
        loyalty_card_id: card.id,
    })
}
