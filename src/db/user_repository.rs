use async_trait::async_trait;
use uuid::Uuid;

use crate::models::user::{MembershipGrant, NewUser, User};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error>;
    /// Fails with a unique violation when the email is already registered.
    async fn create_user(&self, user: &NewUser) -> Result<User, sqlx::Error>;
    /// Inserts the account with the membership already granted, so a paid
    /// signup never exists as a bare free account.
    async fn create_member(
        &self,
        user: &NewUser,
        grant: &MembershipGrant,
    ) -> Result<User, sqlx::Error>;
    /// Writes the membership fields. Re-applying the same grant leaves the
    /// row unchanged apart from `updated_at`; the start timestamp only moves
    /// when the payment reference or tier changes.
    async fn apply_membership(
        &self,
        user_id: Uuid,
        grant: &MembershipGrant,
    ) -> Result<Option<User>, sqlx::Error>;
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}
