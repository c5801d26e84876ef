use core::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use super::membership::{MembershipStatus, MembershipTier};

#[derive(sqlx::Type, Debug, Deserialize, Serialize, PartialEq, Eq, Copy, Clone)]
#[sqlx(type_name = "account_origin", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountOrigin {
    Credentials,
    Oauth,
}

impl fmt::Display for AccountOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccountOrigin::Credentials => "credentials",
            AccountOrigin::Oauth => "oauth",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, FromRow, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// `None` for accounts that only ever signed in through an OAuth provider.
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub account_origin: AccountOrigin,
    pub first_name: String,
    pub last_name: String,
    pub membership: MembershipTier,
    pub membership_status: MembershipStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub membership_started_at: Option<OffsetDateTime>,
    pub membership_paid_amount: Option<i64>,
    pub membership_payment_ref: Option<String>,
    pub external_customer_id: Option<String>,
    pub receive_updates: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Projection returned to clients.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub account_origin: AccountOrigin,
    pub membership: MembershipTier,
    pub membership_status: MembershipStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub membership_started_at: Option<OffsetDateTime>,
    pub membership_paid_amount: Option<i64>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        PublicUser {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            account_origin: user.account_origin,
            membership: user.membership,
            membership_status: user.membership_status,
            membership_started_at: user.membership_started_at,
            membership_paid_amount: user.membership_paid_amount,
        }
    }
}

/// Fields needed to insert an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: Option<String>,
    pub account_origin: AccountOrigin,
    pub first_name: String,
    pub last_name: String,
    pub receive_updates: bool,
}

impl NewUser {
    /// Base record for an OAuth user who paid before a local account existed.
    pub fn oauth_placeholder(email: &str) -> Self {
        let local_part = email.split('@').next().unwrap_or_default();
        NewUser {
            email: email.to_string(),
            password_hash: None,
            account_origin: AccountOrigin::Oauth,
            first_name: local_part.to_string(),
            last_name: String::new(),
            receive_updates: false,
        }
    }
}

/// Membership benefits granted by a confirmed payment.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipGrant {
    pub tier: MembershipTier,
    pub paid_amount: i64,
    pub payment_ref: Option<String>,
    pub external_customer_id: Option<String>,
    pub granted_at: OffsetDateTime,
}
