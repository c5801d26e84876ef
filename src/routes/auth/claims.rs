use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::models::membership::{MembershipStatus, MembershipTier};
use crate::models::user::User;

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    pub email: String,
    pub membership: MembershipTier,
    pub membership_status: MembershipStatus,
    pub exp: usize, // expiration (as UNIX timestamp)
    pub iss: String,
    pub aud: String,
}

impl Claims {
    /// Short-lived claims asserting the member's current tier.
    pub fn for_user(user: &User, ttl: Duration) -> Self {
        let exp = (OffsetDateTime::now_utc() + ttl).unix_timestamp().max(0) as usize;
        Claims {
            user_id: user.id.to_string(),
            email: user.email.clone(),
            membership: user.membership,
            membership_status: user.membership_status,
            exp,
            iss: String::new(),
            aud: String::new(),
        }
    }
}
