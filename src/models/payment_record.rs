use core::fmt;

use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{membership::MembershipTier, user::AccountOrigin};

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Expired => "expired",
        }
    }

    /// Status only moves forward. Nothing returns to `pending`, `succeeded` is
    /// terminal, and a processor confirmation may still promote a failed or
    /// expired record.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        match (self, next) {
            (Pending, Succeeded | Failed | Expired) => true,
            (Failed | Expired, Succeeded) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who the checkout was started for, fixed when the record is created.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingUserPayload {
    NewSignup {
        #[serde(rename = "firstName")]
        first_name: String,
        #[serde(rename = "lastName")]
        last_name: String,
        email: String,
        #[serde(rename = "receiveUpdates", default)]
        receive_updates: bool,
    },
    Upgrade {
        #[serde(rename = "userId", default)]
        user_id: Option<Uuid>,
        #[serde(rename = "accountOrigin")]
        account_origin: AccountOrigin,
    },
}

impl PendingUserPayload {
    pub fn kind(&self) -> PaymentKind {
        match self {
            PendingUserPayload::NewSignup { .. } => PaymentKind::NewSignup,
            PendingUserPayload::Upgrade { .. } => PaymentKind::Upgrade,
        }
    }

    pub fn is_upgrade(&self) -> bool {
        matches!(self, PendingUserPayload::Upgrade { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    NewSignup,
    Upgrade,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::NewSignup => "new_signup",
            PaymentKind::Upgrade => "upgrade",
        }
    }
}

/// Processor echo data kept alongside the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub paid_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

impl GatewayMetadata {
    /// Fields present in `other` replace ours; absent ones are kept.
    pub fn merge(&mut self, other: GatewayMetadata) {
        if other.customer_id.is_some() {
            self.customer_id = other.customer_id;
        }
        if other.payment_intent.is_some() {
            self.payment_intent = other.payment_intent;
        }
        if other.payment_method.is_some() {
            self.payment_method = other.payment_method;
        }
        if other.payment_status.is_some() {
            self.payment_status = other.payment_status;
        }
        if other.paid_at.is_some() {
            self.paid_at = other.paid_at;
        }
        if other.failure_message.is_some() {
            self.failure_message = other.failure_message;
        }
    }
}

#[derive(Debug, Clone, FromRow, PartialEq)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub external_session_id: String,
    pub external_payment_id: Option<String>,
    pub customer_email: String,
    pub pending_user_payload: Json<PendingUserPayload>,
    pub membership_tier: MembershipTier,
    pub amount_minor_units: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub processed: bool,
    pub gateway_metadata: Json<GatewayMetadata>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl PaymentRecord {
    pub fn payload(&self) -> &PendingUserPayload {
        &self.pending_user_payload.0
    }

    pub fn kind(&self) -> PaymentKind {
        self.payload().kind()
    }

    /// Status as clients should see it: a pending record past its TTL is
    /// reported as expired even before anything rewrites it.
    pub fn effective_status(&self, now: OffsetDateTime) -> PaymentStatus {
        if self.status == PaymentStatus::Pending && self.expires_at <= now {
            PaymentStatus::Expired
        } else {
            self.status
        }
    }
}

/// Fields needed to insert a record in `pending` state.
#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub id: Uuid,
    pub external_session_id: String,
    pub customer_email: String,
    pub pending_user_payload: PendingUserPayload,
    pub membership_tier: MembershipTier,
    pub amount_minor_units: i64,
    pub currency: String,
    pub expires_at: OffsetDateTime,
}

/// Client-facing projection of a record.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecordView {
    pub payment_record_id: Uuid,
    pub session_id: String,
    pub status: PaymentStatus,
    pub kind: PaymentKind,
    pub membership_tier: MembershipTier,
    pub amount: i64,
    pub currency: String,
    pub email: String,
    pub processed: bool,
    pub pending_user_payload: PendingUserPayload,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl PaymentRecordView {
    pub fn from_record(record: &PaymentRecord, now: OffsetDateTime) -> Self {
        PaymentRecordView {
            payment_record_id: record.id,
            session_id: record.external_session_id.clone(),
            status: record.effective_status(now),
            kind: record.kind(),
            membership_tier: record.membership_tier,
            amount: record.amount_minor_units,
            currency: record.currency.clone(),
            email: record.customer_email.clone(),
            processed: record.processed,
            pending_user_payload: record.payload().clone(),
            created_at: record.created_at,
            expires_at: record.expires_at,
        }
    }
}
