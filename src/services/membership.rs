//! Membership activation shared by the webhook and the client-driven
//! completion endpoints.
//!
//! Every path that can activate a membership funnels into
//! [`reconcile_upgrade`] or [`complete_new_membership`]. Both apply the grant
//! idempotently and then flip `processed` with a conditional update; only the
//! caller that wins that flip sends the confirmation email.

use std::collections::BTreeMap;

use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::user_repository::is_unique_violation;
use crate::models::membership::MembershipTier;
use crate::models::payment_record::{
    GatewayMetadata, NewPaymentRecord, PaymentRecord, PaymentStatus, PendingUserPayload,
};
use crate::models::user::{AccountOrigin, MembershipGrant, NewUser, User};
use crate::responses::JsonResponse;
use crate::services::smtp_mailer::MembershipConfirmation;
use crate::services::stripe::{
    CheckoutLineItem, CheckoutSessionState, CreateCheckoutSessionRequest, StripeServiceError,
};
use crate::state::AppState;
use crate::utils::password::{hash_password, MIN_PASSWORD_LENGTH};

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    StateConflict {
        code: &'static str,
        message: String,
        payment_status: Option<PaymentStatus>,
    },
    #[error("payment processor error: {0}")]
    Upstream(#[from] StripeServiceError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("password hashing failed: {0}")]
    PasswordHash(argon2::password_hash::Error),
}

impl MembershipError {
    fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        MembershipError::StateConflict {
            code,
            message: message.into(),
            payment_status: None,
        }
    }

    fn account_exists() -> Self {
        Self::conflict("account_exists", "An account already exists for this email")
    }
}

impl IntoResponse for MembershipError {
    fn into_response(self) -> Response {
        match self {
            MembershipError::Validation(msg) => JsonResponse::bad_request(&msg).into_response(),
            MembershipError::NotFound(msg) => JsonResponse::not_found(&msg).into_response(),
            MembershipError::StateConflict {
                code,
                message,
                payment_status,
            } => JsonResponse::state_conflict(
                &message,
                code,
                payment_status.as_ref().map(PaymentStatus::as_str),
            )
            .into_response(),
            MembershipError::Upstream(err) => {
                error!(%err, "payment processor call failed");
                JsonResponse::bad_gateway("Payment processor unavailable").into_response()
            }
            MembershipError::Database(err) => {
                error!(?err, "membership store failure");
                JsonResponse::server_error("Database error").into_response()
            }
            MembershipError::Token(err) => {
                error!(?err, "failed to issue auth token");
                JsonResponse::server_error("Failed to issue session").into_response()
            }
            MembershipError::PasswordHash(err) => {
                error!(%err, "password hashing failed");
                JsonResponse::server_error("Failed to secure password").into_response()
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupDetails {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub receive_updates: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub email: String,
    pub membership_tier: String,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default, rename = "isOAuthUser")]
    pub is_oauth_user: Option<bool>,
    #[serde(default)]
    pub signup_payload: Option<SignupDetails>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    pub payment_record_id: Uuid,
    pub checkout_url: Option<String>,
}

fn normalize_email(raw: &str) -> Result<String, MembershipError> {
    let email = raw.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
        .unwrap_or(false);
    if !valid {
        return Err(MembershipError::Validation("A valid email is required".into()));
    }
    Ok(email)
}

/// Tier validation runs before anything else so an unknown or unpaid tier
/// never reaches the processor.
pub fn checkout_tier(raw: &str) -> Result<MembershipTier, MembershipError> {
    let tier: MembershipTier = raw
        .parse()
        .map_err(|e: crate::models::membership::UnknownTier| {
            MembershipError::Validation(e.to_string())
        })?;
    if !tier.is_paid() {
        return Err(MembershipError::Validation(format!(
            "The {} tier does not require payment",
            tier.display_name()
        )));
    }
    Ok(tier)
}

async fn pending_payload(
    state: &AppState,
    req: &CheckoutRequest,
    email: &str,
) -> Result<PendingUserPayload, MembershipError> {
    let is_oauth = req.is_oauth_user.unwrap_or(false);
    if req.user_id.is_some() || is_oauth {
        let account_origin = if is_oauth {
            AccountOrigin::Oauth
        } else {
            AccountOrigin::Credentials
        };
        return Ok(PendingUserPayload::Upgrade {
            user_id: req.user_id,
            account_origin,
        });
    }

    // An existing account is upgraded even when signup details were sent.
    if let Some(user) = state.db.find_user_by_email(email).await? {
        return Ok(PendingUserPayload::Upgrade {
            user_id: Some(user.id),
            account_origin: user.account_origin,
        });
    }

    let Some(details) = &req.signup_payload else {
        return Err(MembershipError::Validation(
            "Signup details are required for a new membership".into(),
        ));
    };
    if details.first_name.trim().is_empty() || details.last_name.trim().is_empty() {
        return Err(MembershipError::Validation(
            "First and last name are required".into(),
        ));
    }
    Ok(PendingUserPayload::NewSignup {
        first_name: details.first_name.trim().to_string(),
        last_name: details.last_name.trim().to_string(),
        email: email.to_string(),
        receive_updates: details.receive_updates,
    })
}

/// Opens a processor checkout session and records it as `pending`.
/// No record is written when the processor call fails.
pub async fn create_checkout(
    state: &AppState,
    req: CheckoutRequest,
) -> Result<CheckoutResponse, MembershipError> {
    let tier = checkout_tier(&req.membership_tier)?;
    let email = normalize_email(&req.email)?;
    let payload = pending_payload(state, &req, &email).await?;

    let record_id = Uuid::new_v4();
    let amount = tier.price_minor_units();
    let currency = state.config.membership_currency.clone();

    let metadata: BTreeMap<String, String> = [
        ("payment_record_id".to_string(), record_id.to_string()),
        ("membership_tier".to_string(), tier.as_str().to_string()),
        ("kind".to_string(), payload.kind().as_str().to_string()),
    ]
    .into_iter()
    .collect();

    let session = state
        .stripe
        .create_checkout_session(CreateCheckoutSessionRequest {
            success_url: state.config.checkout_success_url(),
            cancel_url: state.config.checkout_cancel_url(),
            customer_email: email.clone(),
            line_item: CheckoutLineItem {
                name: format!("{} Membership", tier.display_name()),
                unit_amount: amount,
                currency: currency.clone(),
                quantity: 1,
            },
            client_reference_id: record_id.to_string(),
            metadata,
        })
        .await?;

    let now = OffsetDateTime::now_utc();
    let record = state
        .payments
        .insert(&NewPaymentRecord {
            id: record_id,
            external_session_id: session.id.clone(),
            customer_email: email,
            pending_user_payload: payload,
            membership_tier: tier,
            amount_minor_units: amount,
            currency,
            expires_at: now + Duration::hours(state.config.payment_record_ttl_hours),
        })
        .await?;

    info!(
        payment_record_id = %record.id,
        session_id = %record.external_session_id,
        tier = %tier,
        kind = record.kind().as_str(),
        "checkout session created"
    );

    Ok(CheckoutResponse {
        session_id: record.external_session_id,
        payment_record_id: record.id,
        checkout_url: session.url,
    })
}

/// Looks a record up by local id first, then by session id.
pub async fn resolve_record(
    state: &AppState,
    payment_record_id: Option<Uuid>,
    session_id: Option<&str>,
) -> Result<PaymentRecord, MembershipError> {
    let session_id = session_id.map(str::trim).filter(|s| !s.is_empty());
    let found = match (payment_record_id, session_id) {
        (Some(id), _) => state.payments.find_by_id(id).await?,
        (None, Some(session_id)) => state.payments.find_by_session_id(session_id).await?,
        (None, None) => {
            return Err(MembershipError::Validation(
                "paymentRecordId or sessionId is required".into(),
            ))
        }
    };
    found.ok_or_else(|| MembershipError::NotFound("Payment record not found".into()))
}

pub fn require_succeeded(record: &PaymentRecord) -> Result<(), MembershipError> {
    let status = record.effective_status(OffsetDateTime::now_utc());
    if status != PaymentStatus::Succeeded {
        return Err(MembershipError::StateConflict {
            code: "payment_not_succeeded",
            message: "Payment has not completed".into(),
            payment_status: Some(status),
        });
    }
    Ok(())
}

/// Moves a record to `succeeded`, or just merges metadata when it already is.
pub async fn promote_to_succeeded(
    state: &AppState,
    record: &PaymentRecord,
    metadata: &GatewayMetadata,
    payment_id: Option<&str>,
) -> Result<PaymentRecord, MembershipError> {
    let updated = if record.status == PaymentStatus::Succeeded {
        state
            .payments
            .update_gateway_metadata(record.id, metadata, payment_id)
            .await?
    } else {
        state
            .payments
            .transition_status(record.id, PaymentStatus::Succeeded, metadata, payment_id)
            .await?
    };

    match updated {
        Some(updated) => Ok(updated),
        // Lost a race with another writer; read back what they left.
        None => state
            .payments
            .find_by_id(record.id)
            .await?
            .ok_or_else(|| MembershipError::NotFound("Payment record not found".into())),
    }
}

/// Records a terminal non-success outcome. Returns `None` when the forward-only
/// rule refused the transition.
pub async fn record_unsuccessful(
    state: &AppState,
    record: &PaymentRecord,
    next: PaymentStatus,
    metadata: &GatewayMetadata,
) -> Result<Option<PaymentRecord>, MembershipError> {
    let updated = state
        .payments
        .transition_status(record.id, next, metadata, None)
        .await?;
    if updated.is_none() {
        info!(
            payment_record_id = %record.id,
            current = %record.status,
            requested = %next,
            "ignoring backwards payment transition"
        );
    }
    Ok(updated)
}

fn grant_for(record: &PaymentRecord) -> MembershipGrant {
    let gateway = &record.gateway_metadata.0;
    MembershipGrant {
        tier: record.membership_tier,
        paid_amount: record.amount_minor_units,
        payment_ref: record
            .external_payment_id
            .clone()
            .or_else(|| gateway.payment_intent.clone())
            .or_else(|| Some(record.external_session_id.clone())),
        external_customer_id: gateway.customer_id.clone(),
        granted_at: gateway.paid_at.unwrap_or_else(OffsetDateTime::now_utc),
    }
}

/// Finds the account an upgrade record belongs to, creating the local account
/// for an OAuth payer who has none yet. A signup payment whose email already
/// belongs to an account upgrades that account.
pub async fn resolve_upgrade_user(
    state: &AppState,
    record: &PaymentRecord,
) -> Result<User, MembershipError> {
    let (user_id, account_origin) = match record.payload() {
        PendingUserPayload::Upgrade {
            user_id,
            account_origin,
        } => (*user_id, Some(*account_origin)),
        PendingUserPayload::NewSignup { .. } => (None, None),
    };

    if let Some(id) = user_id {
        if let Some(user) = state.db.find_user_by_id(id).await? {
            return Ok(user);
        }
        warn!(user_id = %id, payment_record_id = %record.id, "upgrade user id not found, falling back to email");
    }

    if let Some(user) = state.db.find_user_by_email(&record.customer_email).await? {
        return Ok(user);
    }

    match account_origin {
        Some(AccountOrigin::Oauth) => {}
        Some(AccountOrigin::Credentials) => {
            return Err(MembershipError::NotFound("No account found for this payment".into()));
        }
        None => {
            return Err(MembershipError::conflict(
                "not_upgrade",
                "Payment is not a membership upgrade",
            ));
        }
    }

    match state
        .db
        .create_user(&NewUser::oauth_placeholder(&record.customer_email))
        .await
    {
        Ok(user) => {
            info!(user_id = %user.id, payment_record_id = %record.id, "created account for oauth payer");
            Ok(user)
        }
        Err(err) => {
            // A concurrent reconciliation may have created it first.
            if let Some(user) = state.db.find_user_by_email(&record.customer_email).await? {
                return Ok(user);
            }
            Err(err.into())
        }
    }
}

async fn activate(
    state: &AppState,
    record: &PaymentRecord,
    user: &User,
    first_name: &str,
) -> Result<User, MembershipError> {
    let grant = grant_for(record);
    let updated = state
        .db
        .apply_membership(user.id, &grant)
        .await?
        .ok_or_else(|| MembershipError::NotFound("Account disappeared during activation".into()))?;

    finish_activation(state, record, updated, first_name).await
}

/// Flips `processed`; the winner of that flip sends the confirmation.
async fn finish_activation(
    state: &AppState,
    record: &PaymentRecord,
    updated: User,
    first_name: &str,
) -> Result<User, MembershipError> {
    if state.payments.mark_processed(record.id).await? {
        info!(
            payment_record_id = %record.id,
            user_id = %updated.id,
            tier = %updated.membership,
            "membership activated"
        );
        let confirmation = MembershipConfirmation {
            to: updated.email.clone(),
            first_name: first_name.to_string(),
            tier: record.membership_tier,
            amount_minor_units: record.amount_minor_units,
            currency: record.currency.clone(),
        };
        if let Err(err) = state.mailer.send_membership_confirmation(&confirmation).await {
            warn!(%err, payment_record_id = %record.id, "failed to send membership confirmation");
        }
    }

    Ok(updated)
}

/// Applies a succeeded upgrade payment to its account. Safe to call from any
/// number of racing paths: the grant is idempotent and the email goes out once.
pub async fn reconcile_upgrade(
    state: &AppState,
    record: &PaymentRecord,
) -> Result<User, MembershipError> {
    require_succeeded(record)?;
    let user = resolve_upgrade_user(state, record).await?;
    let first_name = user.first_name.clone();
    activate(state, record, &user, &first_name).await
}

/// True when `existing` is the account this signup payment already produced,
/// either fully granted or left at the free tier by an interrupted write.
fn created_by_this_signup(
    existing: &User,
    record: &PaymentRecord,
    first_name: &str,
    last_name: &str,
) -> bool {
    if record.processed {
        return false;
    }
    match existing.membership_payment_ref.as_deref() {
        Some(payment_ref) => {
            existing.membership == record.membership_tier
                && grant_for(record).payment_ref.as_deref() == Some(payment_ref)
        }
        None => {
            existing.membership == MembershipTier::Free
                && existing.first_name == first_name
                && existing.last_name == last_name
        }
    }
}

/// Creates the account for a succeeded new-signup payment with the
/// membership already granted.
pub async fn complete_new_membership(
    state: &AppState,
    record: &PaymentRecord,
    password: Option<&str>,
) -> Result<User, MembershipError> {
    require_succeeded(record)?;
    let PendingUserPayload::NewSignup {
        first_name,
        last_name,
        receive_updates,
        ..
    } = record.payload()
    else {
        return Err(MembershipError::conflict(
            "not_new_signup",
            "Payment is not for a new membership",
        ));
    };

    if let Some(existing) = state.db.find_user_by_email(&record.customer_email).await? {
        if created_by_this_signup(&existing, record, first_name, last_name) {
            return activate(state, record, &existing, first_name).await;
        }
        return Err(MembershipError::account_exists());
    }

    let (password_hash, account_origin) = match password.filter(|p| !p.is_empty()) {
        Some(password) => {
            if password.chars().count() < MIN_PASSWORD_LENGTH {
                return Err(MembershipError::Validation(format!(
                    "Password must be at least {MIN_PASSWORD_LENGTH} characters"
                )));
            }
            let hash = hash_password(password).map_err(MembershipError::PasswordHash)?;
            (Some(hash), AccountOrigin::Credentials)
        }
        None => (None, AccountOrigin::Oauth),
    };
    let new_user = NewUser {
        email: record.customer_email.clone(),
        password_hash,
        account_origin,
        first_name: first_name.clone(),
        last_name: last_name.clone(),
        receive_updates: *receive_updates,
    };

    let user = match state.db.create_member(&new_user, &grant_for(record)).await {
        Ok(user) => user,
        Err(err) if is_unique_violation(&err) => return Err(MembershipError::account_exists()),
        Err(err) => return Err(err.into()),
    };
    info!(user_id = %user.id, payment_record_id = %record.id, "created member account");

    finish_activation(state, record, user, first_name).await
}

pub fn session_metadata(session: &CheckoutSessionState) -> GatewayMetadata {
    GatewayMetadata {
        customer_id: session.customer.clone(),
        payment_intent: session.payment_intent.clone(),
        payment_status: session.payment_status.clone(),
        paid_at: session.is_paid().then(OffsetDateTime::now_utc),
        ..Default::default()
    }
}

/// Asks the processor directly about a still-unsettled record and applies
/// what it reports, as the webhook would.
pub async fn verify_session(
    state: &AppState,
    record: PaymentRecord,
) -> Result<PaymentRecord, MembershipError> {
    if record.status == PaymentStatus::Succeeded {
        return Ok(record);
    }

    let session = state
        .stripe
        .retrieve_checkout_session(&record.external_session_id)
        .await?;
    let metadata = session_metadata(&session);

    if session.is_paid() {
        return promote_to_succeeded(state, &record, &metadata, session.payment_intent.as_deref())
            .await;
    }

    if session.status.as_deref() == Some("expired") {
        if let Some(updated) =
            record_unsuccessful(state, &record, PaymentStatus::Expired, &metadata).await?
        {
            return Ok(updated);
        }
    }

    Ok(record)
}
