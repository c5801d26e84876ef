use axum::{
    extract::{Query, State},
    http::header::SET_COOKIE,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::payment_record::PaymentRecordView;
use crate::models::user::PublicUser;
use crate::routes::auth::session::auth_cookie;
use crate::services::membership::{
    self, complete_new_membership, create_checkout, reconcile_upgrade, require_succeeded,
    resolve_record, resolve_upgrade_user, CheckoutRequest, MembershipError,
};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordLookup {
    #[serde(default)]
    pub payment_record_id: Option<Uuid>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteMembershipRequest {
    #[serde(default)]
    pub payment_record_id: Option<Uuid>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

// POST /api/payments/checkout
pub async fn checkout(
    State(app_state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Response, MembershipError> {
    let created = create_checkout(&app_state, payload).await?;
    Ok(Json(created).into_response())
}

// GET /api/payments/status
pub async fn status(
    State(app_state): State<AppState>,
    Query(lookup): Query<RecordLookup>,
) -> Result<Response, MembershipError> {
    let record = resolve_record(
        &app_state,
        lookup.payment_record_id,
        lookup.session_id.as_deref(),
    )
    .await?;
    let view = PaymentRecordView::from_record(&record, OffsetDateTime::now_utc());
    Ok(Json(view).into_response())
}

// POST /api/payments/verify-session
pub async fn verify_session(
    State(app_state): State<AppState>,
    Json(lookup): Json<RecordLookup>,
) -> Result<Response, MembershipError> {
    let record = resolve_record(
        &app_state,
        lookup.payment_record_id,
        lookup.session_id.as_deref(),
    )
    .await?;
    let record = membership::verify_session(&app_state, record).await?;
    let view = PaymentRecordView::from_record(&record, OffsetDateTime::now_utc());
    Ok(Json(view).into_response())
}

// POST /api/payments/complete-upgrade
pub async fn complete_upgrade(
    State(app_state): State<AppState>,
    Json(lookup): Json<RecordLookup>,
) -> Result<Response, MembershipError> {
    let record = resolve_record(
        &app_state,
        lookup.payment_record_id,
        lookup.session_id.as_deref(),
    )
    .await?;
    require_succeeded(&record)?;

    // Signup records are accepted here when their email already has an account.
    let user = if record.processed {
        resolve_upgrade_user(&app_state, &record).await?
    } else {
        reconcile_upgrade(&app_state, &record).await?
    };

    Ok(Json(json!({
        "success": true,
        "user": PublicUser::from(&user),
    }))
    .into_response())
}

// POST /api/payments/complete-membership
pub async fn complete_membership(
    State(app_state): State<AppState>,
    Json(payload): Json<CompleteMembershipRequest>,
) -> Result<Response, MembershipError> {
    let record = resolve_record(
        &app_state,
        payload.payment_record_id,
        payload.session_id.as_deref(),
    )
    .await?;
    let user = complete_new_membership(&app_state, &record, payload.password.as_deref()).await?;

    let token = app_state.tokens.issue(&user)?;
    let cookie = auth_cookie(
        token.clone(),
        app_state.tokens.ttl(),
        app_state.config.auth_cookie_secure,
    );

    Ok((
        [(SET_COOKIE, cookie.to_string())],
        Json(json!({
            "success": true,
            "user": PublicUser::from(&user),
            "token": token,
        })),
    )
        .into_response())
}
