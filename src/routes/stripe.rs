use axum::Json;
use axum::{extract::State, http::HeaderMap, response::IntoResponse};
use axum::{http::StatusCode, response::Response};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::payment_record::{GatewayMetadata, PaymentRecord, PaymentStatus};
use crate::responses::JsonResponse;
use crate::services::membership::{
    promote_to_succeeded, reconcile_upgrade, record_unsuccessful, MembershipError,
};
use crate::services::stripe::is_paid_status;
use crate::state::AppState;

// Small helper: nested json lookup
fn jget<'a>(val: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = val;
    for key in path {
        cur = cur.get(*key)?;
    }
    Some(cur)
}

fn extract_str<'a>(val: &'a Value, path: &[&str]) -> Option<&'a str> {
    jget(val, path)?.as_str()
}

/// Reads an id that may arrive either as a bare string or as an expanded object.
fn extract_id(val: &Value, key: &str) -> Option<String> {
    match val.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj.get("id").and_then(|v| v.as_str()).map(str::to_string),
        _ => None,
    }
}

fn extract_record_id(obj: &Value) -> Option<Uuid> {
    extract_str(obj, &["metadata", "payment_record_id"])
        .or_else(|| extract_str(obj, &["client_reference_id"]))
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

fn session_metadata(obj: &Value) -> GatewayMetadata {
    let payment_status = extract_str(obj, &["payment_status"]).map(str::to_string);
    let paid = is_paid_status(payment_status.as_deref());
    GatewayMetadata {
        customer_id: extract_id(obj, "customer"),
        payment_intent: extract_id(obj, "payment_intent"),
        payment_status,
        paid_at: paid.then(OffsetDateTime::now_utc),
        ..Default::default()
    }
}

fn intent_metadata(obj: &Value, payment_status: &str) -> GatewayMetadata {
    GatewayMetadata {
        customer_id: extract_id(obj, "customer"),
        payment_intent: extract_str(obj, &["id"]).map(str::to_string),
        payment_method: extract_id(obj, "payment_method"),
        payment_status: Some(payment_status.to_string()),
        paid_at: (payment_status == "succeeded").then(OffsetDateTime::now_utc),
        failure_message: extract_str(obj, &["last_payment_error", "message"]).map(str::to_string),
    }
}

async fn record_for_session(
    state: &AppState,
    obj: &Value,
) -> Result<Option<PaymentRecord>, MembershipError> {
    let Some(session_id) = extract_str(obj, &["id"]) else {
        warn!("checkout session event missing session id");
        return Ok(None);
    };
    let record = state.payments.find_by_session_id(session_id).await?;
    if record.is_none() {
        warn!(session_id, "no payment record for checkout session");
    }
    Ok(record)
}

async fn record_for_intent(
    state: &AppState,
    obj: &Value,
) -> Result<Option<PaymentRecord>, MembershipError> {
    let Some(intent_id) = extract_str(obj, &["id"]) else {
        warn!("payment intent event missing id");
        return Ok(None);
    };
    if let Some(record) = state.payments.find_by_payment_id(intent_id).await? {
        return Ok(Some(record));
    }
    if let Some(record_id) = extract_record_id(obj) {
        if let Some(record) = state.payments.find_by_id(record_id).await? {
            return Ok(Some(record));
        }
    }
    warn!(intent_id, "no payment record for payment intent");
    Ok(None)
}

async fn handle_session_settled(state: &AppState, obj: &Value) -> Result<(), MembershipError> {
    let Some(record) = record_for_session(state, obj).await? else {
        return Ok(());
    };
    let metadata = session_metadata(obj);
    let payment_id = metadata.payment_intent.clone();

    if metadata.paid_at.is_some() {
        let updated = promote_to_succeeded(state, &record, &metadata, payment_id.as_deref()).await?;
        info!(payment_record_id = %updated.id, status = %updated.status, "checkout session paid");
    } else {
        // Asynchronous payment methods complete the session before the money moves.
        state
            .payments
            .update_gateway_metadata(record.id, &metadata, payment_id.as_deref())
            .await?;
        info!(payment_record_id = %record.id, "checkout session completed, payment still outstanding");
    }
    Ok(())
}

async fn handle_session_closed(
    state: &AppState,
    obj: &Value,
    next: PaymentStatus,
) -> Result<(), MembershipError> {
    let Some(record) = record_for_session(state, obj).await? else {
        return Ok(());
    };
    let metadata = session_metadata(obj);
    if let Some(updated) = record_unsuccessful(state, &record, next, &metadata).await? {
        info!(payment_record_id = %updated.id, status = %updated.status, "checkout session closed");
    }
    Ok(())
}

async fn handle_intent_succeeded(state: &AppState, obj: &Value) -> Result<(), MembershipError> {
    let Some(record) = record_for_intent(state, obj).await? else {
        return Ok(());
    };
    if record.processed {
        info!(payment_record_id = %record.id, "payment already applied");
        return Ok(());
    }

    let metadata = intent_metadata(obj, "succeeded");
    let record =
        promote_to_succeeded(state, &record, &metadata, metadata.payment_intent.as_deref()).await?;

    if !record.payload().is_upgrade() {
        info!(payment_record_id = %record.id, "new signup paid, awaiting account completion");
        return Ok(());
    }

    match reconcile_upgrade(state, &record).await {
        Ok(user) => {
            info!(payment_record_id = %record.id, user_id = %user.id, "upgrade reconciled from webhook");
            Ok(())
        }
        // Retrying cannot fix these, so acknowledge the event.
        Err(err @ (MembershipError::NotFound(_) | MembershipError::StateConflict { .. })) => {
            warn!(%err, payment_record_id = %record.id, "upgrade could not be reconciled");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

async fn handle_intent_failed(state: &AppState, obj: &Value) -> Result<(), MembershipError> {
    let Some(record) = record_for_intent(state, obj).await? else {
        return Ok(());
    };
    let metadata = intent_metadata(obj, "failed");
    if let Some(updated) =
        record_unsuccessful(state, &record, PaymentStatus::Failed, &metadata).await?
    {
        warn!(
            payment_record_id = %updated.id,
            reason = metadata.failure_message.as_deref().unwrap_or("unknown"),
            "payment failed"
        );
    }
    Ok(())
}

// POST /api/stripe/webhook
pub async fn webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let sig = match headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
    {
        Some(s) => s,
        None => return JsonResponse::bad_request("Missing Stripe-Signature").into_response(),
    };

    let evt = match app_state.stripe.verify_webhook(&body, sig) {
        Ok(e) => e,
        Err(err) => {
            warn!(?err, "stripe webhook verification failed");
            return (StatusCode::BAD_REQUEST, "invalid webhook").into_response();
        }
    };

    let obj = evt.object();
    let result = match evt.r#type.as_str() {
        "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
            handle_session_settled(&app_state, obj).await
        }
        "checkout.session.expired" => {
            handle_session_closed(&app_state, obj, PaymentStatus::Expired).await
        }
        "checkout.session.async_payment_failed" => {
            handle_session_closed(&app_state, obj, PaymentStatus::Failed).await
        }
        "payment_intent.succeeded" => handle_intent_succeeded(&app_state, obj).await,
        "payment_intent.payment_failed" => handle_intent_failed(&app_state, obj).await,
        other => {
            info!(event_type = other, event_id = %evt.id, "ignoring stripe event");
            Ok(())
        }
    };

    match result {
        Ok(()) => Json(serde_json::json!({ "received": true })).into_response(),
        Err(err) => {
            error!(%err, event_id = %evt.id, event_type = %evt.r#type, "stripe webhook handling failed");
            JsonResponse::server_error("Webhook processing failed").into_response()
        }
    }
}
