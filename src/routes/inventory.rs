use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::models::inventory::{InventoryItem, InventorySearchQuery};
use crate::models::membership::{MembershipStatus, MembershipTier};
use crate::responses::JsonResponse;
use crate::routes::auth::AuthSession;
use crate::state::AppState;

pub const FREE_TIER_RESTRICTION: &str = "free-tier-restriction";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TierRestriction<'a> {
    error: &'a str,
    message: &'a str,
    upgrade_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResults {
    items: Vec<InventoryItem>,
    count: usize,
    tier: MembershipTier,
    featured: bool,
}

/// Tier the caller is entitled to right now. Tokens may be stale, so the
/// store has the final word; anonymous or unknown callers are free.
async fn caller_tier(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<MembershipTier, sqlx::Error> {
    let Some(AuthSession(claims)) = AuthSession::from_headers(headers, state) else {
        return Ok(MembershipTier::Free);
    };
    let Ok(user_id) = Uuid::parse_str(&claims.user_id) else {
        return Ok(MembershipTier::Free);
    };

    Ok(match state.db.find_user_by_id(user_id).await? {
        Some(user) if user.membership_status == MembershipStatus::Active => user.membership,
        _ => MembershipTier::Free,
    })
}

// GET /api/inventory/search
pub async fn search(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<InventorySearchQuery>,
) -> Response {
    let tier = match caller_tier(&app_state, &headers).await {
        Ok(tier) => tier,
        Err(err) => {
            error!(?err, "failed to resolve caller membership");
            return JsonResponse::server_error("Database error").into_response();
        }
    };

    let filtered = query.has_filters();
    if filtered && !tier.allows_filtered_search() {
        info!(%tier, "filtered search refused");
        return (
            StatusCode::FORBIDDEN,
            Json(TierRestriction {
                error: FREE_TIER_RESTRICTION,
                message: "Filtered search requires a paid membership",
                upgrade_url: app_state.config.upgrade_url(),
            }),
        )
            .into_response();
    }

    let featured = !filtered && !tier.allows_filtered_search();
    let result = if featured {
        app_state.inventory.list_featured(query.effective_limit()).await
    } else {
        app_state.inventory.search(&query).await
    };

    match result {
        Ok(items) => Json(SearchResults {
            count: items.len(),
            items,
            tier,
            featured,
        })
        .into_response(),
        Err(err) => {
            error!(?err, "inventory search failed");
            JsonResponse::server_error("Database error").into_response()
        }
    }
}
