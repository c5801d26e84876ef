use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::models::user::PublicUser;
use crate::responses::JsonResponse;
use crate::routes::auth::AuthSession;
use crate::state::AppState;

// GET /api/auth/me
pub async fn handle_me(
    State(app_state): State<AppState>,
    AuthSession(claims): AuthSession,
) -> Response {
    let user_id = match Uuid::parse_str(&claims.user_id) {
        Ok(id) => id,
        Err(_) => return JsonResponse::unauthorized("Invalid user ID").into_response(),
    };

    match app_state.db.find_user_by_id(user_id).await {
        Ok(Some(user)) => Json(json!({
            "success": true,
            "user": PublicUser::from(&user),
        }))
        .into_response(),
        Ok(None) => JsonResponse::unauthorized("User not found").into_response(),
        Err(err) => {
            error!(?err, %user_id, "failed to load current user");
            JsonResponse::server_error("Database error").into_response()
        }
    }
}
