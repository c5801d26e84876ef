use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

use crate::routes::auth::claims::Claims;
use crate::state::AppState;

pub const AUTH_COOKIE_NAME: &str = "auth_token";

#[derive(Debug, PartialEq)]
pub struct AuthSession(pub Claims);

impl AuthSession {
    /// Reads the token from the `auth_token` cookie, falling back to a bearer header.
    pub fn from_headers(headers: &HeaderMap, state: &AppState) -> Option<Self> {
        let jar = CookieJar::from_headers(headers);
        let token = match jar.get(AUTH_COOKIE_NAME) {
            Some(cookie) => cookie.value().to_string(),
            None => headers
                .get(AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(|t| t.trim().to_string())?,
        };

        state.tokens.verify(&token).ok().map(AuthSession)
    }
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        AuthSession::from_headers(&parts.headers, state).ok_or(StatusCode::UNAUTHORIZED)
    }
}

pub fn auth_cookie(token: String, ttl: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE_NAME, token))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(ttl)
        .build()
}

#[cfg(test)]
mod tests {
    use axum::{
        extract::FromRequestParts,
        http::{header, Method, Request, StatusCode},
    };
    use axum_extra::extract::cookie::Cookie;
    use time::Duration;

    use super::*;
    use crate::db::mock_db::sample_user;
    use crate::models::membership::MembershipTier;
    use crate::models::user::AccountOrigin;
    use crate::state::test_state;

    fn make_valid_jwt(state: &AppState) -> String {
        let user = sample_user("test@example.com", AccountOrigin::Credentials, MembershipTier::Gold);
        state
            .tokens
            .issue(&user)
            .expect("JWT should create successfully")
    }

    #[tokio::test]
    async fn test_valid_cookie_extracted() {
        let harness = test_state();
        let jwt = make_valid_jwt(&harness.state);
        let cookie = Cookie::new("auth_token", jwt);

        let request = Request::builder()
            .method(Method::GET)
            .uri("/")
            .header(header::COOKIE, cookie.to_string())
            .body(())
            .unwrap();

        let mut parts = request.into_parts().0;
        let session = AuthSession::from_request_parts(&mut parts, &harness.state)
            .await
            .expect("session should extract");

        assert_eq!(session.0.email, "test@example.com");
        assert_eq!(session.0.membership, MembershipTier::Gold);
    }

    #[tokio::test]
    async fn test_bearer_header_extracted() {
        let harness = test_state();
        let jwt = make_valid_jwt(&harness.state);

        let request = Request::builder()
            .uri("/")
            .header(header::AUTHORIZATION, format!("Bearer {jwt}"))
            .body(())
            .unwrap();

        let mut parts = request.into_parts().0;
        let result = AuthSession::from_request_parts(&mut parts, &harness.state).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_missing_token_returns_unauthorized() {
        let harness = test_state();
        let request = Request::builder().uri("/").body(()).unwrap();

        let mut parts = request.into_parts().0;
        let result = AuthSession::from_request_parts(&mut parts, &harness.state).await;

        assert_eq!(result, Err(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_invalid_token_returns_unauthorized() {
        let harness = test_state();
        let cookie = Cookie::new("auth_token", "invalid.token.here");

        let request = Request::builder()
            .uri("/")
            .header(header::COOKIE, cookie.to_string())
            .body(())
            .unwrap();

        let mut parts = request.into_parts().0;
        let result = AuthSession::from_request_parts(&mut parts, &harness.state).await;

        assert_eq!(result, Err(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn auth_cookie_is_http_only() {
        let cookie = auth_cookie("abc".into(), Duration::minutes(60), true);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.max_age(), Some(Duration::minutes(60)));
    }
}
