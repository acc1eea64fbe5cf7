use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    extract::cookie::CookieJar,
    headers::{Authorization, HeaderMapExt, authorization::Bearer},
};
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::{
    AppState,
    db::accounts::{AccountError, PublicAccount},
};

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// Authenticated identity for the current request. Inserted once by
/// [`require_session`] and read-only from there on.
#[derive(Clone)]
pub struct RequestContext {
    pub account: PublicAccount,
    #[allow(dead_code)]
    pub access_token_expires_at: DateTime<Utc>,
}

pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_access_token(&req) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let details = match state.jwt().decode_access_token(&token) {
        Ok(details) => details,
        Err(error) => {
            warn!(?error, "failed to decode access token");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    let account = match state.accounts().fetch_public(details.account_id).await {
        Ok(account) => account,
        Err(AccountError::NotFound) => {
            warn!("account `{}` missing", details.account_id);
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Err(error) => {
            warn!(?error, "failed to load account");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    req.extensions_mut().insert(RequestContext {
        account,
        access_token_expires_at: details.expires_at,
    });

    next.run(req).await
}

/// Cookie first, `Authorization: Bearer` second.
fn extract_access_token(req: &Request<Body>) -> Option<String> {
    let jar = CookieJar::from_headers(req.headers());
    if let Some(cookie) = jar.get(ACCESS_TOKEN_COOKIE) {
        return Some(cookie.value().to_owned());
    }

    req.headers()
        .typed_get::<Authorization<Bearer>>()
        .map(|Authorization(token)| token.token().to_owned())
}
