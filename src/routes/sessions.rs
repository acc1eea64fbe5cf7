use axum::{Extension, Json, Router, extract::State, http::StatusCode, routing::post};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use super::error::{ErrorResponse, INVALID_REFRESH_TOKEN, login_error, refresh_error};
use crate::{
    AppState,
    auth::{ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE, RequestContext, TokenPair},
    db::accounts::PublicAccount,
};

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/sessions/login", post(login))
        .route("/sessions/refresh", post(refresh))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route("/sessions/logout", post(logout))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Handle or email address.
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub account: PublicAccount,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
}

/// POST /v1/sessions/login
#[instrument(name = "sessions.login", skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ErrorResponse> {
    let (account, tokens) = state
        .auth()
        .login(&payload.identifier, &payload.password)
        .await
        .map_err(login_error)?;

    let jar = add_session_cookies(jar, &tokens, state.secure_cookies());
    Ok((
        jar,
        Json(LoginResponse {
            account,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }),
    ))
}

/// POST /v1/sessions/refresh
///
/// Accepts the refresh token from the session cookie or, for clients that do
/// not hold cookies, from a JSON body. The body is read raw because it is
/// legitimately absent for cookie-holding callers.
#[instrument(name = "sessions.refresh", skip_all)]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: String,
) -> Result<(CookieJar, Json<TokenPairResponse>), ErrorResponse> {
    let presented = jar
        .get(REFRESH_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .or_else(|| {
            serde_json::from_str::<RefreshRequest>(&body)
                .ok()
                .and_then(|request| request.refresh_token)
        });
    let Some(presented) = presented else {
        return Err(ErrorResponse::new(
            StatusCode::UNAUTHORIZED,
            INVALID_REFRESH_TOKEN,
        ));
    };

    let tokens = state.auth().refresh(&presented).await.map_err(refresh_error)?;

    let jar = add_session_cookies(jar, &tokens, state.secure_cookies());
    Ok((
        jar,
        Json(TokenPairResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }),
    ))
}

/// POST /v1/sessions/logout
#[instrument(name = "sessions.logout", skip(state, jar, ctx), fields(account_id = %ctx.account.id))]
pub async fn logout(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), ErrorResponse> {
    state.auth().logout(ctx.account.id).await.map_err(|source| {
        error!(?source, "failed to clear session during logout");
        ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
    })?;

    let jar = jar
        .remove(named_cookie(ACCESS_TOKEN_COOKIE))
        .remove(named_cookie(REFRESH_TOKEN_COOKIE));
    Ok((jar, StatusCode::NO_CONTENT))
}

fn add_session_cookies(jar: CookieJar, tokens: &TokenPair, secure: bool) -> CookieJar {
    jar.add(session_cookie(
        ACCESS_TOKEN_COOKIE,
        tokens.access_token.clone(),
        secure,
    ))
    .add(session_cookie(
        REFRESH_TOKEN_COOKIE,
        tokens.refresh_token.clone(),
        secure,
    ))
}

/// Session cookies deliberately carry no max-age: the tokens themselves
/// expire, and a browser restart dropping them is acceptable.
fn session_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .secure(secure)
        .build()
}

/// Removal target for [`CookieJar::remove`]; the path must match the cookie
/// set at login for browsers to drop it.
fn named_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").build()
}
