use axum::{
    Extension, Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{Field, MultipartError},
    },
    http::StatusCode,
    routing::{get, post},
};
use tracing::{instrument, warn};

use super::error::{ErrorResponse, registration_error};
use crate::{
    AppState,
    auth::RequestContext,
    db::accounts::PublicAccount,
    media::MediaUpload,
    registration::NewRegistration,
};

pub fn public_router() -> Router<AppState> {
    Router::new().route(
        "/accounts/register",
        post(register).layer(DefaultBodyLimit::max(20 * 1024 * 1024)), // 20MB limit
    )
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route("/accounts/me", get(me))
}

/// POST /v1/accounts/register
///
/// Multipart form: `handle`, `email`, `display_name` and `password` text
/// fields, a required `avatar` file and an optional `cover` file.
#[instrument(name = "accounts.register", skip_all)]
pub async fn register(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<PublicAccount>), ErrorResponse> {
    let registration = read_registration(multipart).await?;
    let account = state
        .registration()
        .register(registration)
        .await
        .map_err(registration_error)?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// GET /v1/accounts/me
#[instrument(name = "accounts.me", skip(ctx), fields(account_id = %ctx.account.id))]
pub async fn me(Extension(ctx): Extension<RequestContext>) -> Json<PublicAccount> {
    Json(ctx.account)
}

async fn read_registration(mut multipart: Multipart) -> Result<NewRegistration, ErrorResponse> {
    let mut registration = NewRegistration::default();
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        match field.name() {
            Some("handle") => registration.handle = field.text().await.map_err(bad_multipart)?,
            Some("email") => registration.email = field.text().await.map_err(bad_multipart)?,
            Some("display_name") => {
                registration.display_name = field.text().await.map_err(bad_multipart)?;
            }
            Some("password") => {
                registration.password = field.text().await.map_err(bad_multipart)?;
            }
            Some("avatar") => registration.avatar = Some(read_upload(field).await?),
            Some("cover") => registration.cover = Some(read_upload(field).await?),
            _ => {}
        }
    }
    Ok(registration)
}

async fn read_upload(field: Field<'_>) -> Result<MediaUpload, ErrorResponse> {
    let filename = field
        .file_name()
        .map(|name| name.to_string())
        .unwrap_or_else(|| "upload.bin".to_string());
    let content_type = field
        .content_type()
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let bytes = field.bytes().await.map_err(bad_multipart)?;
    Ok(MediaUpload {
        bytes: bytes.to_vec(),
        filename,
        content_type,
    })
}

fn bad_multipart(source: MultipartError) -> ErrorResponse {
    warn!(?source, "malformed multipart registration request");
    ErrorResponse::new(StatusCode::BAD_REQUEST, "Malformed multipart request")
}
