use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::{
    auth::password::{self, PasswordError},
    db::accounts::{AccountError, AccountStore, NewAccount, PublicAccount},
    media::{MediaError, MediaHandle, MediaService, MediaUpload},
};

const AVATAR_FOLDER: &str = "avatars";
const COVER_FOLDER: &str = "covers";

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("handle or email already registered")]
    Conflict,
    #[error(transparent)]
    Upload(#[from] MediaError),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Store(AccountError),
    #[error("account row unreadable after insert")]
    InconsistentRead,
}

/// Registration input as received from the transport layer, nothing
/// normalized yet.
#[derive(Debug, Default)]
pub struct NewRegistration {
    pub handle: String,
    pub email: String,
    pub display_name: String,
    pub password: String,
    pub avatar: Option<MediaUpload>,
    pub cover: Option<MediaUpload>,
}

struct ValidRegistration {
    handle: String,
    email: String,
    display_name: String,
    password: String,
    avatar: MediaUpload,
    cover: Option<MediaUpload>,
}

/// Create-account-with-media as ordered, individually reversible steps:
/// validate, check uniqueness, stage avatar, stage cover, persist, finalize.
/// Every staged object is pushed onto a compensation stack that is unwound in
/// reverse order the moment a later step fails.
#[derive(Clone)]
pub struct RegistrationService {
    accounts: Arc<dyn AccountStore>,
    media: MediaService,
}

impl RegistrationService {
    pub fn new(accounts: Arc<dyn AccountStore>, media: MediaService) -> Self {
        Self { accounts, media }
    }

    pub async fn register(
        &self,
        registration: NewRegistration,
    ) -> Result<PublicAccount, RegistrationError> {
        let valid = validate(registration)?;

        if self
            .accounts
            .identity_taken(&valid.handle, &valid.email)
            .await
            .map_err(RegistrationError::Store)?
        {
            return Err(RegistrationError::Conflict);
        }

        let password_hash = password::hash_password(&valid.password)?;

        let mut staged: Vec<(&'static str, MediaHandle)> = Vec::new();

        // First staged object; nothing to compensate if this one fails.
        let avatar = self.media.stage(AVATAR_FOLDER, valid.avatar).await?;
        staged.push(("avatar", avatar.clone()));

        let cover = match valid.cover {
            Some(upload) => match self.media.stage(COVER_FOLDER, upload).await {
                Ok(handle) => {
                    staged.push(("cover", handle.clone()));
                    Some(handle)
                }
                Err(err) => {
                    self.unwind(&mut staged).await;
                    return Err(err.into());
                }
            },
            None => None,
        };

        let insert = self
            .accounts
            .insert(NewAccount {
                handle: &valid.handle,
                email: &valid.email,
                display_name: &valid.display_name,
                password_hash: &password_hash,
                avatar_url: &avatar.url,
                avatar_key: &avatar.object_key,
                cover_url: cover.as_ref().map(|handle| handle.url.as_str()),
                cover_key: cover.as_ref().map(|handle| handle.object_key.as_str()),
            })
            .await;

        let account_id = match insert {
            Ok(id) => id,
            Err(AccountError::DuplicateIdentity) => {
                self.unwind(&mut staged).await;
                return Err(RegistrationError::Conflict);
            }
            Err(err) => {
                self.unwind(&mut staged).await;
                return Err(RegistrationError::Store(err));
            }
        };

        // Past this point the media belongs to the persisted account; a
        // failed read-back is reported, never rolled back.
        match self.accounts.fetch_public(account_id).await {
            Ok(public) => {
                tracing::info!(%account_id, handle = %valid.handle, "account registered");
                Ok(public)
            }
            Err(err) => {
                warn!(%account_id, error = ?err, "account row unreadable after insert");
                Err(RegistrationError::InconsistentRead)
            }
        }
    }

    async fn unwind(&self, staged: &mut Vec<(&'static str, MediaHandle)>) {
        while let Some((step, handle)) = staged.pop() {
            warn!(step, key = %handle.object_key, "rolling back staged media");
            self.media.unstage(&handle).await;
        }
    }
}

fn validate(registration: NewRegistration) -> Result<ValidRegistration, RegistrationError> {
    let handle = registration.handle.trim().to_lowercase();
    if handle.is_empty() {
        return Err(RegistrationError::Validation("handle is required"));
    }

    let email = registration.email.trim().to_string();
    if email.is_empty() {
        return Err(RegistrationError::Validation("email is required"));
    }

    let display_name = registration.display_name.trim().to_string();
    if display_name.is_empty() {
        return Err(RegistrationError::Validation("display name is required"));
    }

    if registration.password.trim().is_empty() {
        return Err(RegistrationError::Validation("password is required"));
    }

    let avatar = registration
        .avatar
        .ok_or(RegistrationError::Validation("avatar file is required"))?;

    Ok(ValidRegistration {
        handle,
        email,
        display_name,
        password: registration.password,
        avatar,
        cover: registration.cover,
    })
}
