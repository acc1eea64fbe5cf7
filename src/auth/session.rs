use std::sync::Arc;

use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::{
    auth::{
        JwtError, JwtService, TokenPair,
        password::{self, PasswordError},
    },
    db::accounts::{AccountError, AccountStore, PublicAccount},
};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("account not found")]
    NotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("no active session matches the presented token")]
    Unauthorized,
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Store(AccountError),
}

/// One active refresh token per account, persisted in the account row. A
/// session exists exactly while the stored value matches the most recently
/// issued refresh token.
#[derive(Clone)]
pub struct SessionStore {
    accounts: Arc<dyn AccountStore>,
}

impl SessionStore {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }

    /// Unconditional overwrite; any prior session for the account dies here.
    pub async fn record(&self, account_id: Uuid, refresh_token: &str) -> Result<(), AccountError> {
        self.accounts
            .set_refresh_token(account_id, Some(refresh_token))
            .await
    }

    pub async fn validate(&self, account_id: Uuid, presented: &str) -> Result<bool, AccountError> {
        let stored = self.accounts.current_refresh_token(account_id).await?;
        Ok(match stored {
            Some(stored) => stored.as_bytes().ct_eq(presented.as_bytes()).into(),
            None => false,
        })
    }

    /// Atomic conditional rotation; false means another rotation already
    /// consumed `presented`.
    pub async fn rotate(
        &self,
        account_id: Uuid,
        presented: &str,
        next: &str,
    ) -> Result<bool, AccountError> {
        self.accounts
            .swap_refresh_token(account_id, presented, next)
            .await
    }

    /// Idempotent: clearing an account with no session is a success.
    pub async fn clear(&self, account_id: Uuid) -> Result<(), AccountError> {
        match self.accounts.set_refresh_token(account_id, None).await {
            Ok(()) | Err(AccountError::NotFound) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Login, refresh, and logout over the token issuer and session store. Holds
/// no request state of its own.
#[derive(Clone)]
pub struct AuthService {
    accounts: Arc<dyn AccountStore>,
    jwt: Arc<JwtService>,
    sessions: SessionStore,
}

impl AuthService {
    pub fn new(accounts: Arc<dyn AccountStore>, jwt: Arc<JwtService>) -> Self {
        let sessions = SessionStore::new(accounts.clone());
        Self {
            accounts,
            jwt,
            sessions,
        }
    }

    /// The only transition into an active session. `NotFound` and
    /// `InvalidCredentials` stay distinct here; the routes layer collapses
    /// both into one 401.
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<(PublicAccount, TokenPair), AuthError> {
        let account = match self.accounts.find_by_identifier(identifier.trim()).await {
            Ok(account) => account,
            Err(AccountError::NotFound) => return Err(AuthError::NotFound),
            Err(err) => return Err(AuthError::Store(err)),
        };

        if !password::verify_password(password, &account.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let pair = self.jwt.issue_pair(account.id)?;
        self.sessions
            .record(account.id, &pair.refresh_token)
            .await
            .map_err(AuthError::Store)?;

        tracing::debug!(account_id = %account.id, "session recorded");
        Ok((account.public(), pair))
    }

    /// Decode, validate against the stored token, then rotate. The rotation
    /// is the authoritative step: a concurrent refresh racing on the same
    /// stale token loses there and gets `Unauthorized`.
    pub async fn refresh(&self, presented: &str) -> Result<TokenPair, AuthError> {
        let details = self.jwt.decode_refresh_token(presented)?;

        let valid = match self.sessions.validate(details.account_id, presented).await {
            Ok(valid) => valid,
            Err(AccountError::NotFound) => return Err(AuthError::Unauthorized),
            Err(err) => return Err(AuthError::Store(err)),
        };
        if !valid {
            warn!(
                account_id = %details.account_id,
                token_id = %details.token_id,
                "refresh token does not match any active session"
            );
            return Err(AuthError::Unauthorized);
        }

        let pair = self.jwt.issue_pair(details.account_id)?;

        let rotated = match self
            .sessions
            .rotate(details.account_id, presented, &pair.refresh_token)
            .await
        {
            Ok(rotated) => rotated,
            Err(AccountError::NotFound) => return Err(AuthError::Unauthorized),
            Err(err) => return Err(AuthError::Store(err)),
        };
        if !rotated {
            warn!(account_id = %details.account_id, "concurrent refresh superseded this token");
            return Err(AuthError::Unauthorized);
        }

        Ok(pair)
    }

    pub async fn logout(&self, account_id: Uuid) -> Result<(), AuthError> {
        self.sessions
            .clear(account_id)
            .await
            .map_err(AuthError::Store)?;
        tracing::debug!(%account_id, "session cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{MemoryAccountStore, test_jwt_service, token_secret};

    use super::*;

    fn service_with_account(password: &str) -> (AuthService, Arc<MemoryAccountStore>, Uuid) {
        let store = Arc::new(MemoryAccountStore::new());
        let hash = password::hash_password(password).unwrap();
        let account_id = store.seed("alice", "alice@example.com", &hash);
        let service = AuthService::new(store.clone(), Arc::new(test_jwt_service()));
        (service, store, account_id)
    }

    #[tokio::test]
    async fn login_records_session_and_returns_sanitized_account() {
        let (service, store, account_id) = service_with_account("p1");

        let (public, pair) = service.login("alice", "p1").await.unwrap();

        assert_eq!(public.id, account_id);
        assert_eq!(public.handle, "alice");
        assert_eq!(
            store.stored_refresh_token(account_id).as_deref(),
            Some(pair.refresh_token.as_str())
        );
    }

    #[tokio::test]
    async fn login_by_email_works() {
        let (service, _store, account_id) = service_with_account("p1");

        let (public, _pair) = service.login("alice@example.com", "p1").await.unwrap();
        assert_eq!(public.id, account_id);
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_rejected() {
        let (service, store, account_id) = service_with_account("p1");

        let err = service.login("alice", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(store.stored_refresh_token(account_id).is_none());
    }

    #[tokio::test]
    async fn login_with_unknown_identifier_is_rejected() {
        let (service, _store, _account_id) = service_with_account("p1");

        let err = service.login("nobody", "p1").await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound));
    }

    #[tokio::test]
    async fn rotation_invalidates_the_predecessor() {
        let (service, _store, _account_id) = service_with_account("p1");
        let (_public, first) = service.login("alice", "p1").await.unwrap();

        let second = service.refresh(&first.refresh_token).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        let replay = service.refresh(&first.refresh_token).await.unwrap_err();
        assert!(matches!(replay, AuthError::Unauthorized));

        service.refresh(&second.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn second_login_supersedes_the_first_session() {
        let (service, _store, _account_id) = service_with_account("p1");

        let (_public, first) = service.login("alice", "p1").await.unwrap();
        let (_public, _second) = service.login("alice", "p1").await.unwrap();

        let err = service.refresh(&first.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
    }

    #[tokio::test]
    async fn logout_clears_the_session_and_is_idempotent() {
        let (service, store, account_id) = service_with_account("p1");
        let (_public, pair) = service.login("alice", "p1").await.unwrap();

        service.logout(account_id).await.unwrap();
        assert!(store.stored_refresh_token(account_id).is_none());

        service.logout(account_id).await.unwrap();

        let err = service.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
    }

    #[tokio::test]
    async fn refresh_with_garbage_token_is_rejected() {
        let (service, _store, _account_id) = service_with_account("p1");

        let err = service.refresh("not-a-token").await.unwrap_err();
        assert!(matches!(err, AuthError::Jwt(JwtError::InvalidToken)));
    }

    #[tokio::test]
    async fn expired_refresh_token_is_distinguishable_internally() {
        let store = Arc::new(MemoryAccountStore::new());
        let hash = password::hash_password("p1").unwrap();
        store.seed("alice", "alice@example.com", &hash);
        let jwt = Arc::new(JwtService::new(token_secret(1), token_secret(2), 900, -1));
        let service = AuthService::new(store, jwt);

        let (_public, pair) = service.login("alice", "p1").await.unwrap();
        let err = service.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::Jwt(JwtError::TokenExpired)));
    }

    #[tokio::test]
    async fn concurrent_rotations_have_exactly_one_winner() {
        let (service, _store, _account_id) = service_with_account("p1");
        let (_public, pair) = service.login("alice", "p1").await.unwrap();

        let racer = |svc: AuthService, token: String| {
            tokio::spawn(async move { svc.refresh(&token).await })
        };
        let first = racer(service.clone(), pair.refresh_token.clone());
        let second = racer(service.clone(), pair.refresh_token.clone());

        let outcomes = [first.await.unwrap(), second.await.unwrap()];
        let winners = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(
            outcomes
                .iter()
                .filter_map(|outcome| outcome.as_ref().err())
                .all(|err| matches!(err, AuthError::Unauthorized))
        );
    }
}
