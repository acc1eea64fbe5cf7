//! Test doubles for the two external collaborators, so session-lifecycle and
//! registration behavior is exercised without Postgres or an object store.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use chrono::Utc;
use secrecy::SecretString;
use uuid::Uuid;

use crate::{
    auth::{ACCESS_TOKEN_TTL_SECONDS, JwtService, REFRESH_TOKEN_TTL_DAYS},
    db::accounts::{Account, AccountError, AccountStore, NewAccount, PublicAccount},
    media::{MediaError, MediaStore},
};

pub fn token_secret(byte: u8) -> SecretString {
    SecretString::new(BASE64_STANDARD.encode([byte; 32]).into())
}

pub fn test_jwt_service() -> JwtService {
    JwtService::new(
        token_secret(1),
        token_secret(2),
        ACCESS_TOKEN_TTL_SECONDS,
        REFRESH_TOKEN_TTL_DAYS,
    )
}

#[derive(Default)]
pub struct MemoryAccountStore {
    rows: Mutex<HashMap<Uuid, Account>>,
    fail_inserts: bool,
    vanish_public_reads: bool,
    blind_uniqueness_check: bool,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every insert fails as if the database dropped the connection.
    pub fn failing_inserts() -> Self {
        Self {
            fail_inserts: true,
            ..Self::default()
        }
    }

    /// Inserts succeed but the public read-back afterwards misses, simulating
    /// an inconsistent read-after-write.
    pub fn vanishing_public_reads() -> Self {
        Self {
            vanish_public_reads: true,
            ..Self::default()
        }
    }

    /// The uniqueness pre-check sees nothing, so a duplicate sails through to
    /// the insert and surfaces there, like a real insert race would.
    pub fn racing_duplicate_inserts() -> Self {
        Self {
            blind_uniqueness_check: true,
            ..Self::default()
        }
    }

    pub fn seed(&self, handle: &str, email: &str, password_hash: &str) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.rows.lock().unwrap().insert(
            id,
            Account {
                id,
                handle: handle.to_string(),
                email: email.to_string(),
                display_name: handle.to_string(),
                password_hash: password_hash.to_string(),
                avatar_url: format!("https://media.test/avatars/{id}.png"),
                avatar_key: format!("avatars/{id}.png"),
                cover_url: None,
                cover_key: None,
                refresh_token: None,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub fn stored_refresh_token(&self, id: Uuid) -> Option<String> {
        self.rows
            .lock()
            .unwrap()
            .get(&id)
            .and_then(|account| account.refresh_token.clone())
    }

    pub fn account_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn insert(&self, account: NewAccount<'_>) -> Result<Uuid, AccountError> {
        if self.fail_inserts {
            return Err(AccountError::Database(sqlx::Error::PoolClosed));
        }

        let mut rows = self.rows.lock().unwrap();
        let duplicate = rows
            .values()
            .any(|row| row.handle == account.handle || row.email == account.email);
        if duplicate {
            return Err(AccountError::DuplicateIdentity);
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        rows.insert(
            id,
            Account {
                id,
                handle: account.handle.to_string(),
                email: account.email.to_string(),
                display_name: account.display_name.to_string(),
                password_hash: account.password_hash.to_string(),
                avatar_url: account.avatar_url.to_string(),
                avatar_key: account.avatar_key.to_string(),
                cover_url: account.cover_url.map(str::to_string),
                cover_key: account.cover_key.map(str::to_string),
                refresh_token: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Account, AccountError> {
        let lowered = identifier.to_lowercase();
        self.rows
            .lock()
            .unwrap()
            .values()
            .find(|row| row.handle == lowered || row.email == identifier)
            .cloned()
            .ok_or(AccountError::NotFound)
    }

    async fn fetch_public(&self, id: Uuid) -> Result<PublicAccount, AccountError> {
        if self.vanish_public_reads {
            return Err(AccountError::NotFound);
        }
        self.rows
            .lock()
            .unwrap()
            .get(&id)
            .map(Account::public)
            .ok_or(AccountError::NotFound)
    }

    async fn identity_taken(&self, handle: &str, email: &str) -> Result<bool, AccountError> {
        if self.blind_uniqueness_check {
            return Ok(false);
        }
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .any(|row| row.handle == handle || row.email == email))
    }

    async fn current_refresh_token(&self, id: Uuid) -> Result<Option<String>, AccountError> {
        self.rows
            .lock()
            .unwrap()
            .get(&id)
            .map(|row| row.refresh_token.clone())
            .ok_or(AccountError::NotFound)
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), AccountError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&id).ok_or(AccountError::NotFound)?;
        row.refresh_token = token.map(str::to_string);
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        id: Uuid,
        current: &str,
        next: &str,
    ) -> Result<bool, AccountError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&id).ok_or(AccountError::NotFound)?;
        if row.refresh_token.as_deref() == Some(current) {
            row.refresh_token = Some(next.to_string());
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

pub struct MockMediaStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    put_count: AtomicUsize,
    fail_puts_from: Option<usize>,
    fail_deletes: bool,
    put_delay: Option<Duration>,
}

impl MockMediaStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            put_count: AtomicUsize::new(0),
            fail_puts_from: None,
            fail_deletes: false,
            put_delay: None,
        }
    }

    /// Uploads with zero-based index >= `n` fail; earlier ones succeed.
    pub fn fail_puts_from(mut self, n: usize) -> Self {
        self.fail_puts_from = Some(n);
        self
    }

    pub fn fail_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    pub fn delay_puts(mut self, delay: Duration) -> Self {
        self.put_delay = Some(delay);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaStore for MockMediaStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, MediaError> {
        if let Some(delay) = self.put_delay {
            tokio::time::sleep(delay).await;
        }

        let index = self.put_count.fetch_add(1, Ordering::SeqCst);
        if let Some(from) = self.fail_puts_from
            && index >= from
        {
            return Err(MediaError::Upload("scripted upload failure".to_string()));
        }

        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(format!("https://media.test/{key}"))
    }

    async fn delete_object(&self, key: &str) -> Result<(), MediaError> {
        if self.fail_deletes {
            return Err(MediaError::Delete("scripted delete failure".to_string()));
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}
