use std::env;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub listen_addr: String,
    pub auth: AuthConfig,
    pub media: MediaConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable `{0}` is not set")]
    MissingVar(&'static str),
    #[error("invalid value for environment variable `{0}`")]
    InvalidVar(&'static str),
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("SERVER_DATABASE_URL")
            .or_else(|_| env::var("DATABASE_URL"))
            .map_err(|_| ConfigError::MissingVar("SERVER_DATABASE_URL"))?;

        let listen_addr =
            env::var("SERVER_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let auth = AuthConfig::from_env()?;
        let media = MediaConfig::from_env()?;

        Ok(Self {
            database_url,
            listen_addr,
            auth,
            media,
        })
    }
}

/// Token-signing configuration. The two token kinds are signed with distinct
/// secrets so a leaked access-token secret cannot mint refresh tokens.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    access_token_secret: SecretString,
    refresh_token_secret: SecretString,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_days: i64,
}

impl AuthConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let access_token_secret = env::var("ACCESS_TOKEN_SECRET")
            .map_err(|_| ConfigError::MissingVar("ACCESS_TOKEN_SECRET"))?;
        validate_token_secret(&access_token_secret, "ACCESS_TOKEN_SECRET")?;

        let refresh_token_secret = env::var("REFRESH_TOKEN_SECRET")
            .map_err(|_| ConfigError::MissingVar("REFRESH_TOKEN_SECRET"))?;
        validate_token_secret(&refresh_token_secret, "REFRESH_TOKEN_SECRET")?;

        let access_token_ttl_seconds = env::var("ACCESS_TOKEN_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(crate::auth::ACCESS_TOKEN_TTL_SECONDS);

        let refresh_token_ttl_days = env::var("REFRESH_TOKEN_TTL_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(crate::auth::REFRESH_TOKEN_TTL_DAYS);

        Ok(Self {
            access_token_secret: SecretString::new(access_token_secret.into()),
            refresh_token_secret: SecretString::new(refresh_token_secret.into()),
            access_token_ttl_seconds,
            refresh_token_ttl_days,
        })
    }

    pub fn access_token_secret(&self) -> &SecretString {
        &self.access_token_secret
    }

    pub fn refresh_token_secret(&self) -> &SecretString {
        &self.refresh_token_secret
    }

    pub fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    pub fn refresh_token_ttl_days(&self) -> i64 {
        self.refresh_token_ttl_days
    }
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
    pub endpoint: String,
    pub bucket: String,
    pub public_base_url: String,
    pub op_timeout_secs: u64,
}

impl MediaConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let access_key_id = env::var("MEDIA_ACCESS_KEY_ID")
            .map_err(|_| ConfigError::MissingVar("MEDIA_ACCESS_KEY_ID"))?;

        let secret_access_key = env::var("MEDIA_SECRET_ACCESS_KEY")
            .map_err(|_| ConfigError::MissingVar("MEDIA_SECRET_ACCESS_KEY"))?;

        let endpoint =
            env::var("MEDIA_ENDPOINT").map_err(|_| ConfigError::MissingVar("MEDIA_ENDPOINT"))?;
        Url::parse(&endpoint).map_err(|_| ConfigError::InvalidVar("MEDIA_ENDPOINT"))?;

        let bucket =
            env::var("MEDIA_BUCKET").map_err(|_| ConfigError::MissingVar("MEDIA_BUCKET"))?;

        let public_base_url = env::var("MEDIA_PUBLIC_BASE_URL")
            .map_err(|_| ConfigError::MissingVar("MEDIA_PUBLIC_BASE_URL"))?;
        Url::parse(&public_base_url).map_err(|_| ConfigError::InvalidVar("MEDIA_PUBLIC_BASE_URL"))?;

        let op_timeout_secs = env::var("MEDIA_OP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        tracing::info!(endpoint = %endpoint, bucket = %bucket, "media store config loaded");

        Ok(Self {
            access_key_id,
            secret_access_key: SecretString::new(secret_access_key.into()),
            endpoint,
            bucket,
            public_base_url,
            op_timeout_secs,
        })
    }
}

fn validate_token_secret(secret: &str, var: &'static str) -> Result<(), ConfigError> {
    let decoded = BASE64_STANDARD
        .decode(secret.as_bytes())
        .map_err(|_| ConfigError::InvalidVar(var))?;

    if decoded.len() < 32 {
        return Err(ConfigError::InvalidVar(var));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_base64_secret_of_32_bytes() {
        let secret = BASE64_STANDARD.encode([7u8; 32]);
        assert!(validate_token_secret(&secret, "ACCESS_TOKEN_SECRET").is_ok());
    }

    #[test]
    fn rejects_short_secret() {
        let secret = BASE64_STANDARD.encode([7u8; 16]);
        let err = validate_token_secret(&secret, "ACCESS_TOKEN_SECRET").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar("ACCESS_TOKEN_SECRET")));
    }

    #[test]
    fn rejects_non_base64_secret() {
        let err = validate_token_secret("not base64!!", "REFRESH_TOKEN_SECRET").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar("REFRESH_TOKEN_SECRET")));
    }
}
