use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const ACCESS_TOKEN_TTL_SECONDS: i64 = 900;
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 30;
const DEFAULT_JWT_LEEWAY_SECONDS: u64 = 60;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid signing secret")]
    InvalidSecret,
    #[error("token expired")]
    TokenExpired,
    #[error(transparent)]
    Jwt(jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
}

/// `jti` keeps two refresh tokens minted within the same second distinct;
/// rotation detection compares whole token strings, so the claims must never
/// collide for separate issuances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    pub sub: Uuid,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
}

#[derive(Debug, Clone)]
pub struct AccessTokenDetails {
    pub account_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RefreshTokenDetails {
    pub account_id: Uuid,
    pub token_id: Uuid,
}

/// Access/refresh pair handed out on login and refresh. Only the refresh
/// token's current value is mirrored into storage; access tokens prove
/// themselves by signature alone.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_token_id: Uuid,
}

/// Signs and verifies both token kinds. The two kinds use distinct secrets
/// and distinct `aud` values, so neither can stand in for the other.
#[derive(Clone)]
pub struct JwtService {
    access_secret: Arc<SecretString>,
    refresh_secret: Arc<SecretString>,
    access_ttl: ChronoDuration,
    refresh_ttl: ChronoDuration,
}

impl JwtService {
    pub fn new(
        access_secret: SecretString,
        refresh_secret: SecretString,
        access_token_ttl_seconds: i64,
        refresh_token_ttl_days: i64,
    ) -> Self {
        Self {
            access_secret: Arc::new(access_secret),
            refresh_secret: Arc::new(refresh_secret),
            access_ttl: ChronoDuration::seconds(access_token_ttl_seconds),
            refresh_ttl: ChronoDuration::days(refresh_token_ttl_days),
        }
    }

    pub fn issue_pair(&self, account_id: Uuid) -> Result<TokenPair, JwtError> {
        let now = Utc::now();
        let refresh_token_id = Uuid::new_v4();

        let access_claims = AccessTokenClaims {
            sub: account_id,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            aud: "access".to_string(),
        };

        let refresh_claims = RefreshTokenClaims {
            sub: account_id,
            jti: refresh_token_id,
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
            aud: "refresh".to_string(),
        };

        let access_key = EncodingKey::from_base64_secret(self.access_secret.expose_secret())
            .map_err(|_| JwtError::InvalidSecret)?;
        let refresh_key = EncodingKey::from_base64_secret(self.refresh_secret.expose_secret())
            .map_err(|_| JwtError::InvalidSecret)?;

        let access_token = encode(&Header::new(Algorithm::HS256), &access_claims, &access_key)
            .map_err(JwtError::Jwt)?;
        let refresh_token = encode(&Header::new(Algorithm::HS256), &refresh_claims, &refresh_key)
            .map_err(JwtError::Jwt)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            refresh_token_id,
        })
    }

    pub fn decode_access_token(&self, token: &str) -> Result<AccessTokenDetails, JwtError> {
        self.decode_access_token_with_leeway(token, DEFAULT_JWT_LEEWAY_SECONDS)
    }

    pub fn decode_access_token_with_leeway(
        &self,
        token: &str,
        leeway_seconds: u64,
    ) -> Result<AccessTokenDetails, JwtError> {
        if token.trim().is_empty() {
            return Err(JwtError::InvalidToken);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.set_audience(&["access"]);
        validation.required_spec_claims =
            HashSet::from(["sub".to_string(), "exp".to_string(), "aud".to_string()]);
        validation.leeway = leeway_seconds;

        let decoding_key = DecodingKey::from_base64_secret(self.access_secret.expose_secret())
            .map_err(|_| JwtError::InvalidSecret)?;
        let data = decode::<AccessTokenClaims>(token, &decoding_key, &validation)
            .map_err(map_decode_error)?;
        let claims = data.claims;
        let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or(JwtError::InvalidToken)?;

        Ok(AccessTokenDetails {
            account_id: claims.sub,
            expires_at,
        })
    }

    pub fn decode_refresh_token(&self, token: &str) -> Result<RefreshTokenDetails, JwtError> {
        if token.trim().is_empty() {
            return Err(JwtError::InvalidToken);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.set_audience(&["refresh"]);
        validation.required_spec_claims = HashSet::from([
            "sub".to_string(),
            "exp".to_string(),
            "aud".to_string(),
            "jti".to_string(),
        ]);
        validation.leeway = DEFAULT_JWT_LEEWAY_SECONDS;

        let decoding_key = DecodingKey::from_base64_secret(self.refresh_secret.expose_secret())
            .map_err(|_| JwtError::InvalidSecret)?;
        let data = decode::<RefreshTokenClaims>(token, &decoding_key, &validation)
            .map_err(map_decode_error)?;
        let claims = data.claims;

        Ok(RefreshTokenDetails {
            account_id: claims.sub,
            token_id: claims.jti,
        })
    }
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> JwtError {
    match err.kind() {
        ErrorKind::ExpiredSignature => JwtError::TokenExpired,
        _ => JwtError::InvalidToken,
    }
}
