use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::{rngs::OsRng, RngCore};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{JwtConfig, MAX_ACCESS_TOKEN_EXPIRY_MINUTES, MAX_REFRESH_TOKEN_EXPIRY_DAYS};
use crate::models::Role;

const REFRESH_TOKEN_BYTES: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("signature invalid")]
    SignatureInvalid,

    #[error("token expired")]
    TokenExpired,

    #[error("malformed token")]
    MalformedToken,

    #[error("failed to encode token: {0}")]
    Encoding(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm | ErrorKind::InvalidIssuer => {
                TokenError::SignatureInvalid
            }
            ErrorKind::ExpiredSignature => TokenError::TokenExpired,
            _ => TokenError::MalformedToken,
        }
    }
}

/// Claims for access tokens (short-lived)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (account ID)
    pub sub: Uuid,
    pub role: Role,
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub jti: Uuid,
}

/// HS256 access-token codec.
///
/// Keys and TTLs are fixed at construction; verification accepts only HS256
/// tokens from the configured issuer.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        let secret = config.secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);

        tracing::info!(issuer = %config.issuer, "JWT service initialized with HS256");

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            issuer: config.issuer.clone(),
            // Bounded so TTL arithmetic cannot overflow; a validated config is unchanged.
            access_token_expiry_minutes: config
                .access_token_expiry_minutes
                .clamp(1, MAX_ACCESS_TOKEN_EXPIRY_MINUTES),
            refresh_token_expiry_days: config
                .refresh_token_expiry_days
                .clamp(1, MAX_REFRESH_TOKEN_EXPIRY_DAYS),
        }
    }

    /// Sign a token for `subject` valid for `ttl` from now.
    pub fn issue(&self, subject: Uuid, role: Role, ttl: Duration) -> Result<String, TokenError> {
        let now = Utc::now();

        let claims = AccessTokenClaims {
            sub: subject,
            role,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    pub fn issue_access_token(&self, subject: Uuid, role: Role) -> Result<String, TokenError> {
        self.issue(subject, role, Duration::minutes(self.access_token_expiry_minutes))
    }

    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, TokenError> {
        let token_data = decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)?;
        Ok(token_data.claims)
    }

    /// Verify the token carried in an `Authorization: Bearer <token>` value.
    pub fn authenticate_bearer(&self, header: &str) -> Result<AccessTokenClaims, TokenError> {
        let mut parts = header.trim().splitn(2, ' ');

        match (parts.next(), parts.next()) {
            (Some(scheme), Some(token))
                if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() =>
            {
                self.verify(token.trim())
            }
            _ => Err(TokenError::MalformedToken),
        }
    }

    /// New opaque refresh token: 32 random bytes, base64url without padding.
    pub fn generate_refresh_token(&self) -> String {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Get access token expiry in seconds (for client info)
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::days(self.refresh_token_expiry_days)
    }
}
