//! JWT utilities for authentication
//!
//! Provides token encoding, decoding, and validation using the
//! `jsonwebtoken` crate, plus the JWT-backed identity provider consumed by
//! the gateway.

use async_trait::async_trait;
use beacon_core::{CollabResult, DomainError, Identity, IdentityProvider, Role, UserId};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Token type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Role granted to the subject
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Token type (access or refresh)
    pub token_type: TokenType,
}

impl Claims {
    /// Get the user ID
    ///
    /// # Errors
    /// Returns an error if the subject cannot be parsed as a user id
    pub fn user_id(&self) -> Result<UserId, AppError> {
        self.sub.parse::<UserId>().map_err(|_| AppError::InvalidToken)
    }

    /// Check if the token is expired
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    /// Check if this is an access token
    #[must_use]
    pub fn is_access_token(&self) -> bool {
        self.token_type == TokenType::Access
    }
}

/// JWT service for encoding and decoding tokens
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry: i64,
}

impl JwtService {
    /// Create a new JWT service with the given secret and expiry
    #[must_use]
    pub fn new(secret: &str, access_token_expiry: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_expiry,
        }
    }

    /// Issue an access token for a user
    ///
    /// # Errors
    /// Returns an error if token encoding fails
    pub fn issue_access_token(&self, user_id: UserId, role: Role) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.access_token_expiry)).timestamp(),
            token_type: TokenType::Access,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Failed to encode JWT")))
    }

    /// Decode and validate a JWT token
    ///
    /// # Errors
    /// Returns an error if the token is invalid or expired
    pub fn decode_token(&self, token: &str) -> Result<Claims, AppError> {
        let validation = Validation::default();

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::TokenExpired,
                _ => AppError::InvalidToken,
            }
        })?;

        Ok(token_data.claims)
    }

    /// Validate an access token and return the claims
    ///
    /// # Errors
    /// Returns an error if the token is invalid, expired, or not an access token
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, AppError> {
        let claims = self.decode_token(token)?;

        if !claims.is_access_token() {
            return Err(AppError::InvalidToken);
        }

        Ok(claims)
    }
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("access_token_expiry", &self.access_token_expiry)
            .finish_non_exhaustive()
    }
}

/// JWT-backed identity provider
///
/// The concrete [`IdentityProvider`] wired by the shipped binary: verifies
/// the bearer credential's signature and expiry and yields the subject and
/// role. Accepts tokens with or without the "Bearer " prefix.
#[derive(Debug, Clone)]
pub struct JwtIdentityProvider {
    jwt: JwtService,
}

impl JwtIdentityProvider {
    /// Create a provider backed by the given JWT service
    #[must_use]
    pub fn new(jwt: JwtService) -> Self {
        Self { jwt }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn resolve_identity(&self, credential: &str) -> CollabResult<Identity> {
        let token = credential.strip_prefix("Bearer ").unwrap_or(credential);

        if token.is_empty() {
            return Err(DomainError::InvalidCredential);
        }

        let claims = self
            .jwt
            .validate_access_token(token)
            .map_err(DomainError::from)?;

        let user_id = claims.user_id().map_err(DomainError::from)?;

        Ok(Identity {
            user_id,
            role: claims.role,
        })
    }
}
