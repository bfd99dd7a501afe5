//! JWT token generation and validation.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::time::{SystemTime, UNIX_EPOCH};

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived access token - stateless, no JTI
    Access,
    /// Long-lived refresh token - tracked in database with JTI
    Refresh,
}

/// JWT claims for access tokens.
///
/// Carries only the subject. Roles and the active flag are loaded from the
/// store on every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user UUID)
    pub sub: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub iat: u64,
    pub exp: u64,
}

/// JWT claims for refresh tokens (tracked with JTI).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// JWT ID (unique identifier for rotation and revocation)
    pub jti: String,
    /// Subject (user UUID)
    pub sub: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub iat: u64,
    pub exp: u64,
}

/// Default access token duration: 5 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 5 * 60;

/// Default refresh token duration: 2 weeks
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 14 * 24 * 60 * 60;

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: u64,
    refresh_ttl: u64,
}

/// Result of generating an access token.
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    pub token: String,
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Result of generating a refresh token (with JTI for tracking).
#[derive(Debug, Clone)]
pub struct RefreshTokenResult {
    pub token: String,
    pub jti: String,
    pub issued_at: u64,
    pub expires_at: u64,
    pub duration: u64,
}

/// Current Unix time in seconds.
pub fn now_secs() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret and default lifetimes.
    pub fn new(secret: &[u8]) -> Self {
        Self::with_ttls(
            secret,
            ACCESS_TOKEN_DURATION_SECS,
            REFRESH_TOKEN_DURATION_SECS,
        )
    }

    /// Create a JWT configuration with explicit token lifetimes (seconds).
    pub fn with_ttls(secret: &[u8], access_ttl: u64, refresh_ttl: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
        }
    }

    /// Generate an access token for a user.
    pub fn generate_access_token(&self, user_uuid: &str) -> Result<AccessTokenResult, JwtError> {
        let now = now_secs()?;
        let exp = now + self.access_ttl;

        let claims = AccessClaims {
            sub: user_uuid.to_string(),
            token_type: TokenType::Access,
            iat: now,
            exp,
        };

        Ok(AccessTokenResult {
            token: self.sign(&claims)?,
            expires_at: exp,
            duration: self.access_ttl,
        })
    }

    /// Generate a refresh token for a user. Each token gets a fresh JTI.
    pub fn generate_refresh_token(&self, user_uuid: &str) -> Result<RefreshTokenResult, JwtError> {
        let now = now_secs()?;
        let jti = uuid::Uuid::new_v4().to_string();
        let exp = now + self.refresh_ttl;

        let claims = RefreshClaims {
            jti: jti.clone(),
            sub: user_uuid.to_string(),
            token_type: TokenType::Refresh,
            iat: now,
            exp,
        };

        Ok(RefreshTokenResult {
            token: self.sign(&claims)?,
            jti,
            issued_at: now,
            expires_at: exp,
            duration: self.refresh_ttl,
        })
    }

    /// Validate and decode an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let claims: AccessClaims = self.verify(token)?;
        check_expiry(claims.exp)?;
        if claims.token_type != TokenType::Access {
            return Err(JwtError::WrongTokenType);
        }
        Ok(claims)
    }

    /// Validate and decode a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshClaims, JwtError> {
        let claims: RefreshClaims = self.verify(token)?;
        check_expiry(claims.exp)?;
        if claims.token_type != TokenType::Refresh {
            return Err(JwtError::WrongTokenType);
        }
        Ok(claims)
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, JwtError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(JwtError::Encoding)
    }

    fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        jsonwebtoken::decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Invalid(e),
            })
    }
}

/// A token is expired once the current time reaches `exp`.
fn check_expiry(exp: u64) -> Result<(), JwtError> {
    if now_secs()? >= exp {
        return Err(JwtError::Expired);
    }
    Ok(())
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Token is past its expiry
    Expired,
    /// Malformed token, bad signature or unexpected algorithm
    Invalid(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
    /// Wrong token type (e.g., using refresh token as access token)
    WrongTokenType,
}

impl JwtError {
    pub fn is_expired(&self) -> bool {
        matches!(self, JwtError::Expired)
    }
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Expired => write!(f, "Token expired"),
            JwtError::Invalid(e) => write!(f, "Invalid token: {}", e),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::WrongTokenType => write!(f, "Wrong token type"),
        }
    }
}

impl std::error::Error for JwtError {}
