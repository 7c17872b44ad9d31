//! JWT token generation and validation

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tandem_shared::{Identity, UserId};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// JWT claims structure for Tandem-issued tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Username at issue time
    pub username: String,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
    /// Token type (access or refresh)
    pub token_type: TokenType,
    /// JWT ID (jti)
    pub jti: String,
}

impl Claims {
    pub fn identity(&self) -> Identity {
        Identity::new(UserId(self.sub), self.username.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Access and refresh tokens issued together
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// JWT manager for token operations
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_hours: i64,
    refresh_token_expiry_days: i64,
}

impl JwtManager {
    /// Create a new JWT manager
    pub fn new(secret: &str, access_token_expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_expiry_hours,
            refresh_token_expiry_days: 30,
        }
    }

    fn generate(&self, identity: &Identity, token_type: TokenType) -> Result<String, JwtError> {
        let now = OffsetDateTime::now_utc();
        let exp = match token_type {
            TokenType::Access => now + Duration::hours(self.access_token_expiry_hours),
            TokenType::Refresh => now + Duration::days(self.refresh_token_expiry_days),
        };

        let claims = Claims {
            sub: identity.id.0,
            username: identity.username.clone(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            token_type,
            jti: Uuid::new_v4().to_string(),
        };

        // Explicit algorithm prevents algorithm confusion attacks
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))
    }

    /// Generate an access token
    pub fn generate_access_token(&self, identity: &Identity) -> Result<String, JwtError> {
        self.generate(identity, TokenType::Access)
    }

    /// Generate both access and refresh tokens
    pub fn generate_token_pair(&self, identity: &Identity) -> Result<TokenPair, JwtError> {
        Ok(TokenPair {
            access: self.generate(identity, TokenType::Access)?,
            refresh: self.generate(identity, TokenType::Refresh)?,
        })
    }

    /// Validate and decode a token
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 60; // 60 second clock skew tolerance

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::Invalid,
                _ => JwtError::Validation(e.to_string()),
            })
    }

    /// Validate an access token specifically
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, JwtError> {
        let claims = self.validate_token(token)?;
        if claims.token_type != TokenType::Access {
            return Err(JwtError::WrongTokenType);
        }
        Ok(claims)
    }

    /// Validate a refresh token specifically
    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims, JwtError> {
        let claims = self.validate_token(token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(JwtError::WrongTokenType);
        }
        Ok(claims)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Wrong token type")]
    WrongTokenType,
    #[error("Token encoding failed: {0}")]
    Encoding(String),
    #[error("Token validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity::new(UserId::new(), "alice")
    }

    #[test]
    fn test_token_generation_and_validation() {
        let jwt = JwtManager::new("test-secret-key-at-least-32-chars!", 24);
        let identity = alice();

        let pair = jwt
            .generate_token_pair(&identity)
            .expect("Failed to generate tokens");

        let access_claims = jwt
            .validate_access_token(&pair.access)
            .expect("Invalid access token");
        assert_eq!(access_claims.identity(), identity);
        assert_eq!(access_claims.token_type, TokenType::Access);

        let refresh_claims = jwt
            .validate_refresh_token(&pair.refresh)
            .expect("Invalid refresh token");
        assert_eq!(refresh_claims.sub, identity.id.0);
        assert_ne!(access_claims.jti, refresh_claims.jti);
    }

    #[test]
    fn test_wrong_token_type() {
        let jwt = JwtManager::new("test-secret-key-at-least-32-chars!", 24);
        let access_token = jwt
            .generate_access_token(&alice())
            .expect("Failed to generate token");

        let result = jwt.validate_refresh_token(&access_token);
        assert!(matches!(result, Err(JwtError::WrongTokenType)));
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        let issuer = JwtManager::new("issuer-secret-key-at-least-32-chars!", 24);
        let verifier = JwtManager::new("another-secret-key-at-least-32-chars", 24);
        let token = issuer.generate_access_token(&alice()).unwrap();

        assert!(matches!(
            verifier.validate_access_token(&token),
            Err(JwtError::Invalid)
        ));
        assert!(verifier.validate_access_token("garbage").is_err());
    }
}
