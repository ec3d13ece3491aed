use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
    pub token_type: TokenType,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

pub fn create_access_token(user_id: Uuid, email: &str, config: &Config) -> AppResult<String> {
    create_token(user_id, email, TokenType::Access, config.jwt_access_ttl_secs, config)
}

pub fn create_refresh_token(user_id: Uuid, email: &str, config: &Config) -> AppResult<String> {
    create_token(user_id, email, TokenType::Refresh, config.jwt_refresh_ttl_secs, config)
}

fn create_token(
    user_id: Uuid,
    email: &str,
    token_type: TokenType,
    ttl_secs: i64,
    config: &Config,
) -> AppResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (now + Duration::seconds(ttl_secs)).timestamp(),
        iat: now.timestamp(),
        token_type,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create token: {}", e)))
}

pub fn create_token_pair(user_id: Uuid, email: &str, config: &Config) -> AppResult<TokenPair> {
    let access_token = create_access_token(user_id, email, config)?;
    let refresh_token = create_refresh_token(user_id, email, config)?;

    Ok(TokenPair {
        access_token,
        refresh_token,
        expires_in: config.jwt_access_ttl_secs,
    })
}

/// Compute SHA-256 hash of a raw token string, returned as lowercase hex.
/// Refresh tokens are stored hashed, never raw.
pub fn hash_token(raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn verify_token(token: &str, config: &Config) -> AppResult<TokenData<Claims>> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|_| AppError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            database_url: "postgres://localhost/test".into(),
            db_max_connections: 5,
            db_acquire_timeout_secs: 5,
            host: "127.0.0.1".into(),
            port: 0,
            frontend_url: "http://localhost:3000".into(),
            jwt_secret: "test-secret-do-not-use".into(),
            jwt_access_ttl_secs: 900,
            jwt_refresh_ttl_secs: 604800,
        }
    }

    #[test]
    fn test_access_token_round_trip() {
        let config = test_config();
        let user_id = Uuid::new_v4();

        let token = create_access_token(user_id, "a@example.com", &config).unwrap();
        let data = verify_token(&token, &config).unwrap();

        assert_eq!(data.claims.sub, user_id);
        assert_eq!(data.claims.email, "a@example.com");
        assert_eq!(data.claims.token_type, TokenType::Access);
    }

    #[test]
    fn test_token_pair_has_distinct_types() {
        let config = test_config();
        let pair = create_token_pair(Uuid::new_v4(), "a@example.com", &config).unwrap();

        let access = verify_token(&pair.access_token, &config).unwrap();
        let refresh = verify_token(&pair.refresh_token, &config).unwrap();

        assert_eq!(access.claims.token_type, TokenType::Access);
        assert_eq!(refresh.claims.token_type, TokenType::Refresh);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let config = test_config();
        let token = create_access_token(Uuid::new_v4(), "a@example.com", &config).unwrap();

        let mut other = test_config();
        other.jwt_secret = "different-secret".into();

        assert!(verify_token(&token, &other).is_err());
    }

    #[test]
    fn test_hash_token_deterministic() {
        let h1 = hash_token("some-refresh-token");
        let h2 = hash_token("some-refresh-token");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64); // SHA-256 hex = 64 chars
    }

    #[test]
    fn test_hash_token_different_inputs() {
        assert_ne!(hash_token("token-a"), hash_token("token-b"));
    }
}
