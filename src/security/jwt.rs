use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub issuer: String,
    pub access_token_expiry_minutes: i64,
    pub leeway_seconds: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            issuer: "crmserver".into(),
            access_token_expiry_minutes: 60,
            leeway_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|e| anyhow!("Invalid user ID in claims: {e}"))
    }
}

/// HS256 signer/verifier for the bearer tokens the CRM routes accept.
pub struct JwtManager {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(config: JwtConfig, secret: &str) -> Result<Self> {
        if secret.len() < 32 {
            return Err(anyhow!("JWT secret must be at least 32 characters"));
        }
        Ok(Self {
            config,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        })
    }

    pub fn issue_token(&self, user_id: Uuid, email: Option<String>) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iss: self.config.issuer.clone(),
            exp: (now + Duration::minutes(self.config.access_token_expiry_minutes)).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            email,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow!("Failed to encode access token: {e}"))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.leeway = self.config.leeway_seconds;

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow!("Token validation failed: {e}"))?;
        debug!("Validated token {} for {}", data.claims.jti, data.claims.sub);
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_issue_then_validate() {
        let manager = JwtManager::new(JwtConfig::default(), SECRET).unwrap();
        let user_id = Uuid::new_v4();
        let token = manager.issue_token(user_id, Some("pat@example.com".into())).unwrap();
        let claims = manager.validate_token(&token).unwrap();
        assert_eq!(claims.user_id().unwrap(), user_id);
        assert_eq!(claims.email.as_deref(), Some("pat@example.com"));
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(JwtManager::new(JwtConfig::default(), "short").is_err());
    }

    #[test]
    fn test_foreign_issuer_rejected() {
        let ours = JwtManager::new(JwtConfig::default(), SECRET).unwrap();
        let theirs = JwtManager::new(
            JwtConfig {
                issuer: "someone-else".into(),
                ..JwtConfig::default()
            },
            SECRET,
        )
        .unwrap();
        let token = theirs.issue_token(Uuid::new_v4(), None).unwrap();
        assert!(ours.validate_token(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let manager = JwtManager::new(
            JwtConfig {
                access_token_expiry_minutes: -10,
                leeway_seconds: 0,
                ..JwtConfig::default()
            },
            SECRET,
        )
        .unwrap();
        let token = manager.issue_token(Uuid::new_v4(), None).unwrap();
        assert!(manager.validate_token(&token).is_err());
    }
}
