use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use crate::config::JwtConfig;
use crate::error::AppError;

use super::{Claims, HUB_CREDENTIAL_TYPE};

pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(config: &JwtConfig) -> Self {
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        let mut validation = Validation::default();

        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
        }

        if let Some(ref audience) = config.audience {
            validation.set_audience(&[audience]);
        }

        Self {
            decoding_key,
            validation,
        }
    }

    pub fn validate(&self, token: &str) -> Result<Claims, AppError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

        Ok(token_data.claims)
    }

    /// Accept only credentials minted by [`HubTokenIssuer`]
    pub fn validate_hub_credential(&self, token: &str) -> Result<Claims, AppError> {
        let claims = self.validate(token)?;
        if !claims.is_hub_credential() {
            return Err(AppError::Auth("Not a hub credential".to_string()));
        }
        Ok(claims)
    }

    /// Accept only session tokens; hub credentials cannot mint more of themselves
    pub fn validate_session(&self, token: &str) -> Result<Claims, AppError> {
        let claims = self.validate(token)?;
        if claims.is_hub_credential() {
            return Err(AppError::Auth("Hub credential used as a session".to_string()));
        }
        Ok(claims)
    }
}

/// Mints the short-lived credential attached to hub handshakes.
pub struct HubTokenIssuer {
    encoding_key: EncodingKey,
    lifetime_seconds: i64,
    issuer: Option<String>,
    audience: Option<String>,
}

impl HubTokenIssuer {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            lifetime_seconds: config.hub_token_lifetime_seconds as i64,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
        }
    }

    /// Issue a hub credential for the session identified by `session`.
    pub fn issue(&self, session: &Claims) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let mut extra = std::collections::HashMap::new();
        if let Some(ref iss) = self.issuer {
            extra.insert("iss".to_string(), serde_json::Value::from(iss.clone()));
        }
        if let Some(ref aud) = self.audience {
            extra.insert("aud".to_string(), serde_json::Value::from(aud.clone()));
        }

        let claims = Claims {
            sub: session.sub.clone(),
            exp: now + self.lifetime_seconds,
            iat: now,
            name: session.name.clone(),
            device: session.device.clone(),
            typ: Some(HUB_CREDENTIAL_TYPE.to_string()),
            extra,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign hub token: {}", e)))
    }
}
