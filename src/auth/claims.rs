use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `typ` claim carried by hub credentials and never by session tokens
pub const HUB_CREDENTIAL_TYPE: &str = "hub";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Display name shown in typing and membership events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional device label for multi-device presence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Token use. Only hub credentials set it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    /// Additional custom claims
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Claims {
    pub fn user_id(&self) -> &str {
        &self.sub
    }

    /// Display name, falling back to the user id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.sub)
    }

    pub fn is_hub_credential(&self) -> bool {
        self.typ.as_deref() == Some(HUB_CREDENTIAL_TYPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_falls_back_to_subject() {
        let mut claims = Claims {
            sub: "user-1".to_string(),
            exp: 0,
            iat: 0,
            name: None,
            device: None,
            typ: None,
            extra: Default::default(),
        };
        assert_eq!(claims.display_name(), "user-1");
        assert!(!claims.is_hub_credential());

        claims.name = Some("Ada".to_string());
        assert_eq!(claims.display_name(), "Ada");
    }

    #[test]
    fn test_hub_credential_type_survives_serialization() {
        let json = serde_json::json!({"sub": "u", "exp": 1, "iat": 0, "typ": "hub"});
        let claims: Claims = serde_json::from_value(json).unwrap();
        assert!(claims.is_hub_credential());
        assert!(claims.extra.is_empty());

        let session: Claims =
            serde_json::from_value(serde_json::json!({"sub": "u", "exp": 1, "iat": 0})).unwrap();
        assert!(!session.is_hub_credential());
        assert!(serde_json::to_value(&session).unwrap().get("typ").is_none());
    }
}
