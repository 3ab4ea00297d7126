//! The bearer token obtained through the OAuth helper (see [`crate::oauth`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An OAuth 2.1 access/refresh token pair plus its expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    pub expires_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub scope: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuthToken {
    /// `true` iff `expires_at <= now` (spec.md §3).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn expired_iff_expires_at_in_past_or_now() {
        let mut token = OAuthToken {
            access_token: "abc".into(),
            token_type: "Bearer".into(),
            expires_at: Utc::now() + Duration::seconds(60),
            refresh_token: None,
            scope: String::new(),
        };
        assert!(!token.is_expired());

        token.expires_at = Utc::now() - Duration::seconds(1);
        assert!(token.is_expired());
    }

    #[test]
    fn token_type_defaults_to_bearer() {
        let json = serde_json::json!({
            "access_token": "abc",
            "expires_at": Utc::now().to_rfc3339(),
        });
        let token: OAuthToken = serde_json::from_value(json).unwrap();
        assert_eq!(token.token_type, "Bearer");
    }

    #[test]
    fn authorization_header_format() {
        let token = OAuthToken {
            access_token: "abc".into(),
            token_type: "Bearer".into(),
            expires_at: Utc::now(),
            refresh_token: None,
            scope: String::new(),
        };
        assert_eq!(token.authorization_header(), "Bearer abc");
    }
}
