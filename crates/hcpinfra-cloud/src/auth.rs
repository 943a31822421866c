//! Bearer-token credentials

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// OAuth2 access token.
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_on,
        }
    }

    /// True if the token expires within `margin` from now.
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_on - margin <= Utc::now()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Source of access tokens for a given scope.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scope: &str) -> Result<AccessToken>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_margin() {
        let token = AccessToken::new("t", Utc::now() + Duration::minutes(3));
        assert!(token.expires_within(Duration::minutes(5)));
        assert!(!token.expires_within(Duration::minutes(1)));
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = AccessToken::new("secret-value", Utc::now());
        assert!(!format!("{:?}", token).contains("secret-value"));
    }
}
