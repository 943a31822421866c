//! Client-secret token credential
//!
//! Implements the OAuth2 client-credentials grant against the tenant's
//! token endpoint and caches one token per scope until it gets close to
//! expiry.

use crate::error::{AzureError, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use hcpinfra_cloud::{AccessToken, CloudConfiguration, TokenCredential};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Tokens this close to expiry are refreshed.
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Service-principal credential (tenant + client id + client secret)
pub struct ClientSecretCredential {
    http: reqwest::Client,
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    cache: Mutex<HashMap<String, AccessToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl ClientSecretCredential {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        cloud: &CloudConfiguration,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            authority_host: cloud.authority_host.to_string(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Point the credential at a different authority (local test servers).
    pub fn with_authority_host(mut self, authority_host: impl Into<String>) -> Self {
        let mut host = authority_host.into();
        if !host.ends_with('/') {
            host.push('/');
        }
        self.authority_host = host;
        self
    }

    fn token_url(&self) -> String {
        format!(
            "{}{}/oauth2/v2.0/token",
            self.authority_host, self.tenant_id
        )
    }

    async fn request_token(&self, scope: &str) -> Result<AccessToken> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "client_credentials")
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", &self.client_secret)
            .append_pair("scope", scope)
            .finish();

        debug!(tenant = %self.tenant_id, scope, "Requesting access token");

        let response = self
            .http
            .post(self.token_url())
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let detail = match serde_json::from_str::<TokenErrorResponse>(&text) {
                Ok(e) => match e.error_description {
                    Some(desc) => format!("{}: {}", e.error, desc),
                    None => e.error,
                },
                Err(_) => format!("HTTP {}", status.as_u16()),
            };
            return Err(AzureError::Token(detail));
        }

        let token: TokenResponse = serde_json::from_str(&text)?;
        // expires_in is a number on v2 endpoints but a string on some sovereign clouds
        let expires_in = match token.expires_in {
            Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(3600),
            Some(serde_json::Value::String(s)) => s.parse().unwrap_or(3600),
            _ => 3600,
        };

        Ok(AccessToken::new(
            token.access_token,
            Utc::now() + Duration::seconds(expires_in),
        ))
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self, scope: &str) -> hcpinfra_cloud::Result<AccessToken> {
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.get(scope)
            && !token.expires_within(Duration::minutes(REFRESH_MARGIN_MINUTES))
        {
            return Ok(token.clone());
        }

        let token = self.request_token(scope).await?;
        cache.insert(scope.to_string(), token.clone());
        Ok(token)
    }
}

impl std::fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("authority_host", &self.authority_host)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}
