//! Azure client error types

use hcpinfra_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Token request failed: {0}")]
    Token(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Cloud error: {0}")]
    CloudError(#[from] CloudError),
}

impl From<AzureError> for CloudError {
    fn from(err: AzureError) -> Self {
        match err {
            AzureError::CloudError(inner) => inner,
            AzureError::Http(e) => CloudError::Transport(e.to_string()),
            AzureError::Url(e) => CloudError::InvalidConfig(e.to_string()),
            AzureError::Token(msg) => CloudError::AuthenticationFailed(msg),
            AzureError::InvalidConfig(msg) => CloudError::InvalidConfig(msg),
            AzureError::UnexpectedResponse(msg) => CloudError::MalformedResponse(msg),
            AzureError::JsonError(e) => CloudError::MalformedResponse(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AzureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_passes_through() {
        let err: CloudError =
            AzureError::CloudError(CloudError::api(409, Some("Conflict".into()), "x")).into();
        assert!(err.is_conflict());
        assert_eq!(err.status(), Some(409));
    }

    #[test]
    fn test_token_error_maps_to_authentication() {
        let err: CloudError = AzureError::Token("invalid_client".into()).into();
        assert!(matches!(err, CloudError::AuthenticationFailed(m) if m == "invalid_client"));
    }
}
