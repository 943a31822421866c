//! Cloud API error types

use thiserror::Error;

/// Classification of a failed cloud call.
///
/// Callers branch on the kind rather than on raw status codes: destroy paths
/// swallow `NotFound`, RBAC existence probes downgrade `Forbidden`, and role
/// assignment creation treats `Conflict` as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Conflict,
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not-found"),
            ErrorKind::Forbidden => write!(f, "forbidden"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Cloud API errors
#[derive(Error, Debug)]
pub enum CloudError {
    /// The service answered with a non-success status.
    #[error("API error (HTTP {status}{}): {message}", code_suffix(.code))]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Long-running operation failed with status {status}: {message}")]
    OperationFailed { status: String, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Build an API error from a status and an optional service error code.
    pub fn api(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        CloudError::Api {
            status,
            code,
            message: message.into(),
        }
    }

    /// Shorthand for a 404 response, mostly useful to fakes and tests.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::api(404, Some("ResourceNotFound".to_string()), message)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            CloudError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            CloudError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Classify the error. The HTTP status decides first; the service error
    /// code is only consulted when the status is not one of 403/404/409.
    pub fn kind(&self) -> ErrorKind {
        let CloudError::Api { status, code, .. } = self else {
            return ErrorKind::Other;
        };

        match status {
            404 => return ErrorKind::NotFound,
            403 => return ErrorKind::Forbidden,
            409 => return ErrorKind::Conflict,
            _ => {}
        }

        match code.as_deref() {
            Some(c)
                if c.eq_ignore_ascii_case("ResourceNotFound")
                    || c.eq_ignore_ascii_case("ResourceGroupNotFound") =>
            {
                ErrorKind::NotFound
            }
            Some(c) if c.eq_ignore_ascii_case("AuthorizationFailed") => ErrorKind::Forbidden,
            Some(c)
                if c.eq_ignore_ascii_case("RoleAssignmentExists")
                    || c.eq_ignore_ascii_case("Conflict") =>
            {
                ErrorKind::Conflict
            }
            _ => ErrorKind::Other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_forbidden(&self) -> bool {
        self.kind() == ErrorKind::Forbidden
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(", code {c}"))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_decides_kind() {
        assert_eq!(CloudError::api(404, None, "x").kind(), ErrorKind::NotFound);
        assert_eq!(CloudError::api(403, None, "x").kind(), ErrorKind::Forbidden);
        assert_eq!(CloudError::api(409, None, "x").kind(), ErrorKind::Conflict);
        assert_eq!(CloudError::api(500, None, "x").kind(), ErrorKind::Other);
    }

    #[test]
    fn test_code_fallback() {
        let err = CloudError::api(400, Some("RoleAssignmentExists".into()), "exists");
        assert!(err.is_conflict());

        let err = CloudError::api(401, Some("authorizationfailed".into()), "denied");
        assert!(err.is_forbidden());

        let err = CloudError::api(400, Some("ResourceGroupNotFound".into()), "gone");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_non_api_errors_are_other() {
        assert_eq!(CloudError::Cancelled.kind(), ErrorKind::Other);
        assert_eq!(
            CloudError::MalformedResponse("missing id".into()).kind(),
            ErrorKind::Other
        );
    }

    #[test]
    fn test_display_includes_code() {
        let err = CloudError::api(409, Some("Conflict".into()), "already there");
        assert_eq!(
            err.to_string(),
            "API error (HTTP 409, code Conflict): already there"
        );
        let err = CloudError::api(500, None, "boom");
        assert_eq!(err.to_string(), "API error (HTTP 500): boom");
    }
}
