use hcpinfra_cloud::CloudError;
use hcpinfra_config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InfraError {
    /// Illegal flag or option combination, reported before any cloud call
    #[error("{0}")]
    Validation(String),

    /// The cloud answered without a field the pipeline depends on
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("no object id found for client id: {0}")]
    PrincipalNotFound(String),

    #[error("more than one object id found for client id: {0}")]
    AmbiguousPrincipal(String),

    #[error("failed to delete {failed} resources during identity cleanup")]
    IdentityCleanup { failed: usize },

    #[error("invalid resource id '{id}': {reason}")]
    InvalidResourceId { id: String, reason: String },

    /// A pipeline step failed; `step` names what was being done
    #[error("failed to {step}: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<InfraError>,
    },

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl InfraError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// The cloud error at the root of this error, if any.
    pub fn cloud_error(&self) -> Option<&CloudError> {
        match self {
            Self::Cloud(err) => Some(err),
            Self::Step { source, .. } => source.cloud_error(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.cloud_error().is_some_and(CloudError::is_not_found)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.cloud_error(), Some(CloudError::Cancelled))
    }
}

/// Attach a step description to a fallible pipeline call.
pub trait StepContext<T> {
    fn step(self, step: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<InfraError>> StepContext<T> for std::result::Result<T, E> {
    fn step(self, step: impl Into<String>) -> Result<T> {
        self.map_err(|err| InfraError::Step {
            step: step.into(),
            source: Box::new(err.into()),
        })
    }
}

pub type Result<T> = std::result::Result<T, InfraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_context_wraps_message() {
        let res: std::result::Result<(), CloudError> =
            Err(CloudError::not_found("ResourceGroup 'rg' could not be found"));
        let err = res.step("create a resource group").unwrap_err();
        assert!(err.to_string().starts_with("failed to create a resource group: "));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_principal_messages() {
        assert_eq!(
            InfraError::PrincipalNotFound("abc".into()).to_string(),
            "no object id found for client id: abc"
        );
        assert_eq!(
            InfraError::AmbiguousPrincipal("abc".into()).to_string(),
            "more than one object id found for client id: abc"
        );
    }

    #[test]
    fn test_identity_cleanup_message() {
        let err = InfraError::IdentityCleanup { failed: 3 };
        assert_eq!(
            err.to_string(),
            "failed to delete 3 resources during identity cleanup"
        );
    }

    #[test]
    fn test_cancelled_detection() {
        let err: InfraError = CloudError::Cancelled.into();
        assert!(err.is_cancelled());
        assert!(!InfraError::validation("x").is_cancelled());
    }
}
