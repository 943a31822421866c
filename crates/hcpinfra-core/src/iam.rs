//! Identity-only commands
//!
//! `create-iam` and `destroy-iam` manage the workload-identity graph in an
//! existing resource group without touching network or DNS resources.

use crate::ensure_active;
use crate::error::{InfraError, Result, StepContext};
use crate::identity::{IdentityComponent, IdentityManager, WorkloadIdentities, WorkloadIdentityOptions};
use crate::output::write_output;
use hcpinfra_cloud::{CancellationToken, CloudApi};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Clone, Default)]
pub struct CreateIamOptions {
    pub name: String,
    pub infra_id: String,
    pub location: String,
    pub resource_group_name: String,
    pub oidc_issuer_url: String,
    pub output_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct DestroyIamOptions {
    pub name: String,
    pub infra_id: String,
    pub resource_group_name: String,
    /// Record written by `create-iam`, only used to log what is removed
    pub workload_identities_file: Option<PathBuf>,
}

fn require(fields: &[(&str, &str)]) -> Result<()> {
    match fields.iter().find(|(_, value)| value.is_empty()) {
        Some((flag, _)) => Err(InfraError::validation(format!("{} is required", flag))),
        None => Ok(()),
    }
}

pub struct IamInfra {
    cloud: Arc<dyn CloudApi>,
    cancel: CancellationToken,
}

impl IamInfra {
    pub fn new(cloud: Arc<dyn CloudApi>, cancel: CancellationToken) -> Self {
        Self { cloud, cancel }
    }

    /// Create the seven workload identities and their federated credentials.
    #[instrument(skip_all, fields(cluster = %opts.name, infra_id = %opts.infra_id))]
    pub async fn create(&self, opts: &CreateIamOptions) -> Result<WorkloadIdentities> {
        require(&[
            ("--name", opts.name.as_str()),
            ("--infra-id", opts.infra_id.as_str()),
            ("--resource-group-name", opts.resource_group_name.as_str()),
            ("--oidc-issuer-url", opts.oidc_issuer_url.as_str()),
        ])?;
        ensure_active(&self.cancel)?;

        let group = self
            .cloud
            .get_resource_group(&opts.resource_group_name)
            .await
            .step(format!(
                "get resource group name, '{}'",
                opts.resource_group_name
            ))?;
        let location = if opts.location.is_empty() {
            group.location
        } else {
            opts.location.clone()
        };

        let identities = IdentityManager::new(self.cloud.clone(), self.cancel.clone())
            .create_workload_identities(
                &WorkloadIdentityOptions {
                    name: opts.name.clone(),
                    infra_id: opts.infra_id.clone(),
                    location,
                    oidc_issuer_url: opts.oidc_issuer_url.clone(),
                },
                &opts.resource_group_name,
            )
            .await?;
        info!(resource_group = %opts.resource_group_name, "Successfully created workload identities");

        if let Some(path) = &opts.output_file {
            write_output(path, &identities)?;
        }
        Ok(identities)
    }

    /// Delete every identity of the graph, credentials first.
    #[instrument(skip_all, fields(cluster = %opts.name, infra_id = %opts.infra_id))]
    pub async fn destroy(&self, opts: &DestroyIamOptions) -> Result<()> {
        require(&[
            ("--name", opts.name.as_str()),
            ("--infra-id", opts.infra_id.as_str()),
            ("--resource-group-name", opts.resource_group_name.as_str()),
        ])?;

        if let Some(path) = &opts.workload_identities_file {
            let recorded: WorkloadIdentities = hcpinfra_config::load_document(path)
                .step(format!("read --workload-identities-file {}", path.display()))?;
            for component in IdentityComponent::ALL {
                let client_id = &component.slot(&recorded).client_id;
                if !client_id.is_empty() {
                    info!(component = %component, client_id = %client_id, "Removing workload identity");
                }
            }
        }

        IdentityManager::new(self.cloud.clone(), self.cancel.clone())
            .destroy_workload_identities(&opts.name, &opts.infra_id, &opts.resource_group_name)
            .await?;
        info!(resource_group = %opts.resource_group_name, "Successfully deleted workload identities");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCloud;

    fn create_options() -> CreateIamOptions {
        CreateIamOptions {
            name: "demo".into(),
            infra_id: "abc".into(),
            location: String::new(),
            resource_group_name: "shared".into(),
            oidc_issuer_url: "https://issuer.example.com".into(),
            output_file: None,
        }
    }

    fn destroy_options() -> DestroyIamOptions {
        DestroyIamOptions {
            name: "demo".into(),
            infra_id: "abc".into(),
            resource_group_name: "shared".into(),
            workload_identities_file: None,
        }
    }

    fn iam(fake: &Arc<FakeCloud>) -> IamInfra {
        IamInfra::new(fake.clone(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_create_writes_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workload-identities.json");
        let fake = Arc::new(FakeCloud::new().with_resource_group("shared"));
        let mut opts = create_options();
        opts.output_file = Some(path.clone());

        let created = iam(&fake).create(&opts).await.unwrap();
        let written: WorkloadIdentities = hcpinfra_config::load_document(&path).unwrap();
        assert_eq!(written, created);
        assert_eq!(fake.calls_for("create_or_update_identity").len(), 7);
        assert!(fake.calls_for("create_or_update_resource_group").is_empty());
    }

    #[tokio::test]
    async fn test_create_requires_existing_group() {
        let fake = Arc::new(FakeCloud::new());
        let err = iam(&fake).create(&create_options()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(fake.calls_for("create_or_update_identity").is_empty());
    }

    #[tokio::test]
    async fn test_create_requires_issuer() {
        let fake = Arc::new(FakeCloud::new().with_resource_group("shared"));
        let mut opts = create_options();
        opts.oidc_issuer_url.clear();
        let err = iam(&fake).create(&opts).await.unwrap_err();
        assert_eq!(err.to_string(), "--oidc-issuer-url is required");
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_destroy_removes_created_identities() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wi.yaml");
        let fake = Arc::new(FakeCloud::new().with_resource_group("shared"));
        let mut create = create_options();
        create.output_file = Some(path.clone());
        iam(&fake).create(&create).await.unwrap();

        let mut opts = destroy_options();
        opts.workload_identities_file = Some(path);
        iam(&fake).destroy(&opts).await.unwrap();
        for component in IdentityComponent::ALL {
            let name = format!("demo{}-abc", component.identity_suffix());
            assert!(!fake.has_identity("shared", &name), "{} left behind", name);
        }
    }

    #[tokio::test]
    async fn test_destroy_twice_succeeds() {
        let fake = Arc::new(FakeCloud::new().with_resource_group("shared"));
        iam(&fake).destroy(&destroy_options()).await.unwrap();
        iam(&fake).destroy(&destroy_options()).await.unwrap();
    }

    #[tokio::test]
    async fn test_destroy_with_unreadable_record_fails_early() {
        let fake = Arc::new(FakeCloud::new().with_resource_group("shared"));
        let mut opts = destroy_options();
        opts.workload_identities_file = Some(PathBuf::from("/nonexistent/wi.yaml"));
        let err = iam(&fake).destroy(&opts).await.unwrap_err();
        assert!(err.to_string().contains("read --workload-identities-file"));
        assert!(fake.calls().is_empty());
    }
}
