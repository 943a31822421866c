//! Managed identity and federated credential lifecycle

use super::graph::{FederatedCredentialConfig, workload_identity_definitions};
use super::model::WorkloadIdentities;
use crate::ensure_active;
use crate::error::{InfraError, Result, StepContext};
use crate::naming;
use hcpinfra_cloud::model::{
    FederatedIdentityCredential, FederatedIdentityCredentialProperties, Identity,
};
use hcpinfra_cloud::{CancellationToken, CloudApi};
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Identifiers of a freshly created or updated managed identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedIdentity {
    pub resource_id: String,
    pub client_id: String,
    pub principal_id: String,
}

/// Inputs for generating the workload identities of one cluster.
#[derive(Debug, Clone, Default)]
pub struct WorkloadIdentityOptions {
    pub name: String,
    pub infra_id: String,
    pub location: String,
    pub oidc_issuer_url: String,
}

pub struct IdentityManager {
    cloud: Arc<dyn CloudApi>,
    cancel: CancellationToken,
}

impl IdentityManager {
    pub fn new(cloud: Arc<dyn CloudApi>, cancel: CancellationToken) -> Self {
        Self { cloud, cancel }
    }

    /// Create or update the identity `{name}-{infra_id}`.
    #[instrument(skip(self), fields(resource_group = %resource_group))]
    pub async fn create_managed_identity(
        &self,
        resource_group: &str,
        name: &str,
        infra_id: &str,
        location: &str,
    ) -> Result<CreatedIdentity> {
        ensure_active(&self.cancel)?;
        let identity_name = naming::identity_name(name, infra_id);
        info!(name = %identity_name, location, "Creating managed identity");

        let body = Identity {
            location: location.to_string(),
            ..Default::default()
        };
        let identity = self
            .cloud
            .create_or_update_identity(resource_group, &identity_name, &body)
            .await
            .step("create managed identity")?;

        let props = identity.properties.as_ref();
        let (Some(resource_id), Some(client_id), Some(principal_id)) = (
            identity.id.clone(),
            props.and_then(|p| p.client_id.clone()),
            props.and_then(|p| p.principal_id.clone()),
        ) else {
            return Err(InfraError::malformed(
                "managed identity response missing required fields",
            ));
        };

        info!(
            name = %identity_name,
            resource_id = %resource_id,
            client_id = %client_id,
            principal_id = %principal_id,
            "Successfully created managed identity"
        );
        Ok(CreatedIdentity {
            resource_id,
            client_id,
            principal_id,
        })
    }

    #[instrument(skip(self, config), fields(credential = %config.credential_name))]
    pub async fn create_federated_identity_credential(
        &self,
        resource_group: &str,
        identity_name: &str,
        issuer: &str,
        config: &FederatedCredentialConfig,
    ) -> Result<()> {
        ensure_active(&self.cancel)?;
        info!(
            identity = identity_name,
            issuer,
            subject = %config.subject,
            audience = %config.audience,
            "Creating federated identity credential"
        );

        let body = FederatedIdentityCredential {
            properties: FederatedIdentityCredentialProperties {
                issuer: issuer.to_string(),
                subject: config.subject.clone(),
                audiences: vec![config.audience.clone()],
            },
            ..Default::default()
        };
        self.cloud
            .create_or_update_federated_credential(
                resource_group,
                identity_name,
                &config.credential_name,
                &body,
            )
            .await
            .step(format!(
                "create federated credential '{}'",
                config.credential_name
            ))?;

        info!(identity = identity_name, "Successfully created federated identity credential");
        Ok(())
    }

    /// Create every identity of the graph and its federated credentials.
    ///
    /// Fails fast: the first error aborts and leaves earlier identities in
    /// place for `destroy` to remove.
    #[instrument(skip(self, opts), fields(cluster = %opts.name, infra_id = %opts.infra_id))]
    pub async fn create_workload_identities(
        &self,
        opts: &WorkloadIdentityOptions,
        resource_group: &str,
    ) -> Result<WorkloadIdentities> {
        let mut identities = WorkloadIdentities::default();

        for def in workload_identity_definitions(&opts.name) {
            let base_name = def.base_name(&opts.name);
            let created = self
                .create_managed_identity(resource_group, &base_name, &opts.infra_id, &opts.location)
                .await
                .step(format!("create {} managed identity", def.component))?;

            def.component.slot_mut(&mut identities).client_id = created.client_id;

            let identity_name = def.identity_name(&opts.name, &opts.infra_id);
            for cred in &def.federated_credentials {
                self.create_federated_identity_credential(
                    resource_group,
                    &identity_name,
                    &opts.oidc_issuer_url,
                    cred,
                )
                .await?;
            }
        }

        Ok(identities)
    }

    /// Delete every identity of the graph, credentials first.
    ///
    /// Missing resources are skipped. Other failures are logged and counted
    /// while the remaining identities are still processed; the count is
    /// returned as [`InfraError::IdentityCleanup`]. Cancellation ends the
    /// loop at once and is returned as is.
    #[instrument(skip(self))]
    pub async fn destroy_workload_identities(
        &self,
        cluster_name: &str,
        infra_id: &str,
        resource_group: &str,
    ) -> Result<()> {
        let mut failed = 0usize;

        for def in workload_identity_definitions(cluster_name) {
            let identity_name = def.identity_name(cluster_name, infra_id);

            for cred in &def.federated_credentials {
                if let Err(e) = self
                    .delete_federated_identity_credential(
                        resource_group,
                        &identity_name,
                        &cred.credential_name,
                    )
                    .await
                {
                    if e.is_cancelled() {
                        return Err(e);
                    }
                    error!(
                        credential = %cred.credential_name,
                        identity = %identity_name,
                        error = %e,
                        "Failed to delete federated credential, continuing"
                    );
                    failed += 1;
                }
            }

            if let Err(e) = self
                .delete_managed_identity(resource_group, &identity_name)
                .await
            {
                if e.is_cancelled() {
                    return Err(e);
                }
                error!(
                    identity = %identity_name,
                    component = %def.component,
                    error = %e,
                    "Failed to delete managed identity, continuing with remaining identities"
                );
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(InfraError::IdentityCleanup { failed });
        }

        info!(
            cluster = cluster_name,
            infra_id,
            resource_group,
            "Successfully deleted all workload identities and federated credentials"
        );
        Ok(())
    }

    async fn delete_federated_identity_credential(
        &self,
        resource_group: &str,
        identity_name: &str,
        credential_name: &str,
    ) -> Result<()> {
        ensure_active(&self.cancel)?;
        info!(credential = credential_name, identity = identity_name, "Deleting federated identity credential");

        match self
            .cloud
            .delete_federated_credential(resource_group, identity_name, credential_name)
            .await
        {
            Ok(()) => {
                info!(credential = credential_name, "Successfully deleted federated identity credential");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                info!(credential = credential_name, "Federated identity credential not found, skipping deletion");
                Ok(())
            }
            Err(e) => Err(e).step(format!("delete federated credential '{}'", credential_name)),
        }
    }

    async fn delete_managed_identity(&self, resource_group: &str, identity_name: &str) -> Result<()> {
        ensure_active(&self.cancel)?;
        info!(name = identity_name, resource_group, "Deleting managed identity");

        match self.cloud.delete_identity(resource_group, identity_name).await {
            Ok(()) => {
                info!(name = identity_name, "Successfully deleted managed identity");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                info!(name = identity_name, "Managed identity not found, skipping deletion");
                Ok(())
            }
            Err(e) => Err(e).step(format!("delete managed identity '{}'", identity_name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityComponent;
    use crate::testing::FakeCloud;
    use hcpinfra_cloud::CloudError;

    fn options() -> WorkloadIdentityOptions {
        WorkloadIdentityOptions {
            name: "demo".into(),
            infra_id: "abc".into(),
            location: "eastus".into(),
            oidc_issuer_url: "https://issuer.example.com".into(),
        }
    }

    fn manager(fake: &Arc<FakeCloud>) -> IdentityManager {
        IdentityManager::new(fake.clone(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_create_workload_identities_fills_every_slot() {
        let fake = Arc::new(FakeCloud::new().with_resource_group("demo-abc"));
        let ids = manager(&fake)
            .create_workload_identities(&options(), "demo-abc")
            .await
            .unwrap();

        for component in IdentityComponent::ALL {
            assert!(!component.slot(&ids).client_id.is_empty(), "{} missing", component);
        }
        assert_eq!(fake.calls_for("create_or_update_identity").len(), 7);
        // 3 disk + 3 file + 2 registry + 4 single-credential components
        assert_eq!(fake.calls_for("create_or_update_federated_credential").len(), 12);
        assert!(fake.has_identity("demo-abc", "demo-ingress-abc"));
    }

    #[tokio::test]
    async fn test_credentials_use_issuer_and_single_audience() {
        let fake = Arc::new(FakeCloud::new().with_resource_group("rg"));
        manager(&fake)
            .create_workload_identities(&options(), "rg")
            .await
            .unwrap();

        let cred = fake
            .federated_credential("rg", "demo-network-abc", "demo-network-fed-id")
            .unwrap();
        assert_eq!(cred.properties.issuer, "https://issuer.example.com");
        assert_eq!(cred.properties.audiences, vec!["openshift".to_string()]);
        assert_eq!(
            cred.properties.subject,
            "system:serviceaccount:openshift-cloud-network-config-controller:cloud-network-config-controller"
        );
    }

    #[tokio::test]
    async fn test_create_managed_identity_rejects_incomplete_response() {
        let fake = Arc::new(FakeCloud::new().with_resource_group("rg"));
        fake.omit_identity_principal();
        let err = manager(&fake)
            .create_managed_identity("rg", "demo-disk", "abc", "eastus")
            .await
            .unwrap_err();
        assert!(matches!(err, InfraError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_create_stops_at_first_failure() {
        let fake = Arc::new(FakeCloud::new().with_resource_group("rg"));
        fake.fail_next("create_or_update_identity", CloudError::api(500, None, "boom"));
        let err = manager(&fake)
            .create_workload_identities(&options(), "rg")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("create disk managed identity"));
        assert!(fake.calls_for("create_or_update_federated_credential").is_empty());
    }

    #[tokio::test]
    async fn test_destroy_deletes_credentials_before_identity() {
        let fake = Arc::new(FakeCloud::new().with_resource_group("rg"));
        let mgr = manager(&fake);
        mgr.create_workload_identities(&options(), "rg").await.unwrap();
        mgr.destroy_workload_identities("demo", "abc", "rg").await.unwrap();

        let calls = fake.calls();
        let disk_identity = calls
            .iter()
            .position(|c| c == "delete_identity rg/demo-disk-abc")
            .unwrap();
        let disk_cred = calls
            .iter()
            .position(|c| c == "delete_federated_credential rg/demo-disk-abc/demo-disk-fed-id-controller")
            .unwrap();
        assert!(disk_cred < disk_identity);
        assert!(!fake.has_identity("rg", "demo-disk-abc"));
    }

    #[tokio::test]
    async fn test_destroy_swallows_not_found() {
        let fake = Arc::new(FakeCloud::new().with_resource_group("rg"));
        manager(&fake)
            .destroy_workload_identities("demo", "abc", "rg")
            .await
            .unwrap();
        assert_eq!(fake.calls_for("delete_identity").len(), 7);
    }

    #[tokio::test]
    async fn test_destroy_continues_and_counts_failures() {
        let fake = Arc::new(FakeCloud::new().with_resource_group("rg"));
        fake.fail_on("delete_identity", "rg/demo-file-abc", 500, None);
        fake.fail_on(
            "delete_federated_credential",
            "rg/demo-ingress-abc/demo-ingress-fed-id",
            403,
            Some("AuthorizationFailed"),
        );

        let err = manager(&fake)
            .destroy_workload_identities("demo", "abc", "rg")
            .await
            .unwrap_err();
        assert!(matches!(err, InfraError::IdentityCleanup { failed: 2 }));
        assert_eq!(
            err.to_string(),
            "failed to delete 2 resources during identity cleanup"
        );
        // every identity was still attempted
        assert_eq!(fake.calls_for("delete_identity").len(), 7);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_destroy() {
        let fake = Arc::new(FakeCloud::new().with_resource_group("rg"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = IdentityManager::new(fake.clone(), cancel)
            .destroy_workload_identities("demo", "abc", "rg")
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!matches!(err, InfraError::IdentityCleanup { .. }));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_creation() {
        let fake = Arc::new(FakeCloud::new().with_resource_group("rg"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = IdentityManager::new(fake.clone(), cancel)
            .create_workload_identities(&options(), "rg")
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(fake.calls().is_empty());
    }
}
