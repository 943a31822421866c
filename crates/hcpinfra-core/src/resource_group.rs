//! Main and side resource groups

use crate::ensure_active;
use crate::error::{Result, StepContext};
use hcpinfra_cloud::model::{ResourceGroup, Tags};
use hcpinfra_cloud::{CancellationToken, CloudApi};
use std::sync::Arc;
use tracing::{info, instrument};

pub const EXISTING_GROUP_MESSAGE: &str = "Successfully found existing resource group";
pub const CREATED_GROUP_MESSAGE: &str = "Successfully created resource group";

/// What the resource-group manager needs to know about the cluster.
#[derive(Debug, Clone, Default)]
pub struct ResourceGroupOptions {
    pub name: String,
    pub infra_id: String,
    pub location: String,
    /// Pre-existing main resource group; empty to create `{name}-{infra_id}`
    pub resource_group_name: String,
    pub tags: Tags,
}

/// Resource group resolved by [`ResourceGroupManager::create_or_get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGroup {
    pub name: String,
    pub created: bool,
}

impl ResolvedGroup {
    pub fn message(&self) -> &'static str {
        if self.created {
            CREATED_GROUP_MESSAGE
        } else {
            EXISTING_GROUP_MESSAGE
        }
    }
}

pub struct ResourceGroupManager {
    cloud: Arc<dyn CloudApi>,
    cancel: CancellationToken,
}

impl ResourceGroupManager {
    pub fn new(cloud: Arc<dyn CloudApi>, cancel: CancellationToken) -> Self {
        Self { cloud, cancel }
    }

    /// Resolve the main group (`sub_name == None`) or a side group.
    ///
    /// A caller-supplied main group must already exist and is only read.
    /// Every other group is created or updated as `{name}-{infra_id}` or
    /// `{sub_name}-{infra_id}` with the configured location and tags.
    #[instrument(skip(self, opts), fields(cluster = %opts.name))]
    pub async fn create_or_get(
        &self,
        opts: &ResourceGroupOptions,
        sub_name: Option<&str>,
    ) -> Result<ResolvedGroup> {
        ensure_active(&self.cancel)?;

        if !opts.resource_group_name.is_empty() && sub_name.is_none() {
            let group = self
                .cloud
                .get_resource_group(&opts.resource_group_name)
                .await
                .step(format!(
                    "get resource group name, '{}'",
                    opts.resource_group_name
                ))?;
            let resolved = ResolvedGroup {
                name: group
                    .name
                    .unwrap_or_else(|| opts.resource_group_name.clone()),
                created: false,
            };
            info!(name = %resolved.name, "{}", resolved.message());
            return Ok(resolved);
        }

        let name = format!("{}-{}", sub_name.unwrap_or(&opts.name), opts.infra_id);
        let body = ResourceGroup {
            location: opts.location.clone(),
            tags: opts.tags.clone(),
            ..Default::default()
        };
        let group = self
            .cloud
            .create_or_update_resource_group(&name, &body)
            .await
            .step("create a resource group")?;

        let resolved = ResolvedGroup {
            name: group.name.unwrap_or(name),
            created: true,
        };
        info!(name = %resolved.name, "{}", resolved.message());
        Ok(resolved)
    }

    /// Delete a whole resource group and wait for it to disappear.
    ///
    /// Returns `false` when the group was already gone.
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<bool> {
        ensure_active(&self.cancel)?;
        let lro = match self.cloud.begin_delete_resource_group(name).await {
            Ok(lro) => lro,
            Err(e) if e.is_not_found() => {
                info!(name, "Resource group not found, nothing to delete");
                return Ok(false);
            }
            Err(e) => return Err(e).step(format!("delete resource group '{}'", name)),
        };

        match lro.poll_until_done(&self.cancel).await {
            Ok(()) => {
                info!(name, "Successfully deleted resource group");
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e).step(format!("wait for deletion of resource group '{}'", name)),
        }
    }

    /// Delete a group only when an existence check finds it.
    pub async fn delete_if_exists(&self, name: &str) -> Result<bool> {
        ensure_active(&self.cancel)?;
        let exists = self
            .cloud
            .check_resource_group_existence(name)
            .await
            .step(format!("check existence of resource group '{}'", name))?;
        if !exists {
            info!(name, "Resource group does not exist, skipping");
            return Ok(false);
        }
        self.delete(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCloud;
    use hcpinfra_cloud::CloudError;

    fn options() -> ResourceGroupOptions {
        let mut tags = Tags::new();
        tags.insert("team".into(), "infra".into());
        ResourceGroupOptions {
            name: "demo".into(),
            infra_id: "abc".into(),
            location: "westus2".into(),
            resource_group_name: String::new(),
            tags,
        }
    }

    fn manager(fake: &Arc<FakeCloud>) -> ResourceGroupManager {
        ResourceGroupManager::new(fake.clone(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_creates_main_group_with_tags() {
        let fake = Arc::new(FakeCloud::new());
        let resolved = manager(&fake).create_or_get(&options(), None).await.unwrap();
        assert_eq!(resolved.name, "demo-abc");
        assert!(resolved.created);
        assert_eq!(resolved.message(), "Successfully created resource group");

        let group = fake.resource_group("demo-abc").unwrap();
        assert_eq!(group.location, "westus2");
        assert_eq!(group.tags.get("team").map(String::as_str), Some("infra"));
    }

    #[tokio::test]
    async fn test_creates_side_group() {
        let fake = Arc::new(FakeCloud::new());
        let resolved = manager(&fake)
            .create_or_get(&options(), Some("demo-vnet"))
            .await
            .unwrap();
        assert_eq!(resolved.name, "demo-vnet-abc");
    }

    #[tokio::test]
    async fn test_side_group_created_even_with_existing_main() {
        let fake = Arc::new(FakeCloud::new());
        let mut opts = options();
        opts.resource_group_name = "shared".into();
        let resolved = manager(&fake)
            .create_or_get(&opts, Some("demo-nsg"))
            .await
            .unwrap();
        assert_eq!(resolved.name, "demo-nsg-abc");
        assert!(resolved.created);
    }

    #[tokio::test]
    async fn test_existing_main_group_is_only_read() {
        let fake = Arc::new(FakeCloud::new().with_resource_group("shared"));
        let mut opts = options();
        opts.resource_group_name = "shared".into();
        let resolved = manager(&fake).create_or_get(&opts, None).await.unwrap();
        assert_eq!(resolved.name, "shared");
        assert!(!resolved.created);
        assert_eq!(resolved.message(), "Successfully found existing resource group");
        assert!(fake.calls_for("create_or_update_resource_group").is_empty());
    }

    #[tokio::test]
    async fn test_missing_existing_group_fails() {
        let fake = Arc::new(FakeCloud::new());
        let mut opts = options();
        opts.resource_group_name = "shared".into();
        let err = manager(&fake).create_or_get(&opts, None).await.unwrap_err();
        assert!(err.to_string().contains("get resource group name, 'shared'"));
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let fake = Arc::new(FakeCloud::new().with_resource_group("demo-abc"));
        let rg = manager(&fake);
        assert!(rg.delete("demo-abc").await.unwrap());
        assert!(!rg.delete("demo-abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_forbidden_is_error() {
        let fake = Arc::new(FakeCloud::new().with_resource_group("demo-abc"));
        fake.fail_next(
            "begin_delete_resource_group",
            CloudError::api(403, Some("AuthorizationFailed".into()), "denied"),
        );
        let err = manager(&fake).delete("demo-abc").await.unwrap_err();
        assert!(err.cloud_error().unwrap().is_forbidden());
    }

    #[tokio::test]
    async fn test_delete_if_exists_skips_absent_group() {
        let fake = Arc::new(FakeCloud::new());
        assert!(!manager(&fake).delete_if_exists("demo-vnet-abc").await.unwrap());
        assert!(fake.calls_for("begin_delete_resource_group").is_empty());
    }
}
