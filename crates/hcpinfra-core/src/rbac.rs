//! Role assignments for control-plane, workload and data-plane identities
//!
//! Assignments are made idempotent without any local state:
//!
//! 1. list the assignments at the scope and look for the same
//!    `(scope, role definition, principal)` triple
//! 2. GET the assignment by its deterministic name
//! 3. create it, treating "already exists" as success
//!
//! A caller without read permission on role assignments still works: a 403
//! on step 2 falls through to step 3 and its conflict handling.

use crate::ensure_active;
use crate::error::{InfraError, Result, StepContext};
use crate::identity::{ControlPlaneManagedIdentities, DataPlaneManagedIdentities, WorkloadIdentities};
use crate::naming::{self, RbacComponent, ScopeGroups};
use hcpinfra_cloud::model::{RoleAssignmentCreate, RoleAssignmentProperties};
use hcpinfra_cloud::{AccessToken, CancellationToken, CloudApi, CloudError};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Filter that restricts a scope listing to assignments made exactly there.
pub const AT_SCOPE_FILTER: &str = "atScope()";

/// What `assign_role` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Created,
    /// A matching assignment was already present (or creation conflicted)
    AlreadyAssigned,
}

/// Settings shared by the role-assignment assemblies.
#[derive(Debug, Clone, Default)]
pub struct RbacOptions {
    pub infra_id: String,
    /// Use component-specific role definitions instead of Contributor
    pub custom_roles: bool,
    /// Whether the image registry capability is enabled on the cluster
    pub image_registry_enabled: bool,
}

pub struct RbacManager {
    cloud: Arc<dyn CloudApi>,
    cancel: CancellationToken,
}

impl RbacManager {
    pub fn new(cloud: Arc<dyn CloudApi>, cancel: CancellationToken) -> Self {
        Self { cloud, cancel }
    }

    /// Assign `role` to `assignee_object_id` at `scope`, once.
    #[instrument(skip(self, assignee_object_id, role))]
    pub async fn assign_role(
        &self,
        infra_id: &str,
        component: &str,
        assignee_object_id: &str,
        role: &str,
        scope: &str,
    ) -> Result<AssignOutcome> {
        ensure_active(&self.cancel)?;
        let subscription_id = self.cloud.subscription_id();
        let assignment_name = naming::role_assignment_name(infra_id, component, scope);
        let role_definition_id = naming::role_definition_id(subscription_id, role);

        // Probe A: an equivalent assignment made by anyone under any name
        let mut pager = self
            .cloud
            .list_role_assignments_for_scope(scope, Some(AT_SCOPE_FILTER));
        while let Some(page) = pager
            .next_page()
            .await
            .step("list role assignments for scope")?
        {
            if page
                .iter()
                .any(|ra| ra.matches(scope, &role_definition_id, assignee_object_id))
            {
                info!(
                    role,
                    assignee = assignee_object_id,
                    scope,
                    "Skipping role assignment creation, matching assignment already exists"
                );
                return Ok(AssignOutcome::AlreadyAssigned);
            }
        }

        // Probe B: our own deterministic name
        match self.cloud.get_role_assignment(scope, &assignment_name).await {
            Ok(_) => {
                info!(
                    role,
                    assignee = assignee_object_id,
                    scope,
                    "Skipping role assignment creation, role assignment already exists"
                );
                return Ok(AssignOutcome::AlreadyAssigned);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) if is_authorization_failure(&e) => {
                info!(
                    role,
                    assignee = assignee_object_id,
                    scope,
                    "Get not permitted; will attempt create and rely on conflict for idempotency"
                );
            }
            Err(e) => return Err(e).step("check role assignment existence"),
        }

        let body = RoleAssignmentCreate {
            properties: RoleAssignmentProperties {
                role_definition_id: Some(role_definition_id),
                principal_id: Some(assignee_object_id.to_string()),
                scope: Some(scope.to_string()),
            },
        };
        match self
            .cloud
            .create_role_assignment(scope, &assignment_name, &body)
            .await
        {
            Ok(_) => {
                info!(role, assignee = assignee_object_id, scope, "Successfully created role assignment");
                Ok(AssignOutcome::Created)
            }
            Err(e) if e.is_conflict() => {
                info!(
                    role,
                    assignee = assignee_object_id,
                    scope,
                    "Role assignment already exists"
                );
                Ok(AssignOutcome::AlreadyAssigned)
            }
            Err(e) => Err(e).step("create role assignment"),
        }
    }

    /// Resolve an application (client) id to its service principal object id.
    pub async fn principal_id(&self, token: &AccessToken, client_id: &str) -> Result<String> {
        ensure_active(&self.cancel)?;
        let principals = self
            .cloud
            .list_service_principals_by_app_id(token, client_id)
            .await
            .step("look up service principal")?;

        match principals.as_slice() {
            [] => Err(InfraError::PrincipalNotFound(client_id.to_string())),
            [one] => {
                debug!(client_id, object_id = %one.id, "Resolved service principal");
                Ok(one.id.clone())
            }
            _ => Err(InfraError::AmbiguousPrincipal(client_id.to_string())),
        }
    }

    async fn directory_token(&self) -> Result<AccessToken> {
        self.cloud
            .get_directory_token()
            .await
            .step("get access token")
    }

    /// Assign roles to a list of `(component, client id)` pairs over their scopes.
    async fn assign_components(
        &self,
        opts: &RbacOptions,
        components: &[(RbacComponent, &str)],
        groups: &ScopeGroups,
    ) -> Result<()> {
        let token = self.directory_token().await?;
        let subscription_id = self.cloud.subscription_id().to_string();

        for &(component, client_id) in components {
            let object_id = self.principal_id(&token, client_id).await?;
            let (role, scopes) =
                naming::role_and_scopes(&subscription_id, groups, component, opts.custom_roles);

            for scope in scopes {
                self.assign_role(&opts.infra_id, component.name(), &object_id, role, &scope)
                    .await
                    .step("perform role assignment")?;
            }
        }
        Ok(())
    }

    /// Roles for the ARO-HCP control-plane managed identities.
    #[instrument(skip_all, fields(infra_id = %opts.infra_id))]
    pub async fn assign_control_plane_roles(
        &self,
        opts: &RbacOptions,
        identities: &ControlPlaneManagedIdentities,
        groups: &ScopeGroups,
    ) -> Result<()> {
        let components = control_plane_components(identities, opts.image_registry_enabled);
        self.assign_components(opts, &components, groups).await
    }

    /// Roles for self-managed workload identities.
    #[instrument(skip_all, fields(infra_id = %opts.infra_id))]
    pub async fn assign_workload_identities(
        &self,
        opts: &RbacOptions,
        identities: &WorkloadIdentities,
        groups: &ScopeGroups,
    ) -> Result<()> {
        let components = workload_components(identities, opts.image_registry_enabled);
        self.assign_components(opts, &components, groups).await
    }

    /// Dedicated roles for the data-plane identities on the main resource group.
    #[instrument(skip_all, fields(infra_id = %opts.infra_id))]
    pub async fn assign_data_plane_roles(
        &self,
        opts: &RbacOptions,
        identities: &DataPlaneManagedIdentities,
        resource_group: &str,
    ) -> Result<()> {
        let token = self.directory_token().await?;
        let scope = naming::resource_group_scope(self.cloud.subscription_id(), resource_group);

        for (component, client_id) in data_plane_components(identities) {
            let object_id = self.principal_id(&token, client_id).await?;
            self.assign_role(
                &opts.infra_id,
                &component.data_plane_name(),
                &object_id,
                component.custom_role(),
                &scope,
            )
            .await?;
        }
        Ok(())
    }
}

fn is_authorization_failure(err: &CloudError) -> bool {
    err.is_forbidden()
        || err
            .code()
            .is_some_and(|code| code.eq_ignore_ascii_case("AuthorizationFailed"))
}

/// Control-plane components in assignment order.
pub fn control_plane_components(
    identities: &ControlPlaneManagedIdentities,
    image_registry_enabled: bool,
) -> Vec<(RbacComponent, &str)> {
    let mut components = vec![
        (
            RbacComponent::ControlPlaneOperator,
            identities.control_plane_operator.client_id.as_str(),
        ),
        (
            RbacComponent::NodePoolManagement,
            identities.node_pool_management.client_id.as_str(),
        ),
        (RbacComponent::CloudProvider, identities.cloud_provider.client_id.as_str()),
        (RbacComponent::AzureFile, identities.file.client_id.as_str()),
        (RbacComponent::AzureDisk, identities.disk.client_id.as_str()),
        (RbacComponent::Ingress, identities.ingress.client_id.as_str()),
        (RbacComponent::Network, identities.network.client_id.as_str()),
    ];
    if image_registry_enabled {
        components.push((
            RbacComponent::ImageRegistry,
            identities.image_registry.client_id.as_str(),
        ));
    }
    components
}

/// Workload-identity components in assignment order.
///
/// There is no control-plane-operator workload identity, so that component
/// has no entry here.
pub fn workload_components(
    identities: &WorkloadIdentities,
    image_registry_enabled: bool,
) -> Vec<(RbacComponent, &str)> {
    let mut components = vec![
        (
            RbacComponent::NodePoolManagement,
            identities.node_pool_management.client_id.as_str(),
        ),
        (RbacComponent::CloudProvider, identities.cloud_provider.client_id.as_str()),
        (RbacComponent::AzureFile, identities.file.client_id.as_str()),
        (RbacComponent::AzureDisk, identities.disk.client_id.as_str()),
        (RbacComponent::Ingress, identities.ingress.client_id.as_str()),
        (RbacComponent::Network, identities.network.client_id.as_str()),
    ];
    if image_registry_enabled {
        components.push((
            RbacComponent::ImageRegistry,
            identities.image_registry.client_id.as_str(),
        ));
    }
    components
}

fn data_plane_components(identities: &DataPlaneManagedIdentities) -> [(RbacComponent, &str); 3] {
    [
        (RbacComponent::ImageRegistry, identities.image_registry_client_id.as_str()),
        (RbacComponent::AzureDisk, identities.disk_client_id.as_str()),
        (RbacComponent::AzureFile, identities.file_client_id.as_str()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ManagedIdentity;
    use crate::testing::{FAKE_SUBSCRIPTION, FakeCloud};
    use hcpinfra_cloud::model::RoleAssignment;

    fn scope() -> String {
        naming::resource_group_scope(FAKE_SUBSCRIPTION, "main-rg")
    }

    fn manager(fake: &Arc<FakeCloud>) -> RbacManager {
        RbacManager::new(fake.clone(), CancellationToken::new())
    }

    fn role_def() -> String {
        naming::role_definition_id(FAKE_SUBSCRIPTION, naming::CONTRIBUTOR_ROLE_ID)
    }

    #[tokio::test]
    async fn test_assign_role_creates_when_absent() {
        let fake = Arc::new(FakeCloud::new());
        let outcome = manager(&fake)
            .assign_role("abc", "cpo", "obj-1", naming::CONTRIBUTOR_ROLE_ID, &scope())
            .await
            .unwrap();
        assert_eq!(outcome, AssignOutcome::Created);

        let created = fake.role_assignments();
        assert_eq!(created.len(), 1);
        let props = created[0].properties.as_ref().unwrap();
        assert_eq!(props.principal_id.as_deref(), Some("obj-1"));
        assert_eq!(props.role_definition_id.as_deref(), Some(role_def().as_str()));
        assert_eq!(
            created[0].name.as_deref(),
            Some(naming::role_assignment_name("abc", "cpo", &scope()).as_str())
        );
    }

    #[tokio::test]
    async fn test_matching_triple_skips_create() {
        let fake = Arc::new(FakeCloud::new());
        // different name, same triple, different case
        fake.seed_role_assignment(RoleAssignment {
            id: None,
            name: Some("someone-elses".into()),
            properties: Some(RoleAssignmentProperties {
                role_definition_id: Some(role_def().to_uppercase()),
                principal_id: Some("OBJ-1".into()),
                scope: Some(scope()),
            }),
        });

        let outcome = manager(&fake)
            .assign_role("abc", "cpo", "obj-1", naming::CONTRIBUTOR_ROLE_ID, &scope())
            .await
            .unwrap();
        assert_eq!(outcome, AssignOutcome::AlreadyAssigned);
        assert!(fake.calls_for("create_role_assignment").is_empty());
        assert!(fake.calls_for("get_role_assignment").is_empty());
    }

    #[tokio::test]
    async fn test_conflict_on_create_is_success() {
        let fake = Arc::new(FakeCloud::new());
        fake.fail_next(
            "create_role_assignment",
            CloudError::api(409, Some("RoleAssignmentExists".into()), "exists"),
        );
        let outcome = manager(&fake)
            .assign_role("abc", "cpo", "obj-1", naming::CONTRIBUTOR_ROLE_ID, &scope())
            .await
            .unwrap();
        assert_eq!(outcome, AssignOutcome::AlreadyAssigned);
    }

    #[tokio::test]
    async fn test_forbidden_probe_proceeds_to_create() {
        let fake = Arc::new(FakeCloud::new());
        fake.fail_next(
            "get_role_assignment",
            CloudError::api(403, Some("AuthorizationFailed".into()), "no read"),
        );
        let outcome = manager(&fake)
            .assign_role("abc", "cpo", "obj-1", naming::CONTRIBUTOR_ROLE_ID, &scope())
            .await
            .unwrap();
        assert_eq!(outcome, AssignOutcome::Created);
    }

    #[tokio::test]
    async fn test_other_probe_error_is_surfaced() {
        let fake = Arc::new(FakeCloud::new());
        fake.fail_next("get_role_assignment", CloudError::api(500, None, "server"));
        let err = manager(&fake)
            .assign_role("abc", "cpo", "obj-1", naming::CONTRIBUTOR_ROLE_ID, &scope())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("check role assignment existence"));
        assert!(fake.calls_for("create_role_assignment").is_empty());
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let fake = Arc::new(FakeCloud::new());
        let rbac = manager(&fake);
        rbac.assign_role("abc", "cpo", "obj-1", naming::CONTRIBUTOR_ROLE_ID, &scope())
            .await
            .unwrap();
        let again = rbac
            .assign_role("abc", "cpo", "obj-1", naming::CONTRIBUTOR_ROLE_ID, &scope())
            .await
            .unwrap();
        assert_eq!(again, AssignOutcome::AlreadyAssigned);
        assert_eq!(fake.calls_for("create_role_assignment").len(), 1);
    }

    #[tokio::test]
    async fn test_principal_lookup_errors() {
        let fake = Arc::new(FakeCloud::new());
        fake.add_service_principal("dup", "obj-a");
        fake.add_service_principal("dup", "obj-b");
        let rbac = manager(&fake);
        let token = fake.get_directory_token().await.unwrap();

        let missing = rbac.principal_id(&token, "nobody").await.unwrap_err();
        assert_eq!(missing.to_string(), "no object id found for client id: nobody");

        let dup = rbac.principal_id(&token, "dup").await.unwrap_err();
        assert!(matches!(dup, InfraError::AmbiguousPrincipal(_)));
    }

    fn control_plane() -> ControlPlaneManagedIdentities {
        ControlPlaneManagedIdentities {
            control_plane_operator: ManagedIdentity::new("cpo-app"),
            image_registry: ManagedIdentity::new("ciro-app"),
            ingress: ManagedIdentity::new("ingress-app"),
            network: ManagedIdentity::new("cncc-app"),
            disk: ManagedIdentity::new("disk-app"),
            file: ManagedIdentity::new("file-app"),
            node_pool_management: ManagedIdentity::new("npm-app"),
            cloud_provider: ManagedIdentity::new("cp-app"),
        }
    }

    #[test]
    fn test_image_registry_capability_controls_ciro() {
        let ids = control_plane();
        let enabled = control_plane_components(&ids, true);
        let disabled = control_plane_components(&ids, false);
        assert_eq!(enabled.len(), 8);
        assert_eq!(disabled.len(), 7);
        assert!(!disabled.iter().any(|(c, _)| *c == RbacComponent::ImageRegistry));
    }

    #[test]
    fn test_workload_components_have_no_cpo() {
        let identities = WorkloadIdentities::default();
        let comps = workload_components(&identities, true);
        assert!(!comps.iter().any(|(c, _)| *c == RbacComponent::ControlPlaneOperator));
        assert_eq!(comps.len(), 7);
    }

    #[tokio::test]
    async fn test_assign_control_plane_roles_covers_every_scope() {
        let fake = Arc::new(FakeCloud::new());
        for app in [
            "cpo-app", "ciro-app", "ingress-app", "cncc-app", "disk-app", "file-app", "npm-app",
            "cp-app",
        ] {
            fake.add_service_principal(app, &format!("obj-{}", app));
        }
        let groups = ScopeGroups {
            main: "main".into(),
            nsg: "nsg".into(),
            vnet: "vnet".into(),
            dns_zone: "dns".into(),
        };
        let opts = RbacOptions {
            infra_id: "abc".into(),
            custom_roles: false,
            image_registry_enabled: true,
        };
        manager(&fake)
            .assign_control_plane_roles(&opts, &control_plane(), &groups)
            .await
            .unwrap();

        // cpo 3, npm 2, cp 3, file 3, disk 1, ingress 3, cncc 2, ciro 1
        assert_eq!(fake.role_assignments().len(), 18);
        assert_eq!(fake.calls_for("get_directory_token").len(), 1);
    }

    #[tokio::test]
    async fn test_assign_data_plane_roles_uses_dedicated_roles() {
        let fake = Arc::new(FakeCloud::new());
        fake.add_service_principal("dp-ciro", "obj-ciro");
        fake.add_service_principal("dp-disk", "obj-disk");
        fake.add_service_principal("dp-file", "obj-file");
        let identities = DataPlaneManagedIdentities {
            image_registry_client_id: "dp-ciro".into(),
            disk_client_id: "dp-disk".into(),
            file_client_id: "dp-file".into(),
        };
        let opts = RbacOptions {
            infra_id: "abc".into(),
            ..Default::default()
        };
        manager(&fake)
            .assign_data_plane_roles(&opts, &identities, "main-rg")
            .await
            .unwrap();

        let assignments = fake.role_assignments();
        assert_eq!(assignments.len(), 3);
        let disk = assignments
            .iter()
            .find(|ra| {
                ra.name.as_deref()
                    == Some(naming::role_assignment_name("abc", "azurediskWI", &scope()).as_str())
            })
            .unwrap();
        assert_eq!(
            disk.properties.as_ref().unwrap().role_definition_id.as_deref(),
            Some(naming::role_definition_id(FAKE_SUBSCRIPTION, naming::AZURE_DISK_ROLE_ID).as_str())
        );
    }
}
