//! Cloud API trait definition

use crate::auth::AccessToken;
use crate::error::Result;
use crate::lro::Lro;
use crate::model::{
    DnsZone, FederatedIdentityCredential, GenericResource, Identity, LoadBalancer,
    NetworkSecurityGroup, PrivateDnsZone, PublicIpAddress, ResourceGroup, RoleAssignment,
    RoleAssignmentCreate, ServicePrincipal, VirtualNetwork, VirtualNetworkLink,
};
use crate::pager::Pager;
use async_trait::async_trait;

/// Resource-management surface used by the provisioning engines
///
/// One implementation talks to the real service; tests substitute an
/// in-memory fake. Every instance is bound to a single subscription and
/// credential. Mutations that the service runs asynchronously return an
/// [`Lro`] handle which the caller drives with `poll_until_done`.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Subscription every call is scoped to.
    fn subscription_id(&self) -> &str;

    // --- Resource groups ----------------------------------------------------

    async fn create_or_update_resource_group(
        &self,
        name: &str,
        group: &ResourceGroup,
    ) -> Result<ResourceGroup>;

    async fn get_resource_group(&self, name: &str) -> Result<ResourceGroup>;

    async fn begin_delete_resource_group(&self, name: &str) -> Result<Lro<()>>;

    /// `Ok(false)` when the group does not exist.
    async fn check_resource_group_existence(&self, name: &str) -> Result<bool>;

    // --- Network ------------------------------------------------------------

    async fn begin_create_network_security_group(
        &self,
        resource_group: &str,
        name: &str,
        nsg: &NetworkSecurityGroup,
    ) -> Result<Lro<NetworkSecurityGroup>>;

    async fn begin_create_virtual_network(
        &self,
        resource_group: &str,
        name: &str,
        vnet: &VirtualNetwork,
    ) -> Result<Lro<VirtualNetwork>>;

    /// Public DNS zones across the whole subscription.
    fn list_dns_zones(&self) -> Pager<DnsZone>;

    async fn begin_create_private_dns_zone(
        &self,
        resource_group: &str,
        name: &str,
        zone: &PrivateDnsZone,
    ) -> Result<Lro<PrivateDnsZone>>;

    async fn begin_create_virtual_network_link(
        &self,
        resource_group: &str,
        zone_name: &str,
        name: &str,
        link: &VirtualNetworkLink,
    ) -> Result<Lro<VirtualNetworkLink>>;

    async fn begin_create_public_ip_address(
        &self,
        resource_group: &str,
        name: &str,
        address: &PublicIpAddress,
    ) -> Result<Lro<PublicIpAddress>>;

    async fn begin_create_load_balancer(
        &self,
        resource_group: &str,
        name: &str,
        lb: &LoadBalancer,
    ) -> Result<Lro<LoadBalancer>>;

    // --- Managed identities -------------------------------------------------

    async fn create_or_update_identity(
        &self,
        resource_group: &str,
        name: &str,
        identity: &Identity,
    ) -> Result<Identity>;

    async fn delete_identity(&self, resource_group: &str, name: &str) -> Result<()>;

    async fn create_or_update_federated_credential(
        &self,
        resource_group: &str,
        identity_name: &str,
        name: &str,
        credential: &FederatedIdentityCredential,
    ) -> Result<FederatedIdentityCredential>;

    async fn delete_federated_credential(
        &self,
        resource_group: &str,
        identity_name: &str,
        name: &str,
    ) -> Result<()>;

    // --- Role assignments ---------------------------------------------------

    /// Assignments visible at `scope`, optionally narrowed by an OData filter
    /// such as `atScope()`.
    fn list_role_assignments_for_scope(
        &self,
        scope: &str,
        filter: Option<&str>,
    ) -> Pager<RoleAssignment>;

    async fn get_role_assignment(&self, scope: &str, name: &str) -> Result<RoleAssignment>;

    async fn create_role_assignment(
        &self,
        scope: &str,
        name: &str,
        assignment: &RoleAssignmentCreate,
    ) -> Result<RoleAssignment>;

    // --- Generic resources --------------------------------------------------

    fn list_resources_by_resource_group(&self, resource_group: &str) -> Pager<GenericResource>;

    async fn begin_delete_resource_by_id(
        &self,
        resource_id: &str,
        api_version: &str,
    ) -> Result<Lro<()>>;

    // --- Directory ----------------------------------------------------------

    /// Fresh token for the directory API.
    async fn get_directory_token(&self) -> Result<AccessToken>;

    /// Service principals whose `appId` equals `app_id`. Only the first page
    /// is returned.
    async fn list_service_principals_by_app_id(
        &self,
        token: &AccessToken,
        app_id: &str,
    ) -> Result<Vec<ServicePrincipal>>;
}
