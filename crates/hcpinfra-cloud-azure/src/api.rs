//! `CloudApi` implementation over the Resource Manager and directory REST APIs

use crate::client::{AzureClient, ListResult, error_for_status};
use async_trait::async_trait;
use hcpinfra_cloud::model::{
    DnsZone, FederatedIdentityCredential, GenericResource, Identity, LoadBalancer,
    NetworkSecurityGroup, PrivateDnsZone, PublicIpAddress, ResourceGroup, RoleAssignment,
    RoleAssignmentCreate, ServicePrincipal, VirtualNetwork, VirtualNetworkLink,
};
use hcpinfra_cloud::{AccessToken, CloudApi, Lro, Pager, Result};
use reqwest::{Method, StatusCode};
use tracing::{debug, instrument};

pub const RESOURCES_API_VERSION: &str = "2021-04-01";
pub const NETWORK_API_VERSION: &str = "2023-11-01";
pub const DNS_API_VERSION: &str = "2018-05-01";
pub const PRIVATE_DNS_API_VERSION: &str = "2020-06-01";
pub const MSI_API_VERSION: &str = "2023-01-31";
pub const AUTHORIZATION_API_VERSION: &str = "2022-04-01";

impl AzureClient {
    fn resource_group_path(&self, name: &str) -> String {
        format!(
            "/subscriptions/{}/resourcegroups/{}",
            self.subscription_id, name
        )
    }

    fn provider_path(&self, resource_group: &str, provider: &str, rest: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{}/{}",
            self.subscription_id, resource_group, provider, rest
        )
    }

    fn network_path(&self, resource_group: &str, rest: &str) -> String {
        self.provider_path(resource_group, "Microsoft.Network", rest)
    }

    fn identity_path(&self, resource_group: &str, rest: &str) -> String {
        self.provider_path(
            resource_group,
            "Microsoft.ManagedIdentity",
            &format!("userAssignedIdentities/{}", rest),
        )
    }

    fn role_assignment_path(scope: &str, name: &str) -> String {
        format!(
            "{}/providers/Microsoft.Authorization/roleAssignments/{}",
            scope.trim_end_matches('/'),
            name
        )
    }
}

#[async_trait]
impl CloudApi for AzureClient {
    fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    #[instrument(skip(self, group), fields(subscription = %self.subscription_id))]
    async fn create_or_update_resource_group(
        &self,
        name: &str,
        group: &ResourceGroup,
    ) -> Result<ResourceGroup> {
        let url = self.arm_url(&self.resource_group_path(name), RESOURCES_API_VERSION)?;
        Ok(self.put_json(url, group).await?)
    }

    async fn get_resource_group(&self, name: &str) -> Result<ResourceGroup> {
        let url = self.arm_url(&self.resource_group_path(name), RESOURCES_API_VERSION)?;
        Ok(self.get_json(url).await?)
    }

    #[instrument(skip(self), fields(subscription = %self.subscription_id))]
    async fn begin_delete_resource_group(&self, name: &str) -> Result<Lro<()>> {
        let url = self.arm_url(&self.resource_group_path(name), RESOURCES_API_VERSION)?;
        Ok(self.begin_delete(url).await?)
    }

    async fn check_resource_group_existence(&self, name: &str) -> Result<bool> {
        let url = self.arm_url(&self.resource_group_path(name), RESOURCES_API_VERSION)?;
        let response = self.send::<()>(Method::HEAD, url, None).await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => {
                error_for_status(response).await?;
                Ok(false)
            }
        }
    }

    #[instrument(skip(self, nsg))]
    async fn begin_create_network_security_group(
        &self,
        resource_group: &str,
        name: &str,
        nsg: &NetworkSecurityGroup,
    ) -> Result<Lro<NetworkSecurityGroup>> {
        let path = self.network_path(resource_group, &format!("networkSecurityGroups/{}", name));
        let url = self.arm_url(&path, NETWORK_API_VERSION)?;
        Ok(self.begin_put(url, nsg).await?)
    }

    #[instrument(skip(self, vnet))]
    async fn begin_create_virtual_network(
        &self,
        resource_group: &str,
        name: &str,
        vnet: &VirtualNetwork,
    ) -> Result<Lro<VirtualNetwork>> {
        let path = self.network_path(resource_group, &format!("virtualNetworks/{}", name));
        let url = self.arm_url(&path, NETWORK_API_VERSION)?;
        Ok(self.begin_put(url, vnet).await?)
    }

    fn list_dns_zones(&self) -> Pager<DnsZone> {
        let path = format!(
            "/subscriptions/{}/providers/Microsoft.Network/dnszones",
            self.subscription_id
        );
        self.pages(self.arm_url(&path, DNS_API_VERSION))
    }

    #[instrument(skip(self, zone))]
    async fn begin_create_private_dns_zone(
        &self,
        resource_group: &str,
        name: &str,
        zone: &PrivateDnsZone,
    ) -> Result<Lro<PrivateDnsZone>> {
        let path = self.network_path(resource_group, &format!("privateDnsZones/{}", name));
        let url = self.arm_url(&path, PRIVATE_DNS_API_VERSION)?;
        Ok(self.begin_put(url, zone).await?)
    }

    #[instrument(skip(self, link))]
    async fn begin_create_virtual_network_link(
        &self,
        resource_group: &str,
        zone_name: &str,
        name: &str,
        link: &VirtualNetworkLink,
    ) -> Result<Lro<VirtualNetworkLink>> {
        let path = self.network_path(
            resource_group,
            &format!("privateDnsZones/{}/virtualNetworkLinks/{}", zone_name, name),
        );
        let url = self.arm_url(&path, PRIVATE_DNS_API_VERSION)?;
        Ok(self.begin_put(url, link).await?)
    }

    #[instrument(skip(self, address))]
    async fn begin_create_public_ip_address(
        &self,
        resource_group: &str,
        name: &str,
        address: &PublicIpAddress,
    ) -> Result<Lro<PublicIpAddress>> {
        let path = self.network_path(resource_group, &format!("publicIPAddresses/{}", name));
        let url = self.arm_url(&path, NETWORK_API_VERSION)?;
        Ok(self.begin_put(url, address).await?)
    }

    #[instrument(skip(self, lb))]
    async fn begin_create_load_balancer(
        &self,
        resource_group: &str,
        name: &str,
        lb: &LoadBalancer,
    ) -> Result<Lro<LoadBalancer>> {
        let path = self.network_path(resource_group, &format!("loadBalancers/{}", name));
        let url = self.arm_url(&path, NETWORK_API_VERSION)?;
        Ok(self.begin_put(url, lb).await?)
    }

    #[instrument(skip(self, identity))]
    async fn create_or_update_identity(
        &self,
        resource_group: &str,
        name: &str,
        identity: &Identity,
    ) -> Result<Identity> {
        let url = self.arm_url(&self.identity_path(resource_group, name), MSI_API_VERSION)?;
        Ok(self.put_json(url, identity).await?)
    }

    #[instrument(skip(self))]
    async fn delete_identity(&self, resource_group: &str, name: &str) -> Result<()> {
        let url = self.arm_url(&self.identity_path(resource_group, name), MSI_API_VERSION)?;
        Ok(self.delete(url).await?)
    }

    #[instrument(skip(self, credential))]
    async fn create_or_update_federated_credential(
        &self,
        resource_group: &str,
        identity_name: &str,
        name: &str,
        credential: &FederatedIdentityCredential,
    ) -> Result<FederatedIdentityCredential> {
        let rest = format!("{}/federatedIdentityCredentials/{}", identity_name, name);
        let url = self.arm_url(&self.identity_path(resource_group, &rest), MSI_API_VERSION)?;
        Ok(self.put_json(url, credential).await?)
    }

    #[instrument(skip(self))]
    async fn delete_federated_credential(
        &self,
        resource_group: &str,
        identity_name: &str,
        name: &str,
    ) -> Result<()> {
        let rest = format!("{}/federatedIdentityCredentials/{}", identity_name, name);
        let url = self.arm_url(&self.identity_path(resource_group, &rest), MSI_API_VERSION)?;
        Ok(self.delete(url).await?)
    }

    fn list_role_assignments_for_scope(
        &self,
        scope: &str,
        filter: Option<&str>,
    ) -> Pager<RoleAssignment> {
        let path = format!(
            "{}/providers/Microsoft.Authorization/roleAssignments",
            scope.trim_end_matches('/')
        );
        let url = self.arm_url(&path, AUTHORIZATION_API_VERSION).map(|mut url| {
            if let Some(filter) = filter {
                url.query_pairs_mut().append_pair("$filter", filter);
            }
            url
        });
        self.pages(url)
    }

    async fn get_role_assignment(&self, scope: &str, name: &str) -> Result<RoleAssignment> {
        let url = self.arm_url(
            &Self::role_assignment_path(scope, name),
            AUTHORIZATION_API_VERSION,
        )?;
        Ok(self.get_json(url).await?)
    }

    #[instrument(skip(self, assignment))]
    async fn create_role_assignment(
        &self,
        scope: &str,
        name: &str,
        assignment: &RoleAssignmentCreate,
    ) -> Result<RoleAssignment> {
        let url = self.arm_url(
            &Self::role_assignment_path(scope, name),
            AUTHORIZATION_API_VERSION,
        )?;
        Ok(self.put_json(url, assignment).await?)
    }

    fn list_resources_by_resource_group(&self, resource_group: &str) -> Pager<GenericResource> {
        let path = format!(
            "/subscriptions/{}/resourceGroups/{}/resources",
            self.subscription_id, resource_group
        );
        self.pages(self.arm_url(&path, RESOURCES_API_VERSION))
    }

    #[instrument(skip(self))]
    async fn begin_delete_resource_by_id(
        &self,
        resource_id: &str,
        api_version: &str,
    ) -> Result<Lro<()>> {
        let url = self.arm_url(resource_id, api_version)?;
        Ok(self.begin_delete(url).await?)
    }

    async fn get_directory_token(&self) -> Result<AccessToken> {
        self.credential.get_token(&self.cloud.graph_scope()).await
    }

    #[instrument(skip(self, token))]
    async fn list_service_principals_by_app_id(
        &self,
        token: &AccessToken,
        app_id: &str,
    ) -> Result<Vec<ServicePrincipal>> {
        let mut url = self.graph_url("/v1.0/servicePrincipals")?;
        // The directory expects %20 for spaces, never `+`.
        let filter = format!("appId eq '{}'", app_id).replace(' ', "%20");
        url.set_query(Some(&format!("$filter={}", filter)));
        debug!(url = %url, "Directory request");

        let response = self
            .http
            .get(url)
            .bearer_auth(&token.token)
            .send()
            .await
            .map_err(crate::AzureError::from)?;
        let response = error_for_status(response).await?;
        let page: ListResult<ServicePrincipal> = response
            .json()
            .await
            .map_err(crate::AzureError::from)?;
        Ok(page.value)
    }
}
