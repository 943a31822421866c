//! In-memory [`CloudApi`] for tests
//!
//! `FakeCloud` keeps resource groups, network resources, identities,
//! federated credentials and role assignments in memory. Every call is
//! recorded as `"{operation} {target}"` so tests can assert on ordering, and
//! failures can be injected per operation.

use async_trait::async_trait;
use hcpinfra_cloud::model::{
    DnsZone, FederatedIdentityCredential, GenericResource, Identity, IdentityProperties,
    LoadBalancer, NetworkSecurityGroup, PrivateDnsZone, PublicIpAddress, ResourceGroup,
    RoleAssignment, RoleAssignmentCreate, ServicePrincipal, VirtualNetwork, VirtualNetworkLink,
};
use hcpinfra_cloud::{
    AccessToken, CloudApi, CloudError, Lro, Pager, PollOperation, PollStatus, Result,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub const FAKE_SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000001";

pub const NSG_TYPE: &str = "Microsoft.Network/networkSecurityGroups";
pub const VNET_TYPE: &str = "Microsoft.Network/virtualNetworks";
pub const PRIVATE_ZONE_TYPE: &str = "Microsoft.Network/privateDnsZones";
pub const ZONE_LINK_TYPE: &str = "Microsoft.Network/privateDnsZones/virtualNetworkLinks";
pub const PUBLIC_IP_TYPE: &str = "Microsoft.Network/publicIPAddresses";
pub const LOAD_BALANCER_TYPE: &str = "Microsoft.Network/loadBalancers";
pub const IDENTITY_TYPE: &str = "Microsoft.ManagedIdentity/userAssignedIdentities";

const POLL_INTERVAL: Duration = Duration::from_millis(1);

struct InjectedFailure {
    op: String,
    target: String,
    status: u16,
    code: Option<String>,
}

#[derive(Default)]
struct State {
    calls: Vec<String>,
    next_failures: HashMap<String, VecDeque<CloudError>>,
    persistent_failures: Vec<InjectedFailure>,
    pending_polls: u32,
    omit_principal: bool,
    groups: BTreeMap<String, ResourceGroup>,
    resources: Vec<GenericResource>,
    dns_zones: Vec<DnsZone>,
    load_balancers: BTreeMap<(String, String), LoadBalancer>,
    identities: BTreeMap<(String, String), Identity>,
    credentials: BTreeMap<(String, String, String), FederatedIdentityCredential>,
    role_assignments: Vec<RoleAssignment>,
    service_principals: Vec<ServicePrincipal>,
}

impl State {
    fn has_group(&self, name: &str) -> bool {
        self.groups.keys().any(|g| g.eq_ignore_ascii_case(name))
    }

    fn upsert_resource(&mut self, resource: GenericResource) {
        match self
            .resources
            .iter_mut()
            .find(|r| same_id(r.id.as_deref(), resource.id.as_deref()))
        {
            Some(existing) => *existing = resource,
            None => self.resources.push(resource),
        }
    }

    fn remove_resource(&mut self, id: &str) -> Option<GenericResource> {
        let index = self
            .resources
            .iter()
            .position(|r| same_id(r.id.as_deref(), Some(id)))?;
        let removed = self.resources.remove(index);

        // child records go with their parent
        let key_of = |rg: &str, name: &str| (rg.to_string(), name.to_string());
        if let (Some(rg), Some(name)) = (resource_group_segment(id), removed.name.clone()) {
            match removed.resource_type.as_deref() {
                Some(IDENTITY_TYPE) => {
                    self.identities.remove(&key_of(&rg, &name));
                    self.credentials.retain(|(r, i, _), _| !(r == &rg && i == &name));
                }
                Some(LOAD_BALANCER_TYPE) => {
                    self.load_balancers.remove(&key_of(&rg, &name));
                }
                _ => {}
            }
        }
        Some(removed)
    }
}

fn same_id(a: Option<&str>, b: Option<&str>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a.eq_ignore_ascii_case(b))
}

fn resource_group_segment(id: &str) -> Option<String> {
    let mut parts = id.split('/');
    while let Some(part) = parts.next() {
        if part.eq_ignore_ascii_case("resourceGroups") {
            return parts.next().map(str::to_string);
        }
    }
    None
}

fn group_not_found(name: &str) -> CloudError {
    CloudError::api(
        404,
        Some("ResourceGroupNotFound".into()),
        format!("Resource group '{}' could not be found.", name),
    )
}

/// Pending operation that completes after a fixed number of polls.
struct FakePoll<T> {
    remaining: u32,
    value: Option<T>,
}

#[async_trait]
impl<T: Send> PollOperation<T> for FakePoll<T> {
    async fn poll(&mut self) -> Result<PollStatus<T>> {
        if self.remaining > 0 {
            self.remaining -= 1;
            return Ok(PollStatus::InProgress { retry_after: None });
        }
        self.value
            .take()
            .map(PollStatus::Done)
            .ok_or_else(|| CloudError::MalformedResponse("operation polled after completion".into()))
    }

    fn describe(&self) -> String {
        String::from("fake operation")
    }
}

/// In-memory cloud bound to [`FAKE_SUBSCRIPTION`].
#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<State>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource_group(self, name: &str) -> Self {
        self.add_resource_group(name);
        self
    }

    /// Make every long-running operation report "in progress" `polls` times.
    pub fn with_pending_polls(self, polls: u32) -> Self {
        self.state().pending_polls = polls;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // --- Seeding ------------------------------------------------------------

    pub fn add_resource_group(&self, name: &str) {
        self.state().groups.insert(
            name.to_string(),
            ResourceGroup {
                id: Some(format!("/subscriptions/{}/resourceGroups/{}", FAKE_SUBSCRIPTION, name)),
                name: Some(name.to_string()),
                location: "eastus".to_string(),
                ..Default::default()
            },
        );
    }

    /// Public DNS zone visible to the subscription-wide listing.
    pub fn add_dns_zone(&self, resource_group: &str, name: &str) {
        self.state().dns_zones.push(DnsZone {
            id: Some(format!(
                "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/dnszones/{}",
                FAKE_SUBSCRIPTION, resource_group, name
            )),
            name: Some(name.to_string()),
        });
    }

    /// Arbitrary resource in a group, e.g. one the cluster does not own.
    /// Returns the resource id.
    pub fn add_resource(&self, resource_group: &str, resource_type: &str, name: &str) -> String {
        let id = resource_id(resource_group, resource_type, name);
        self.state().upsert_resource(GenericResource {
            id: Some(id.clone()),
            name: Some(name.to_string()),
            resource_type: Some(resource_type.to_string()),
            location: Some("eastus".to_string()),
        });
        id
    }

    pub fn add_service_principal(&self, app_id: &str, object_id: &str) {
        self.state().service_principals.push(ServicePrincipal {
            id: object_id.to_string(),
            app_id: Some(app_id.to_string()),
            display_name: None,
        });
    }

    pub fn seed_role_assignment(&self, assignment: RoleAssignment) {
        self.state().role_assignments.push(assignment);
    }

    // --- Failure injection --------------------------------------------------

    /// Fail the next call of `op`, whatever its target.
    pub fn fail_next(&self, op: &str, err: CloudError) {
        self.state()
            .next_failures
            .entry(op.to_string())
            .or_default()
            .push_back(err);
    }

    /// Fail every call of `op` on `target` with the given status.
    pub fn fail_on(&self, op: &str, target: &str, status: u16, code: Option<&str>) {
        self.state().persistent_failures.push(InjectedFailure {
            op: op.to_string(),
            target: target.to_string(),
            status,
            code: code.map(str::to_string),
        });
    }

    /// Return created identities without a principal id.
    pub fn omit_identity_principal(&self) {
        self.state().omit_principal = true;
    }

    // --- Inspection ---------------------------------------------------------

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn calls_for(&self, op: &str) -> Vec<String> {
        let prefix = format!("{} ", op);
        self.state()
            .calls
            .iter()
            .filter(|c| c.as_str() == op || c.starts_with(&prefix))
            .cloned()
            .collect()
    }

    pub fn resource_group(&self, name: &str) -> Option<ResourceGroup> {
        self.state()
            .groups
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, g)| g.clone())
    }

    /// Resources currently listed in `resource_group`.
    pub fn resources_in(&self, resource_group: &str) -> Vec<GenericResource> {
        self.state()
            .resources
            .iter()
            .filter(|r| {
                r.id.as_deref()
                    .and_then(resource_group_segment)
                    .is_some_and(|g| g.eq_ignore_ascii_case(resource_group))
            })
            .cloned()
            .collect()
    }

    pub fn has_identity(&self, resource_group: &str, name: &str) -> bool {
        self.state()
            .identities
            .contains_key(&(resource_group.to_string(), name.to_string()))
    }

    pub fn federated_credential(
        &self,
        resource_group: &str,
        identity: &str,
        name: &str,
    ) -> Option<FederatedIdentityCredential> {
        self.state()
            .credentials
            .get(&(resource_group.to_string(), identity.to_string(), name.to_string()))
            .cloned()
    }

    pub fn load_balancer(&self, resource_group: &str, name: &str) -> Option<LoadBalancer> {
        self.state()
            .load_balancers
            .get(&(resource_group.to_string(), name.to_string()))
            .cloned()
    }

    pub fn role_assignments(&self) -> Vec<RoleAssignment> {
        self.state().role_assignments.clone()
    }

    // --- Internals ----------------------------------------------------------

    /// Record the call and return an injected failure, if any.
    fn enter(&self, op: &str, target: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(if target.is_empty() {
            op.to_string()
        } else {
            format!("{} {}", op, target)
        });

        if let Some(err) = state.next_failures.get_mut(op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        if let Some(f) = state
            .persistent_failures
            .iter()
            .find(|f| f.op == op && f.target == target)
        {
            return Err(CloudError::api(f.status, f.code.clone(), "injected failure"));
        }
        Ok(())
    }

    fn require_group(&self, name: &str) -> Result<()> {
        if self.state().has_group(name) {
            Ok(())
        } else {
            Err(group_not_found(name))
        }
    }

    fn lro<T: Send + 'static>(&self, value: T) -> Lro<T> {
        let polls = self.state().pending_polls;
        if polls == 0 {
            Lro::ready(value)
        } else {
            Lro::pending(
                FakePoll {
                    remaining: polls,
                    value: Some(value),
                },
                POLL_INTERVAL,
            )
        }
    }

    fn track(&self, resource_group: &str, resource_type: &str, name: &str, location: Option<String>) -> String {
        let id = resource_id(resource_group, resource_type, name);
        self.state().upsert_resource(GenericResource {
            id: Some(id.clone()),
            name: Some(name.to_string()),
            resource_type: Some(resource_type.to_string()),
            location,
        });
        id
    }
}

fn resource_id(resource_group: &str, resource_type: &str, name: &str) -> String {
    // children are typed "Parent/child" and named "parent/child"
    let path = match (resource_type.split_once('/'), name.split_once('/')) {
        (Some((namespace, types)), Some((parent, child))) => match types.split_once('/') {
            Some((parent_type, child_type)) => {
                format!("{}/{}/{}/{}/{}", namespace, parent_type, parent, child_type, child)
            }
            None => format!("{}/{}", resource_type, name),
        },
        _ => format!("{}/{}", resource_type, name),
    };
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/{}",
        FAKE_SUBSCRIPTION, resource_group, path
    )
}

#[async_trait]
impl CloudApi for FakeCloud {
    fn subscription_id(&self) -> &str {
        FAKE_SUBSCRIPTION
    }

    async fn create_or_update_resource_group(
        &self,
        name: &str,
        group: &ResourceGroup,
    ) -> Result<ResourceGroup> {
        self.enter("create_or_update_resource_group", name)?;
        let stored = ResourceGroup {
            id: Some(format!("/subscriptions/{}/resourceGroups/{}", FAKE_SUBSCRIPTION, name)),
            name: Some(name.to_string()),
            location: group.location.clone(),
            tags: group.tags.clone(),
        };
        self.state().groups.insert(name.to_string(), stored.clone());
        Ok(stored)
    }

    async fn get_resource_group(&self, name: &str) -> Result<ResourceGroup> {
        self.enter("get_resource_group", name)?;
        self.resource_group(name).ok_or_else(|| group_not_found(name))
    }

    async fn begin_delete_resource_group(&self, name: &str) -> Result<Lro<()>> {
        self.enter("begin_delete_resource_group", name)?;
        {
            let mut state = self.state();
            let key = state
                .groups
                .keys()
                .find(|k| k.eq_ignore_ascii_case(name))
                .cloned()
                .ok_or_else(|| group_not_found(name))?;
            state.groups.remove(&key);
            state.resources.retain(|r| {
                !r.id
                    .as_deref()
                    .and_then(resource_group_segment)
                    .is_some_and(|g| g.eq_ignore_ascii_case(name))
            });
            state.identities.retain(|(rg, _), _| !rg.eq_ignore_ascii_case(name));
            state.credentials.retain(|(rg, _, _), _| !rg.eq_ignore_ascii_case(name));
            state.load_balancers.retain(|(rg, _), _| !rg.eq_ignore_ascii_case(name));
        }
        Ok(self.lro(()))
    }

    async fn check_resource_group_existence(&self, name: &str) -> Result<bool> {
        self.enter("check_resource_group_existence", name)?;
        Ok(self.state().has_group(name))
    }

    async fn begin_create_network_security_group(
        &self,
        resource_group: &str,
        name: &str,
        nsg: &NetworkSecurityGroup,
    ) -> Result<Lro<NetworkSecurityGroup>> {
        self.enter(
            "begin_create_network_security_group",
            &format!("{}/{}", resource_group, name),
        )?;
        self.require_group(resource_group)?;
        let id = self.track(resource_group, NSG_TYPE, name, nsg.location.clone());
        Ok(self.lro(NetworkSecurityGroup {
            id: Some(id),
            name: Some(name.to_string()),
            ..nsg.clone()
        }))
    }

    async fn begin_create_virtual_network(
        &self,
        resource_group: &str,
        name: &str,
        vnet: &VirtualNetwork,
    ) -> Result<Lro<VirtualNetwork>> {
        self.enter(
            "begin_create_virtual_network",
            &format!("{}/{}", resource_group, name),
        )?;
        self.require_group(resource_group)?;
        let id = self.track(resource_group, VNET_TYPE, name, vnet.location.clone());

        let mut created = VirtualNetwork {
            id: Some(id.clone()),
            name: Some(name.to_string()),
            ..vnet.clone()
        };
        for subnet in &mut created.properties.subnets {
            if subnet.id.is_none() {
                let subnet_name = subnet.name.clone().unwrap_or_else(|| "default".into());
                subnet.id = Some(format!("{}/subnets/{}", id, subnet_name));
                subnet.name = Some(subnet_name);
            } else if subnet.name.is_none() {
                subnet.name = subnet
                    .id
                    .as_deref()
                    .and_then(|i| i.rsplit('/').next())
                    .map(str::to_string);
            }
        }
        Ok(self.lro(created))
    }

    fn list_dns_zones(&self) -> Pager<DnsZone> {
        if let Err(err) = self.enter("list_dns_zones", "") {
            return Pager::from_error(err);
        }
        // one zone per page so callers have to walk every page
        let pages = self.state().dns_zones.iter().map(|z| vec![z.clone()]).collect();
        Pager::from_pages(pages)
    }

    async fn begin_create_private_dns_zone(
        &self,
        resource_group: &str,
        name: &str,
        zone: &PrivateDnsZone,
    ) -> Result<Lro<PrivateDnsZone>> {
        self.enter(
            "begin_create_private_dns_zone",
            &format!("{}/{}", resource_group, name),
        )?;
        self.require_group(resource_group)?;
        let id = self.track(resource_group, PRIVATE_ZONE_TYPE, name, Some(zone.location.clone()));
        Ok(self.lro(PrivateDnsZone {
            id: Some(id),
            name: Some(name.to_string()),
            location: zone.location.clone(),
        }))
    }

    async fn begin_create_virtual_network_link(
        &self,
        resource_group: &str,
        zone_name: &str,
        name: &str,
        link: &VirtualNetworkLink,
    ) -> Result<Lro<VirtualNetworkLink>> {
        self.enter(
            "begin_create_virtual_network_link",
            &format!("{}/{}/{}", resource_group, zone_name, name),
        )?;
        self.require_group(resource_group)?;
        let id = self.track(
            resource_group,
            ZONE_LINK_TYPE,
            &format!("{}/{}", zone_name, name),
            Some(link.location.clone()),
        );
        Ok(self.lro(VirtualNetworkLink {
            id: Some(id),
            name: Some(name.to_string()),
            ..link.clone()
        }))
    }

    async fn begin_create_public_ip_address(
        &self,
        resource_group: &str,
        name: &str,
        address: &PublicIpAddress,
    ) -> Result<Lro<PublicIpAddress>> {
        self.enter(
            "begin_create_public_ip_address",
            &format!("{}/{}", resource_group, name),
        )?;
        self.require_group(resource_group)?;
        let id = self.track(resource_group, PUBLIC_IP_TYPE, name, address.location.clone());
        let mut created = PublicIpAddress {
            id: Some(id),
            name: Some(name.to_string()),
            ..address.clone()
        };
        created.properties.ip_address = Some("20.0.0.1".into());
        Ok(self.lro(created))
    }

    async fn begin_create_load_balancer(
        &self,
        resource_group: &str,
        name: &str,
        lb: &LoadBalancer,
    ) -> Result<Lro<LoadBalancer>> {
        self.enter(
            "begin_create_load_balancer",
            &format!("{}/{}", resource_group, name),
        )?;
        self.require_group(resource_group)?;
        let id = self.track(resource_group, LOAD_BALANCER_TYPE, name, lb.location.clone());
        let created = LoadBalancer {
            id: Some(id),
            name: Some(name.to_string()),
            ..lb.clone()
        };
        self.state().load_balancers.insert(
            (resource_group.to_string(), name.to_string()),
            created.clone(),
        );
        Ok(self.lro(created))
    }

    async fn create_or_update_identity(
        &self,
        resource_group: &str,
        name: &str,
        identity: &Identity,
    ) -> Result<Identity> {
        self.enter(
            "create_or_update_identity",
            &format!("{}/{}", resource_group, name),
        )?;
        self.require_group(resource_group)?;
        let id = self.track(resource_group, IDENTITY_TYPE, name, Some(identity.location.clone()));

        let mut state = self.state();
        let key = (resource_group.to_string(), name.to_string());
        let client_id = format!("{}-client-id", name);
        let principal_id = format!("{}-principal-id", name);
        if !state.identities.contains_key(&key) {
            state.service_principals.push(ServicePrincipal {
                id: principal_id.clone(),
                app_id: Some(client_id.clone()),
                display_name: Some(name.to_string()),
            });
        }
        let created = Identity {
            id: Some(id),
            name: Some(name.to_string()),
            location: identity.location.clone(),
            tags: identity.tags.clone(),
            properties: Some(IdentityProperties {
                client_id: Some(client_id),
                principal_id: (!state.omit_principal).then_some(principal_id),
                tenant_id: Some("fake-tenant".into()),
            }),
        };
        state.identities.insert(key, created.clone());
        Ok(created)
    }

    async fn delete_identity(&self, resource_group: &str, name: &str) -> Result<()> {
        self.enter("delete_identity", &format!("{}/{}", resource_group, name))?;
        let mut state = self.state();
        if !state
            .identities
            .contains_key(&(resource_group.to_string(), name.to_string()))
        {
            return Err(CloudError::not_found(format!("identity '{}' not found", name)));
        }
        state.remove_resource(&resource_id(resource_group, IDENTITY_TYPE, name));
        Ok(())
    }

    async fn create_or_update_federated_credential(
        &self,
        resource_group: &str,
        identity_name: &str,
        name: &str,
        credential: &FederatedIdentityCredential,
    ) -> Result<FederatedIdentityCredential> {
        self.enter(
            "create_or_update_federated_credential",
            &format!("{}/{}/{}", resource_group, identity_name, name),
        )?;
        let mut state = self.state();
        if !state
            .identities
            .contains_key(&(resource_group.to_string(), identity_name.to_string()))
        {
            return Err(CloudError::not_found(format!(
                "identity '{}' not found",
                identity_name
            )));
        }
        let created = FederatedIdentityCredential {
            id: Some(format!(
                "{}/federatedIdentityCredentials/{}",
                resource_id(resource_group, IDENTITY_TYPE, identity_name),
                name
            )),
            name: Some(name.to_string()),
            properties: credential.properties.clone(),
        };
        state.credentials.insert(
            (
                resource_group.to_string(),
                identity_name.to_string(),
                name.to_string(),
            ),
            created.clone(),
        );
        Ok(created)
    }

    async fn delete_federated_credential(
        &self,
        resource_group: &str,
        identity_name: &str,
        name: &str,
    ) -> Result<()> {
        self.enter(
            "delete_federated_credential",
            &format!("{}/{}/{}", resource_group, identity_name, name),
        )?;
        self.state()
            .credentials
            .remove(&(
                resource_group.to_string(),
                identity_name.to_string(),
                name.to_string(),
            ))
            .map(|_| ())
            .ok_or_else(|| CloudError::not_found(format!("credential '{}' not found", name)))
    }

    fn list_role_assignments_for_scope(
        &self,
        scope: &str,
        filter: Option<&str>,
    ) -> Pager<RoleAssignment> {
        if let Err(err) = self.enter("list_role_assignments_for_scope", scope) {
            return Pager::from_error(err);
        }
        let at_scope_only = filter == Some("atScope()");
        let wanted = scope.to_ascii_lowercase();
        let matches: Vec<RoleAssignment> = self
            .state()
            .role_assignments
            .iter()
            .filter(|ra| {
                let Some(ra_scope) = ra.properties.as_ref().and_then(|p| p.scope.as_deref())
                else {
                    return false;
                };
                let ra_scope = ra_scope.to_ascii_lowercase();
                ra_scope == wanted
                    || (!at_scope_only && wanted.starts_with(&format!("{}/", ra_scope)))
            })
            .cloned()
            .collect();
        Pager::from_pages(matches.chunks(2).map(<[RoleAssignment]>::to_vec).collect())
    }

    async fn get_role_assignment(&self, scope: &str, name: &str) -> Result<RoleAssignment> {
        self.enter("get_role_assignment", &format!("{}/{}", scope, name))?;
        self.state()
            .role_assignments
            .iter()
            .find(|ra| {
                ra.name.as_deref() == Some(name)
                    && ra
                        .properties
                        .as_ref()
                        .and_then(|p| p.scope.as_deref())
                        .is_some_and(|s| s.eq_ignore_ascii_case(scope))
            })
            .cloned()
            .ok_or_else(|| {
                CloudError::api(
                    404,
                    Some("RoleAssignmentNotFound".into()),
                    format!("role assignment '{}' not found", name),
                )
            })
    }

    async fn create_role_assignment(
        &self,
        scope: &str,
        name: &str,
        assignment: &RoleAssignmentCreate,
    ) -> Result<RoleAssignment> {
        self.enter("create_role_assignment", &format!("{}/{}", scope, name))?;
        let mut properties = assignment.properties.clone();
        properties.scope = Some(scope.to_string());
        let created = RoleAssignment {
            id: Some(format!(
                "{}/providers/Microsoft.Authorization/roleAssignments/{}",
                scope, name
            )),
            name: Some(name.to_string()),
            properties: Some(properties),
        };

        let mut state = self.state();
        match state
            .role_assignments
            .iter_mut()
            .find(|ra| same_id(ra.id.as_deref(), created.id.as_deref()))
        {
            Some(existing) => *existing = created.clone(),
            None => state.role_assignments.push(created.clone()),
        }
        Ok(created)
    }

    fn list_resources_by_resource_group(&self, resource_group: &str) -> Pager<GenericResource> {
        if let Err(err) = self.enter("list_resources_by_resource_group", resource_group) {
            return Pager::from_error(err);
        }
        if !self.state().has_group(resource_group) {
            return Pager::from_error(group_not_found(resource_group));
        }
        let items = self.resources_in(resource_group);
        Pager::from_pages(items.chunks(2).map(<[GenericResource]>::to_vec).collect())
    }

    async fn begin_delete_resource_by_id(
        &self,
        resource_id: &str,
        api_version: &str,
    ) -> Result<Lro<()>> {
        self.enter(
            "begin_delete_resource_by_id",
            &format!("{}?api-version={}", resource_id, api_version),
        )?;
        self.state()
            .remove_resource(resource_id)
            .ok_or_else(|| CloudError::not_found(format!("resource '{}' not found", resource_id)))?;
        Ok(self.lro(()))
    }

    async fn get_directory_token(&self) -> Result<AccessToken> {
        self.enter("get_directory_token", "")?;
        Ok(AccessToken::new(
            "fake-directory-token",
            chrono::Utc::now() + chrono::Duration::hours(1),
        ))
    }

    async fn list_service_principals_by_app_id(
        &self,
        _token: &AccessToken,
        app_id: &str,
    ) -> Result<Vec<ServicePrincipal>> {
        self.enter("list_service_principals_by_app_id", app_id)?;
        Ok(self
            .state()
            .service_principals
            .iter()
            .filter(|sp| sp.app_id.as_deref() == Some(app_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hcpinfra_cloud::CancellationToken;

    #[test]
    fn test_child_resource_id() {
        assert_eq!(
            resource_id("rg", ZONE_LINK_TYPE, "zone.example.com/link"),
            format!(
                "/subscriptions/{}/resourceGroups/rg/providers/Microsoft.Network/privateDnsZones/zone.example.com/virtualNetworkLinks/link",
                FAKE_SUBSCRIPTION
            )
        );
    }

    #[tokio::test]
    async fn test_pending_lro_completes() {
        let fake = FakeCloud::new().with_resource_group("rg").with_pending_polls(3);
        let lro = fake
            .begin_create_network_security_group("rg", "nsg", &NetworkSecurityGroup::default())
            .await
            .unwrap();
        assert!(!lro.is_done());
        let nsg = lro.poll_until_done(&CancellationToken::new()).await.unwrap();
        assert_eq!(nsg.name.as_deref(), Some("nsg"));
    }

    #[tokio::test]
    async fn test_fail_next_is_consumed_once() {
        let fake = FakeCloud::new();
        fake.fail_next("get_resource_group", CloudError::api(500, None, "boom"));
        fake.add_resource_group("rg");
        assert!(fake.get_resource_group("rg").await.is_err());
        assert!(fake.get_resource_group("rg").await.is_ok());
        assert_eq!(fake.calls_for("get_resource_group").len(), 2);
    }

    #[tokio::test]
    async fn test_group_delete_drops_contents() {
        let fake = FakeCloud::new().with_resource_group("rg");
        fake.add_resource("rg", PUBLIC_IP_TYPE, "pip");
        let lro = fake.begin_delete_resource_group("rg").await.unwrap();
        lro.poll_until_done(&CancellationToken::new()).await.unwrap();
        assert!(fake.resources_in("rg").is_empty());
        assert!(fake.begin_delete_resource_group("rg").await.unwrap_err().is_not_found());
    }
}
