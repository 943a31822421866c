//! Network resources: NSG, VNet, private DNS, public IP and egress load balancer
//!
//! The `new_*` functions build request bodies and do no I/O. The
//! [`NetworkBuilder`] methods send them and wait for the long-running
//! operation to finish before returning.

use crate::ensure_active;
use crate::error::{InfraError, Result, StepContext};
use crate::naming;
use hcpinfra_cloud::model::{
    AddressSpace, BackendAddressPool, FrontendIpConfiguration, FrontendIpConfigurationProperties,
    LoadBalancer, LoadBalancerProperties, NetworkSecurityGroup, OutboundRule,
    OutboundRuleProperties, PrivateDnsZone, Probe, ProbeProperties, PublicIpAddress,
    PublicIpAddressProperties, Sku, SubResource, Subnet, SubnetProperties, VirtualNetwork,
    VirtualNetworkLink, VirtualNetworkLinkProperties, VirtualNetworkProperties,
};
use hcpinfra_cloud::{CancellationToken, CloudApi};
use std::sync::Arc;
use tracing::{info, instrument};

pub const VIRTUAL_NETWORK_ADDRESS_PREFIX: &str = "10.0.0.0/16";
pub const VIRTUAL_NETWORK_SUBNET_ADDRESS_PREFIX: &str = "10.0.0.0/24";
pub const DEFAULT_SUBNET_NAME: &str = "default";
/// Private DNS zones and their links are global resources.
pub const GLOBAL_LOCATION: &str = "global";

pub const HEALTH_PROBE_PORT: u16 = 30595;
pub const HEALTH_PROBE_PATH: &str = "/healthz";
const HEALTH_PROBE_INTERVAL_SECONDS: u32 = 5;
const HEALTH_PROBE_THRESHOLD: u32 = 2;
const OUTBOUND_PORTS: u32 = 1024;
const IDLE_TIMEOUT_MINUTES: u32 = 4;

pub fn new_security_group(location: &str) -> NetworkSecurityGroup {
    NetworkSecurityGroup {
        location: Some(location.to_string()),
        ..Default::default()
    }
}

/// VNet body with the address space set and no subnets yet.
pub fn new_virtual_network(location: &str, address_prefix: &str) -> VirtualNetwork {
    VirtualNetwork {
        location: Some(location.to_string()),
        properties: VirtualNetworkProperties {
            address_space: Some(AddressSpace {
                address_prefixes: vec![address_prefix.to_string()],
            }),
            subnets: Vec::new(),
        },
        ..Default::default()
    }
}

/// Subnet entry for a new VNet: a reference to `subnet_id` when given,
/// otherwise the default subnet bound to `security_group_id`.
pub fn new_subnet(subnet_id: Option<&str>, security_group_id: &str) -> Subnet {
    match subnet_id {
        Some(id) => Subnet {
            id: Some(id.to_string()),
            ..Default::default()
        },
        None => Subnet {
            name: Some(DEFAULT_SUBNET_NAME.to_string()),
            properties: Some(SubnetProperties {
                address_prefix: Some(VIRTUAL_NETWORK_SUBNET_ADDRESS_PREFIX.to_string()),
                network_security_group: Some(SubResource::new(security_group_id)),
            }),
            ..Default::default()
        },
    }
}

pub fn new_private_dns_zone() -> PrivateDnsZone {
    PrivateDnsZone {
        location: GLOBAL_LOCATION.to_string(),
        ..Default::default()
    }
}

pub fn new_virtual_network_link(
    location: &str,
    vnet_id: &str,
    registration_enabled: bool,
) -> VirtualNetworkLink {
    VirtualNetworkLink {
        location: location.to_string(),
        properties: VirtualNetworkLinkProperties {
            virtual_network: Some(SubResource::new(vnet_id)),
            registration_enabled,
        },
        ..Default::default()
    }
}

/// Static IPv4 Standard-SKU address for the egress load balancer.
pub fn new_public_ip_address(name: &str, location: &str) -> PublicIpAddress {
    PublicIpAddress {
        name: Some(name.to_string()),
        location: Some(location.to_string()),
        sku: Some(Sku::standard()),
        properties: PublicIpAddressProperties {
            allocation_method: Some("Static".to_string()),
            address_version: Some("IPv4".to_string()),
            idle_timeout_in_minutes: Some(IDLE_TIMEOUT_MINUTES),
            ip_address: None,
        },
        ..Default::default()
    }
}

/// `subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.Network/loadBalancers`
///
/// No leading slash; the outbound-rule references add it.
pub fn load_balancer_id_prefix(subscription_id: &str, resource_group: &str) -> String {
    format!(
        "subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/loadBalancers",
        subscription_id, resource_group
    )
}

fn new_outbound_rule(name: &str, id_prefix: &str, load_balancer_name: &str, infra_id: &str) -> OutboundRule {
    OutboundRule {
        id: None,
        name: name.to_string(),
        properties: OutboundRuleProperties {
            backend_address_pool: SubResource::new(format!(
                "/{}/{}/backendAddressPools/{}",
                id_prefix, load_balancer_name, infra_id
            )),
            frontend_ip_configurations: vec![SubResource::new(format!(
                "/{}/{}/frontendIPConfigurations/{}",
                id_prefix, load_balancer_name, infra_id
            ))],
            protocol: "All".to_string(),
            allocated_outbound_ports: OUTBOUND_PORTS,
            enable_tcp_reset: true,
            idle_timeout_in_minutes: IDLE_TIMEOUT_MINUTES,
        },
    }
}

/// Egress load balancer: one frontend on `public_ip`, one backend pool, one
/// health probe and one outbound rule, all named after the infra id.
pub fn new_load_balancer(
    location: &str,
    infra_id: &str,
    id_prefix: &str,
    load_balancer_name: &str,
    public_ip: &PublicIpAddress,
) -> LoadBalancer {
    LoadBalancer {
        location: Some(location.to_string()),
        sku: Some(Sku::standard()),
        properties: LoadBalancerProperties {
            frontend_ip_configurations: vec![FrontendIpConfiguration {
                id: None,
                name: infra_id.to_string(),
                properties: FrontendIpConfigurationProperties {
                    private_ip_allocation_method: Some("Dynamic".to_string()),
                    public_ip_address: public_ip.id.clone().map(SubResource::new),
                },
            }],
            backend_address_pools: vec![BackendAddressPool {
                id: None,
                name: infra_id.to_string(),
            }],
            probes: vec![Probe {
                id: None,
                name: infra_id.to_string(),
                properties: ProbeProperties {
                    protocol: "Http".to_string(),
                    port: HEALTH_PROBE_PORT,
                    request_path: Some(HEALTH_PROBE_PATH.to_string()),
                    interval_in_seconds: HEALTH_PROBE_INTERVAL_SECONDS,
                    probe_threshold: HEALTH_PROBE_THRESHOLD,
                },
            }],
            outbound_rules: vec![new_outbound_rule(
                infra_id,
                id_prefix,
                load_balancer_name,
                infra_id,
            )],
        },
        ..Default::default()
    }
}

/// Ids of a created virtual network and its first subnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedVirtualNetwork {
    pub id: String,
    pub name: String,
    pub subnet_id: String,
    pub subnet_name: String,
}

/// Check the fields later steps rely on.
fn verify_virtual_network(vnet: &VirtualNetwork) -> Result<CreatedVirtualNetwork> {
    let (Some(id), Some(name)) = (&vnet.id, &vnet.name) else {
        return Err(InfraError::malformed("created vnet has no ID or name"));
    };
    let Some(subnet) = vnet.properties.subnets.first() else {
        return Err(InfraError::malformed("created vnet has no subnets"));
    };
    let (Some(subnet_id), Some(subnet_name)) = (&subnet.id, &subnet.name) else {
        return Err(InfraError::malformed("created vnet has no subnet ID or name"));
    };
    Ok(CreatedVirtualNetwork {
        id: id.clone(),
        name: name.clone(),
        subnet_id: subnet_id.clone(),
        subnet_name: subnet_name.clone(),
    })
}

pub struct NetworkBuilder {
    cloud: Arc<dyn CloudApi>,
    cancel: CancellationToken,
}

impl NetworkBuilder {
    pub fn new(cloud: Arc<dyn CloudApi>, cancel: CancellationToken) -> Self {
        Self { cloud, cancel }
    }

    /// Resource id of the public DNS zone named exactly `base_domain`.
    #[instrument(skip(self))]
    pub async fn get_base_domain_id(&self, base_domain: &str) -> Result<String> {
        ensure_active(&self.cancel)?;
        let mut pager = self.cloud.list_dns_zones();
        while let Some(page) = pager
            .next_page()
            .await
            .step("retrieve list of DNS zones")?
        {
            if let Some(id) = page
                .into_iter()
                .find(|zone| zone.name.as_deref() == Some(base_domain))
                .and_then(|zone| zone.id)
            {
                return Ok(id);
            }
        }
        Err(InfraError::validation(format!(
            "could not find any DNS zones in subscription matching base domain '{}'",
            base_domain
        )))
    }

    /// Create `{name}-{infra_id}-nsg`, returning its id.
    #[instrument(skip(self))]
    pub async fn create_security_group(
        &self,
        resource_group: &str,
        name: &str,
        infra_id: &str,
        location: &str,
    ) -> Result<String> {
        ensure_active(&self.cancel)?;
        let nsg_name = naming::security_group_name(name, infra_id);
        let nsg = self
            .cloud
            .begin_create_network_security_group(resource_group, &nsg_name, &new_security_group(location))
            .await
            .step("create network security group")?
            .poll_until_done(&self.cancel)
            .await
            .step("get network security group creation result")?;

        let id = nsg
            .id
            .ok_or_else(|| InfraError::malformed("created network security group has no ID"))?;
        info!(id = %id, "Successfully created network security group");
        Ok(id)
    }

    /// Create `{name}-{infra_id}` with either the given subnet or a default one.
    #[instrument(skip(self))]
    pub async fn create_virtual_network(
        &self,
        resource_group: &str,
        name: &str,
        infra_id: &str,
        location: &str,
        subnet_id: Option<&str>,
        security_group_id: &str,
    ) -> Result<CreatedVirtualNetwork> {
        ensure_active(&self.cancel)?;
        let mut body = new_virtual_network(location, VIRTUAL_NETWORK_ADDRESS_PREFIX);
        body.properties
            .subnets
            .push(new_subnet(subnet_id, security_group_id));
        match subnet_id {
            Some(id) => info!(id, "Using existing subnet in vnet creation"),
            None => info!("Creating new subnet for vnet creation"),
        }

        let vnet_name = naming::virtual_network_name(name, infra_id);
        let vnet = self
            .cloud
            .begin_create_virtual_network(resource_group, &vnet_name, &body)
            .await
            .step("create vnet")?
            .poll_until_done(&self.cancel)
            .await
            .step("wait for vnet creation")?;

        let created = verify_virtual_network(&vnet)?;
        info!(id = %created.id, subnet = %created.subnet_id, "Successfully created vnet");
        Ok(created)
    }

    /// Create `{name}-azurecluster.{base_domain}`, returning `(id, name)`.
    #[instrument(skip(self))]
    pub async fn create_private_dns_zone(
        &self,
        resource_group: &str,
        name: &str,
        base_domain: &str,
    ) -> Result<(String, String)> {
        ensure_active(&self.cancel)?;
        let zone_name = naming::private_dns_zone_name(name, base_domain);
        let zone = self
            .cloud
            .begin_create_private_dns_zone(resource_group, &zone_name, &new_private_dns_zone())
            .await
            .step("create private DNS zone")?
            .poll_until_done(&self.cancel)
            .await
            .step("wait for private DNS zone completion")?;

        let (Some(id), Some(created_name)) = (zone.id, zone.name) else {
            return Err(InfraError::malformed("created private DNS zone has no ID or name"));
        };
        info!(name = %created_name, "Successfully created private DNS zone");
        Ok((id, created_name))
    }

    /// Link the private zone to the VNet, without auto-registration.
    #[instrument(skip(self))]
    pub async fn create_private_dns_zone_link(
        &self,
        resource_group: &str,
        name: &str,
        infra_id: &str,
        vnet_id: &str,
        zone_name: &str,
    ) -> Result<()> {
        ensure_active(&self.cancel)?;
        let link_name = naming::private_dns_zone_link_name(name, infra_id);
        let link = new_virtual_network_link(GLOBAL_LOCATION, vnet_id, false);
        self.cloud
            .begin_create_virtual_network_link(resource_group, zone_name, &link_name, &link)
            .await
            .step("set up network link for private DNS zone")?
            .poll_until_done(&self.cancel)
            .await
            .step("wait for network link for private DNS zone")?;

        info!(link = %link_name, "Successfully created private DNS zone link");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn create_public_ip_address_for_lb(
        &self,
        resource_group: &str,
        infra_id: &str,
        location: &str,
    ) -> Result<PublicIpAddress> {
        ensure_active(&self.cancel)?;
        let address = self
            .cloud
            .begin_create_public_ip_address(
                resource_group,
                infra_id,
                &new_public_ip_address(infra_id, location),
            )
            .await
            .step("create public IP address")?
            .poll_until_done(&self.cancel)
            .await
            .step("wait for public IP address creation")?;

        if address.id.is_none() {
            return Err(InfraError::malformed("created public IP address has no ID"));
        }
        info!("Successfully created public IP address for guest cluster egress load balancer");
        Ok(address)
    }

    #[instrument(skip(self, public_ip))]
    pub async fn create_load_balancer(
        &self,
        resource_group: &str,
        infra_id: &str,
        location: &str,
        public_ip: &PublicIpAddress,
    ) -> Result<()> {
        ensure_active(&self.cancel)?;
        let id_prefix = load_balancer_id_prefix(self.cloud.subscription_id(), resource_group);
        let load_balancer_name = infra_id;
        let body = new_load_balancer(location, infra_id, &id_prefix, load_balancer_name, public_ip);

        self.cloud
            .begin_create_load_balancer(resource_group, load_balancer_name, &body)
            .await
            .step("create guest cluster egress load balancer")?
            .poll_until_done(&self.cancel)
            .await
            .step("wait to create guest cluster egress load balancer")?;

        info!("Successfully created guest cluster egress load balancer");
        Ok(())
    }
}
