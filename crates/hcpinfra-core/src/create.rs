//! Forward provisioning pipeline
//!
//! ```text
//! validate → main RG → public zone → NSG (+ side RG) → VNet (+ side RG)
//!          → identities / RBAC → private zone → zone link → public IP → LB → output
//! ```
//!
//! Each step waits for its long-running operation before the next begins and
//! the first error ends the run. Resources created up to that point stay in
//! place; `destroy` removes them.

use crate::ensure_active;
use crate::error::{InfraError, Result, StepContext};
use crate::identity::{
    AzureResourceManagedIdentities, ControlPlaneManagedIdentities, DataPlaneManagedIdentities,
    IdentityManager, WorkloadIdentities, WorkloadIdentityOptions,
};
use crate::naming::{self, ScopeGroups};
use crate::network::NetworkBuilder;
use crate::output::InfraOutput;
use crate::rbac::{RbacManager, RbacOptions};
use crate::resource_group::{ResourceGroupManager, ResourceGroupOptions};
use hcpinfra_cloud::model::Tags;
use hcpinfra_cloud::{CancellationToken, CloudApi};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Capability name that turns off the image registry.
pub const IMAGE_REGISTRY_CAPABILITY: &str = "ImageRegistry";

#[derive(Debug, Clone, Default)]
pub struct CreateInfraOptions {
    pub name: String,
    pub infra_id: String,
    pub base_domain: String,
    pub location: String,
    /// Existing main resource group; empty to create `{name}-{infra_id}`
    pub resource_group_name: String,
    pub resource_group_tags: Tags,
    pub vnet_id: Option<String>,
    pub subnet_id: Option<String>,
    pub network_security_group_id: Option<String>,
    pub output_file: Option<PathBuf>,
    pub managed_identities_file: Option<PathBuf>,
    pub data_plane_identities_file: Option<PathBuf>,
    pub workload_identities_file: Option<PathBuf>,
    pub oidc_issuer_url: Option<String>,
    pub assign_identity_roles: bool,
    /// Resource group of the public DNS zone, for ingress role scopes
    pub dns_zone_rg_name: Option<String>,
    pub assign_custom_hcp_roles: bool,
    pub disable_cluster_capabilities: Vec<String>,
}

impl CreateInfraOptions {
    pub fn image_registry_enabled(&self) -> bool {
        !self
            .disable_cluster_capabilities
            .iter()
            .any(|c| c.eq_ignore_ascii_case(IMAGE_REGISTRY_CAPABILITY))
    }

    fn resource_group_options(&self) -> ResourceGroupOptions {
        ResourceGroupOptions {
            name: self.name.clone(),
            infra_id: self.infra_id.clone(),
            location: self.location.clone(),
            resource_group_name: self.resource_group_name.clone(),
            tags: self.resource_group_tags.clone(),
        }
    }

    fn rbac_options(&self) -> RbacOptions {
        RbacOptions {
            infra_id: self.infra_id.clone(),
            custom_roles: self.assign_custom_hcp_roles,
            image_registry_enabled: self.image_registry_enabled(),
        }
    }
}

/// Check the identity-model flags and required fields before any cloud call.
///
/// | flags                                   | result                      |
/// |-----------------------------------------|-----------------------------|
/// | managed and/or data-plane files         | ARO-HCP                     |
/// | workload identities file                | self-managed, reuse         |
/// | OIDC issuer URL                         | self-managed, generated     |
/// | ARO-HCP file + workload identities file | error, mutually exclusive   |
/// | OIDC issuer + workload identities file  | error, mutually exclusive   |
/// | none                                    | error                       |
pub fn validate_deployment_model_flags(opts: &CreateInfraOptions) -> Result<()> {
    let aro_hcp = opts.managed_identities_file.is_some() || opts.data_plane_identities_file.is_some();
    let workload = opts.workload_identities_file.is_some();
    let oidc = opts.oidc_issuer_url.as_deref().is_some_and(|u| !u.is_empty());

    if aro_hcp && workload {
        return Err(InfraError::validation(
            "--managed-identities-file and --data-plane-identities-file are mutually exclusive with --workload-identities-file",
        ));
    }
    if oidc && workload {
        return Err(InfraError::validation(
            "--oidc-issuer-url is mutually exclusive with --workload-identities-file",
        ));
    }
    if !aro_hcp && !workload && !oidc {
        return Err(InfraError::validation(
            "at least one identity configuration must be provided: --managed-identities-file with --data-plane-identities-file, --workload-identities-file, or --oidc-issuer-url",
        ));
    }
    Ok(())
}

fn validate_required(opts: &CreateInfraOptions) -> Result<()> {
    for (flag, value) in [
        ("--name", &opts.name),
        ("--infra-id", &opts.infra_id),
        ("--base-domain", &opts.base_domain),
        ("--location", &opts.location),
    ] {
        if value.is_empty() {
            return Err(InfraError::validation(format!("{} is required", flag)));
        }
    }
    Ok(())
}

/// Identity model of a run, resolved from the flags and identity files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityModel {
    /// Pre-provisioned control-plane and data-plane managed identities
    AroHcp {
        managed: Option<ControlPlaneManagedIdentities>,
        data_plane: Option<DataPlaneManagedIdentities>,
    },
    /// Workload identities created earlier (e.g. by `create-iam`)
    SelfManagedFromFile { workload: WorkloadIdentities },
    /// Workload identities created by this run, trusting `oidc_issuer_url`
    SelfManagedGenerated { oidc_issuer_url: String },
}

fn read_document<T: serde::de::DeserializeOwned>(flag: &str, path: &Path) -> Result<T> {
    hcpinfra_config::load_document(path).step(format!("read {} {}", flag, path.display()))
}

impl IdentityModel {
    /// Validate the flags and load whichever identity files they name.
    pub fn from_options(opts: &CreateInfraOptions) -> Result<Self> {
        validate_deployment_model_flags(opts)?;

        if opts.managed_identities_file.is_some() || opts.data_plane_identities_file.is_some() {
            if opts.oidc_issuer_url.is_some() {
                warn!("--oidc-issuer-url is ignored when managed identity files are provided");
            }
            let managed = opts
                .managed_identities_file
                .as_deref()
                .map(|p| read_document("--managed-identities-file", p))
                .transpose()?;
            let data_plane = opts
                .data_plane_identities_file
                .as_deref()
                .map(|p| read_document("--data-plane-identities-file", p))
                .transpose()?;
            return Ok(Self::AroHcp {
                managed,
                data_plane,
            });
        }

        if let Some(path) = &opts.workload_identities_file {
            let workload = read_document("--workload-identities-file", path)?;
            return Ok(Self::SelfManagedFromFile { workload });
        }

        // validate_deployment_model_flags guarantees an issuer here
        let oidc_issuer_url = opts.oidc_issuer_url.clone().unwrap_or_default();
        Ok(Self::SelfManagedGenerated { oidc_issuer_url })
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::AroHcp { .. } => "aro-hcp",
            Self::SelfManagedFromFile { .. } => "self-managed (workload identities file)",
            Self::SelfManagedGenerated { .. } => "self-managed (generated workload identities)",
        }
    }
}

/// The create orchestrator.
pub struct CreateInfra {
    cloud: Arc<dyn CloudApi>,
    cancel: CancellationToken,
}

impl CreateInfra {
    pub fn new(cloud: Arc<dyn CloudApi>, cancel: CancellationToken) -> Self {
        Self { cloud, cancel }
    }

    #[instrument(skip_all, fields(cluster = %opts.name, infra_id = %opts.infra_id))]
    pub async fn run(&self, opts: &CreateInfraOptions) -> Result<InfraOutput> {
        validate_required(opts)?;
        let model = IdentityModel::from_options(opts)?;
        info!(model = model.describe(), "Identity model selected");

        let groups = ResourceGroupManager::new(self.cloud.clone(), self.cancel.clone());
        let network = NetworkBuilder::new(self.cloud.clone(), self.cancel.clone());
        let rg_opts = opts.resource_group_options();

        let mut result = InfraOutput {
            location: opts.location.clone(),
            infra_id: opts.infra_id.clone(),
            base_domain: opts.base_domain.clone(),
            ..Default::default()
        };

        let main = groups
            .create_or_get(&rg_opts, None)
            .await
            .step("create a resource group")?;
        result.resource_group_name = main.name.clone();

        result.public_zone_id = network.get_base_domain_id(&opts.base_domain).await?;

        let nsg_resource_group = match &opts.network_security_group_id {
            Some(id) => {
                let (_, group) = naming::parse_security_group_id(id)?;
                result.security_group_id = id.clone();
                info!(id = %id, "Using existing network security group");
                group
            }
            None => {
                let sub_name = naming::side_group_sub_name(&opts.name, naming::NSG_SIDE_GROUP);
                let side = groups
                    .create_or_get(&rg_opts, Some(&sub_name))
                    .await
                    .step("create resource group for network security group")?;
                result.security_group_id = network
                    .create_security_group(&side.name, &opts.name, &opts.infra_id, &opts.location)
                    .await?;
                side.name
            }
        };

        if let Some(subnet_id) = &opts.subnet_id {
            result.subnet_id = subnet_id.clone();
            info!(id = %subnet_id, "Using existing subnet");
        }

        let vnet_resource_group = match &opts.vnet_id {
            Some(id) => {
                let (_, group) = naming::parse_virtual_network_id(id)?;
                result.vnet_id = id.clone();
                info!(id = %id, "Using existing vnet");
                group
            }
            None => {
                let sub_name = naming::side_group_sub_name(&opts.name, naming::VNET_SIDE_GROUP);
                let side = groups
                    .create_or_get(&rg_opts, Some(&sub_name))
                    .await
                    .step("create resource group for virtual network")?;
                let vnet = network
                    .create_virtual_network(
                        &side.name,
                        &opts.name,
                        &opts.infra_id,
                        &opts.location,
                        opts.subnet_id.as_deref(),
                        &result.security_group_id,
                    )
                    .await?;
                result.vnet_id = vnet.id;
                result.subnet_id = vnet.subnet_id;
                side.name
            }
        };

        let scope_groups = ScopeGroups {
            main: main.name.clone(),
            nsg: nsg_resource_group,
            vnet: vnet_resource_group,
            dns_zone: match &opts.dns_zone_rg_name {
                Some(group) if !group.is_empty() => group.clone(),
                _ => naming::resource_group_of(&result.public_zone_id)?,
            },
        };
        self.provision_identities(opts, model, &main.name, &scope_groups, &mut result)
            .await?;

        let (private_zone_id, private_zone_name) = network
            .create_private_dns_zone(&main.name, &opts.name, &opts.base_domain)
            .await?;
        result.private_zone_id = private_zone_id;

        network
            .create_private_dns_zone_link(
                &main.name,
                &opts.name,
                &opts.infra_id,
                &result.vnet_id,
                &private_zone_name,
            )
            .await?;

        let public_ip = network
            .create_public_ip_address_for_lb(&main.name, &opts.infra_id, &opts.location)
            .await?;
        network
            .create_load_balancer(&main.name, &opts.infra_id, &opts.location, &public_ip)
            .await?;

        if let Some(path) = &opts.output_file {
            result.write_to(path)?;
        }

        info!(resource_group = %result.resource_group_name, "Infrastructure created");
        Ok(result)
    }

    /// Record the identities of the selected model and assign their roles.
    async fn provision_identities(
        &self,
        opts: &CreateInfraOptions,
        model: IdentityModel,
        main_group: &str,
        scope_groups: &ScopeGroups,
        result: &mut InfraOutput,
    ) -> Result<()> {
        ensure_active(&self.cancel)?;
        let rbac = RbacManager::new(self.cloud.clone(), self.cancel.clone());
        let rbac_opts = opts.rbac_options();

        match model {
            IdentityModel::AroHcp {
                managed,
                data_plane,
            } => {
                if let Some(control_plane) = managed {
                    if opts.assign_identity_roles {
                        rbac.assign_control_plane_roles(&rbac_opts, &control_plane, scope_groups)
                            .await?;
                    }
                    result.control_plane_identities = Some(AzureResourceManagedIdentities {
                        control_plane,
                        data_plane: data_plane.clone().unwrap_or_default(),
                    });
                }
                if let Some(data_plane) = data_plane {
                    if opts.assign_identity_roles {
                        rbac.assign_data_plane_roles(&rbac_opts, &data_plane, main_group)
                            .await?;
                    }
                    result.data_plane_identities = Some(data_plane);
                }
            }
            IdentityModel::SelfManagedFromFile { workload } => {
                if opts.assign_identity_roles {
                    rbac.assign_workload_identities(&rbac_opts, &workload, scope_groups)
                        .await?;
                }
                result.workload_identities = Some(workload);
            }
            IdentityModel::SelfManagedGenerated { oidc_issuer_url } => {
                let identities = IdentityManager::new(self.cloud.clone(), self.cancel.clone());
                let workload = identities
                    .create_workload_identities(
                        &WorkloadIdentityOptions {
                            name: opts.name.clone(),
                            infra_id: opts.infra_id.clone(),
                            location: opts.location.clone(),
                            oidc_issuer_url,
                        },
                        main_group,
                    )
                    .await?;
                info!("Successfully created workload identities");
                if opts.assign_identity_roles {
                    rbac.assign_workload_identities(&rbac_opts, &workload, scope_groups)
                        .await?;
                }
                result.workload_identities = Some(workload);
            }
        }
        Ok(())
    }
}
