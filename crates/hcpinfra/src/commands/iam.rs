use crate::utils::{self, CloudArgs};
use clap::Args;
use colored::Colorize;
use hcpinfra_cloud::CancellationToken;
use hcpinfra_core::identity::{IdentityComponent, WorkloadIdentities};
use hcpinfra_core::{CreateIamOptions, DestroyIamOptions, IamInfra};
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct CreateIamArgs {
    #[command(flatten)]
    pub cloud: CloudArgs,

    /// Cluster name
    #[arg(long)]
    pub name: String,

    /// Infrastructure id, suffixed to identity names
    #[arg(long)]
    pub infra_id: String,

    /// Region for the identities; defaults to the resource group's
    #[arg(long, default_value = "", env = "HCPINFRA_LOCATION")]
    pub location: String,

    /// Existing resource group to create the identities in
    #[arg(long)]
    pub resource_group_name: String,

    /// OIDC issuer the federated credentials trust
    #[arg(long)]
    pub oidc_issuer_url: String,

    /// Write the workload identities here, for create --workload-identities-file
    #[arg(long)]
    pub output_file: Option<PathBuf>,
}

impl CreateIamArgs {
    pub fn options(&self) -> CreateIamOptions {
        CreateIamOptions {
            name: self.name.clone(),
            infra_id: self.infra_id.clone(),
            location: self.location.clone(),
            resource_group_name: self.resource_group_name.clone(),
            oidc_issuer_url: self.oidc_issuer_url.clone(),
            output_file: self.output_file.clone(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DestroyIamArgs {
    #[command(flatten)]
    pub cloud: CloudArgs,

    /// Cluster name
    #[arg(long)]
    pub name: String,

    /// Infrastructure id the identities were created with
    #[arg(long)]
    pub infra_id: String,

    /// Resource group holding the identities
    #[arg(long)]
    pub resource_group_name: String,

    /// Record written by create-iam
    #[arg(long)]
    pub workload_identities_file: Option<PathBuf>,
}

impl DestroyIamArgs {
    pub fn options(&self) -> DestroyIamOptions {
        DestroyIamOptions {
            name: self.name.clone(),
            infra_id: self.infra_id.clone(),
            resource_group_name: self.resource_group_name.clone(),
            workload_identities_file: self.workload_identities_file.clone(),
        }
    }
}

pub async fn handle_create(args: CreateIamArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    let cloud = utils::connect(&args.cloud)?;
    let identities = IamInfra::new(cloud, cancel).create(&args.options()).await?;
    print_identities(&identities);
    Ok(())
}

pub async fn handle_destroy(args: DestroyIamArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    let cloud = utils::connect(&args.cloud)?;
    IamInfra::new(cloud, cancel).destroy(&args.options()).await?;
    println!("{}", "✓ Workload identities deleted".green().bold());
    Ok(())
}

fn print_identities(identities: &WorkloadIdentities) {
    println!();
    println!("{}", "✓ Workload identities created".green().bold());
    for component in IdentityComponent::ALL {
        utils::print_field(&component.to_string(), &component.slot(identities).client_id);
    }
}
