use crate::utils::{self, CloudArgs};
use clap::Args;
use colored::Colorize;
use hcpinfra_cloud::model::Tags;
use hcpinfra_cloud::{CancellationToken, CloudApi};
use hcpinfra_core::{CreateInfra, CreateInfraOptions, InfraOutput, validate_deployment_model_flags};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    #[command(flatten)]
    pub cloud: CloudArgs,

    /// Cluster name
    #[arg(long)]
    pub name: String,

    /// Unique infrastructure id, suffixed to resource names
    #[arg(long)]
    pub infra_id: String,

    /// Base domain; its public DNS zone must already exist in the subscription
    #[arg(long)]
    pub base_domain: String,

    /// Azure region
    #[arg(long, default_value = "eastus", env = "HCPINFRA_LOCATION")]
    pub location: String,

    /// Existing resource group to use instead of creating {name}-{infra-id}
    #[arg(long, default_value = "")]
    pub resource_group_name: String,

    /// Tags for created resource groups, as key=value pairs separated by commas
    #[arg(long, value_parser = utils::parse_tags, default_value = "")]
    pub resource_group_tags: Tags,

    /// Existing virtual network id
    #[arg(long)]
    pub vnet_id: Option<String>,

    /// Existing subnet id
    #[arg(long)]
    pub subnet_id: Option<String>,

    /// Existing network security group id
    #[arg(long)]
    pub network_security_group_id: Option<String>,

    /// Write the infrastructure record here (YAML, or JSON for *.json)
    #[arg(long)]
    pub output_file: Option<PathBuf>,

    /// Control-plane managed identities (ARO-HCP)
    #[arg(long)]
    pub managed_identities_file: Option<PathBuf>,

    /// Data-plane managed identities (ARO-HCP)
    #[arg(long)]
    pub data_plane_identities_file: Option<PathBuf>,

    /// Workload identities created earlier with create-iam
    #[arg(long)]
    pub workload_identities_file: Option<PathBuf>,

    /// OIDC issuer the generated workload identities trust
    #[arg(long)]
    pub oidc_issuer_url: Option<String>,

    /// Assign roles to the identities
    #[arg(long)]
    pub assign_identity_roles: bool,

    /// Resource group of the public DNS zone
    #[arg(long)]
    pub dns_zone_rg_name: Option<String>,

    /// Use the hosted-control-plane custom roles instead of Contributor
    #[arg(long)]
    pub assign_custom_hcp_roles: bool,

    /// Optional cluster capabilities to disable (e.g. ImageRegistry)
    #[arg(long, value_delimiter = ',')]
    pub disable_cluster_capabilities: Vec<String>,
}

impl CreateArgs {
    pub fn options(&self) -> CreateInfraOptions {
        CreateInfraOptions {
            name: self.name.clone(),
            infra_id: self.infra_id.clone(),
            base_domain: self.base_domain.clone(),
            location: self.location.clone(),
            resource_group_name: self.resource_group_name.clone(),
            resource_group_tags: self.resource_group_tags.clone(),
            vnet_id: self.vnet_id.clone(),
            subnet_id: self.subnet_id.clone(),
            network_security_group_id: self.network_security_group_id.clone(),
            output_file: self.output_file.clone(),
            managed_identities_file: self.managed_identities_file.clone(),
            data_plane_identities_file: self.data_plane_identities_file.clone(),
            workload_identities_file: self.workload_identities_file.clone(),
            oidc_issuer_url: self.oidc_issuer_url.clone(),
            assign_identity_roles: self.assign_identity_roles,
            dns_zone_rg_name: self.dns_zone_rg_name.clone(),
            assign_custom_hcp_roles: self.assign_custom_hcp_roles,
            disable_cluster_capabilities: self.disable_cluster_capabilities.clone(),
        }
    }
}

pub async fn handle(args: CreateArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    let opts = args.options();
    validate_deployment_model_flags(&opts)?;

    let cloud = utils::connect(&args.cloud)?;
    let output = run(&opts, cloud, cancel).await?;
    print_summary(&output);
    Ok(())
}

async fn run(
    opts: &CreateInfraOptions,
    cloud: Arc<dyn CloudApi>,
    cancel: CancellationToken,
) -> anyhow::Result<InfraOutput> {
    println!(
        "{}",
        format!("Creating infrastructure for {} ({})", opts.name, opts.infra_id).bold()
    );
    Ok(CreateInfra::new(cloud, cancel).run(opts).await?)
}

fn print_summary(output: &InfraOutput) {
    println!();
    println!("{}", "✓ Infrastructure created".green().bold());
    utils::print_field("Resource group", &output.resource_group_name);
    utils::print_field("Region", &output.location);
    utils::print_field("Public zone", &output.public_zone_id);
    utils::print_field("Private zone", &output.private_zone_id);
    utils::print_field("VNet", &output.vnet_id);
    utils::print_field("Subnet", &output.subnet_id);
    utils::print_field("Security group", &output.security_group_id);
    if output.workload_identities.is_some() {
        utils::print_field("Identities", "workload identities");
    } else if output.control_plane_identities.is_some() {
        utils::print_field("Identities", "managed identities");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hcpinfra_core::testing::FakeCloud;

    fn args() -> CreateArgs {
        CreateArgs {
            cloud: CloudArgs {
                azure_creds: PathBuf::from("unused.json"),
                cloud: "AzurePublicCloud".into(),
            },
            name: "demo".into(),
            infra_id: "abc".into(),
            base_domain: "example.com".into(),
            location: "eastus".into(),
            resource_group_name: String::new(),
            resource_group_tags: Tags::new(),
            vnet_id: None,
            subnet_id: None,
            network_security_group_id: None,
            output_file: None,
            managed_identities_file: None,
            data_plane_identities_file: None,
            workload_identities_file: None,
            oidc_issuer_url: Some("https://issuer.example.com".into()),
            assign_identity_roles: false,
            dns_zone_rg_name: None,
            assign_custom_hcp_roles: false,
            disable_cluster_capabilities: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_run_against_fake_cloud() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("infra.yaml");
        let fake = FakeCloud::new();
        fake.add_dns_zone("dns-rg", "example.com");
        let fake = Arc::new(fake);

        let mut args = args();
        args.output_file = Some(path.clone());
        let output = run(&args.options(), fake.clone(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.resource_group_name, "demo-abc");
        assert!(fake.resource_group("demo-abc").is_some());
        let written: InfraOutput = hcpinfra_config::load_document(&path).unwrap();
        assert_eq!(written, output);
    }

    #[tokio::test]
    async fn test_handle_rejects_flags_before_connecting() {
        let mut args = args();
        args.workload_identities_file = Some(PathBuf::from("wi.yaml"));
        // The credentials path does not exist, so reaching connect would fail differently.
        let err = handle(args, CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[tokio::test]
    async fn test_handle_reports_missing_credentials() {
        let err = handle(args(), CancellationToken::new()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("--azure-creds"));
    }
}
