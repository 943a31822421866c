use crate::utils::{self, CloudArgs};
use clap::Args;
use colored::Colorize;
use hcpinfra_cloud::{ApplyResult, CancellationToken, CloudApi};
use hcpinfra_core::{DestroyInfra, DestroyInfraOptions};
use std::sync::Arc;
use tracing::debug;

#[derive(Args, Debug, Clone)]
pub struct DestroyArgs {
    #[command(flatten)]
    pub cloud: CloudArgs,

    /// Cluster name
    #[arg(long)]
    pub name: String,

    /// Infrastructure id the cluster was created with
    #[arg(long)]
    pub infra_id: String,

    /// Accepted for symmetry with create; destroy does not need it
    #[arg(long, env = "HCPINFRA_LOCATION")]
    pub location: Option<String>,

    /// Main resource group, if not {name}-{infra-id}
    #[arg(long, default_value = "")]
    pub resource_group_name: String,

    /// Keep the main resource group and delete only cluster-owned resources in it
    #[arg(long)]
    pub preserve_resource_group: bool,
}

impl DestroyArgs {
    pub fn options(&self) -> DestroyInfraOptions {
        DestroyInfraOptions {
            name: self.name.clone(),
            infra_id: self.infra_id.clone(),
            resource_group_name: self.resource_group_name.clone(),
            preserve_resource_group: self.preserve_resource_group,
        }
    }
}

pub async fn handle(args: DestroyArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    if let Some(location) = &args.location {
        debug!(location = %location, "--location is not used by destroy");
    }
    let cloud = utils::connect(&args.cloud)?;
    let result = run(&args.options(), cloud, cancel).await?;
    utils::print_apply_summary(&result);
    if result.is_success() {
        println!("{}", "✓ Infrastructure destroyed".green().bold());
    } else {
        println!(
            "{}",
            "Some resources could not be deleted, run destroy again to retry".yellow()
        );
    }
    Ok(())
}

async fn run(
    opts: &DestroyInfraOptions,
    cloud: Arc<dyn CloudApi>,
    cancel: CancellationToken,
) -> anyhow::Result<ApplyResult> {
    println!(
        "{}",
        format!("Destroying infrastructure for {} ({})", opts.name, opts.infra_id).bold()
    );
    Ok(DestroyInfra::new(cloud, cancel).run(opts).await?)
}
