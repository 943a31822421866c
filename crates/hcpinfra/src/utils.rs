use anyhow::Context;
use clap::{Args, ValueEnum};
use colored::Colorize;
use hcpinfra_cloud::model::Tags;
use hcpinfra_cloud::{ApplyResult, CancellationToken, CloudApi, CloudConfiguration};
use hcpinfra_cloud_azure::{AzureClient, ClientSecretCredential};
use hcpinfra_config::AzureCreds;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Flags every cloud-facing command takes.
#[derive(Args, Debug, Clone)]
pub struct CloudArgs {
    /// Path to a credentials file (subscriptionId, tenantId, clientId, clientSecret)
    #[arg(long)]
    pub azure_creds: PathBuf,

    /// Cloud environment (AzurePublicCloud, AzureUSGovernmentCloud, AzureChinaCloud)
    #[arg(long, default_value = "AzurePublicCloud", env = "HCPINFRA_CLOUD")]
    pub cloud: String,
}

/// Logs go to stderr; `RUST_LOG` overrides the default `info` level.
pub fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

pub fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight operations");
            cancel.cancel();
        }
    });
}

/// Build the Azure client from the credentials file and cloud name.
pub fn connect(args: &CloudArgs) -> anyhow::Result<Arc<dyn CloudApi>> {
    let cloud: CloudConfiguration = args
        .cloud
        .parse()
        .with_context(|| format!("invalid --cloud '{}'", args.cloud))?;
    let creds = AzureCreds::load(&args.azure_creds)
        .with_context(|| format!("failed to load --azure-creds {}", args.azure_creds.display()))?;

    let credential = ClientSecretCredential::new(
        &creds.tenant_id,
        &creds.client_id,
        &creds.client_secret,
        &cloud,
    );
    info!(cloud = %cloud, subscription = %creds.subscription_id, "Using Azure subscription");
    Ok(Arc::new(AzureClient::new(
        creds.subscription_id,
        Arc::new(credential),
        cloud,
    )))
}

/// Parse `k=v,k2=v2`.
pub fn parse_tags(value: &str) -> Result<Tags, String> {
    let mut tags = Tags::new();
    for pair in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match pair.split_once('=') {
            Some((key, val)) if !key.trim().is_empty() => {
                tags.insert(key.trim().to_string(), val.trim().to_string());
            }
            _ => return Err(format!("invalid tag '{}', expected key=value", pair)),
        }
    }
    Ok(tags)
}

pub fn print_field(label: &str, value: &str) {
    if !value.is_empty() {
        println!("  {:<22} {}", format!("{}:", label), value.cyan());
    }
}

pub fn print_apply_summary(result: &ApplyResult) {
    use hcpinfra_cloud::ActionType;

    println!();
    println!(
        "{} deleted, {} already gone, {} failed ({} ms)",
        result.count(ActionType::Delete).to_string().green(),
        result.count(ActionType::Skip).to_string().dimmed(),
        if result.failed.is_empty() {
            "0".normal()
        } else {
            result.failed.len().to_string().red()
        },
        result.duration_ms
    );
    for line in result.failure_lines() {
        println!("  {} {}", "✗".red(), line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags() {
        let tags = parse_tags("team=infra, env = dev").unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags["env"], "dev");
        assert!(parse_tags("").unwrap().is_empty());
        assert_eq!(parse_tags("owner=").unwrap()["owner"], "");
    }

    #[test]
    fn test_parse_tags_rejects_malformed() {
        assert!(parse_tags("novalue").is_err());
        assert!(parse_tags("=x").is_err());
        assert!(parse_tags("a=b,broken").unwrap_err().contains("broken"));
    }

    #[test]
    fn test_connect_rejects_unknown_cloud() {
        let args = CloudArgs {
            azure_creds: PathBuf::from("unused.json"),
            cloud: "AzureMoonCloud".into(),
        };
        let err = connect(&args).err().unwrap();
        assert!(format!("{:#}", err).contains("unknown cloud"));
    }

    #[test]
    fn test_connect_loads_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.yaml");
        std::fs::write(
            &path,
            "subscriptionId: sub\ntenantId: tenant\nclientId: client\nclientSecret: secret\n",
        )
        .unwrap();
        let args = CloudArgs {
            azure_creds: path,
            cloud: "AzureChinaCloud".into(),
        };
        let cloud = connect(&args).unwrap();
        assert_eq!(cloud.subscription_id(), "sub");
    }
}
