mod commands;
mod utils;

use clap::{Parser, Subcommand};
use hcpinfra_cloud::CancellationToken;
use tracing::error;

#[derive(Parser)]
#[command(name = "hcpinfra")]
#[command(about = "Provision Azure infrastructure for hosted control planes", long_about = None)]
struct Cli {
    /// Log output format
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = utils::LogFormat::Text,
        env = "HCPINFRA_LOG_FORMAT"
    )]
    log_format: utils::LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create resource groups, network, DNS, load balancer and identities for a cluster
    Create(commands::create::CreateArgs),
    /// Delete the infrastructure of a cluster
    Destroy(commands::destroy::DestroyArgs),
    /// Create workload identities in an existing resource group
    CreateIam(commands::iam::CreateIamArgs),
    /// Delete workload identities from a resource group
    DestroyIam(commands::iam::DestroyIamArgs),
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    utils::init_logging(cli.log_format);

    if matches!(cli.command, Commands::Version) {
        println!("hcpinfra {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let cancel = CancellationToken::new();
    utils::cancel_on_ctrl_c(cancel.clone());

    let result = match cli.command {
        Commands::Create(args) => commands::create::handle(args, cancel).await,
        Commands::Destroy(args) => commands::destroy::handle(args, cancel).await,
        Commands::CreateIam(args) => commands::iam::handle_create(args, cancel).await,
        Commands::DestroyIam(args) => commands::iam::handle_destroy(args, cancel).await,
        Commands::Version => Ok(()),
    };

    if let Err(e) = &result {
        error!(error = %format!("{:#}", e), "Command failed");
    }
    result
}
