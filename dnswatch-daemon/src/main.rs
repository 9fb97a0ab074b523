use anyhow::Result;
use clap::Parser;

use dnswatch_daemon::cli::DaemonCli;
use dnswatch_daemon::logging;
use dnswatch_daemon::modules::query_pipeline;
use dnswatch_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let config = cli.load_config().await?;
    logging::init_tracing(&config.general)?;

    if cli.validate {
        // Scope file and derived pipeline settings are checked by building the module
        let (_module, _exit_rx) = query_pipeline::init(&config).await?;
        tracing::info!(config = %cli.config.display(), "configuration is valid");
        println!("configuration is valid: {}", cli.config.display());
        return Ok(());
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "dnswatch-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await?;

    Ok(())
}
