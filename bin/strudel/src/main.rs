//! strudel is a CLI tool that deploys compiled contract artifacts with a
//! production-safe migration workflow: public networks are always rehearsed
//! on a fork before the real deployment runs.

mod cli;
mod runner;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use url::Url;

use cli::Cli;
use strudel_deploy::{
    ChainClient, ClientError, DryRunApproval, HttpChainClient, MigrationEnvironment,
    MigrationSettings, MigrationWorkflow, StrudelConfig,
};

/// Environment detection backed by the configured JSON-RPC endpoints.
struct HttpEnvironment {
    rpc_url: Url,
    fork_rpc_url: Option<Url>,
}

impl HttpEnvironment {
    fn new(config: &StrudelConfig) -> Self {
        Self {
            rpc_url: config.rpc_url.clone(),
            fork_rpc_url: config.fork_rpc_url.clone(),
        }
    }
}

#[async_trait]
impl MigrationEnvironment for HttpEnvironment {
    async fn detect(&self) -> Result<Arc<dyn ChainClient>, ClientError> {
        Ok(Arc::new(HttpChainClient::connect(
            self.rpc_url.clone(),
            self.fork_rpc_url.clone(),
        )?))
    }

    async fn fork(&self) -> Result<Arc<dyn ChainClient>, ClientError> {
        let fork_url = self.fork_rpc_url.clone().ok_or_else(|| {
            ClientError::new(
                "No fork endpoint configured; set fork_rpc_url in Strudel.toml to enable rehearsals",
            )
        })?;
        Ok(Arc::new(HttpChainClient::connect(fork_url, None)?))
    }
}

/// Prompts the operator on stdin after a successful production rehearsal.
struct StdinApproval;

#[async_trait]
impl DryRunApproval for StdinApproval {
    async fn accept(&self) -> Result<bool> {
        let line = tokio::task::spawn_blocking(|| {
            print!("Rehearsal succeeded. Deploy to the production network? [y/N] ");
            std::io::stdout().flush()?;
            let mut buffer = String::new();
            std::io::stdin().read_line(&mut buffer)?;
            Ok::<_, std::io::Error>(buffer)
        })
        .await
        .context("Approval prompt task failed")?
        .context("Failed to read operator approval")?;

        Ok(matches!(
            line.trim().to_ascii_lowercase().as_str(),
            "y" | "yes"
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let mut config = StrudelConfig::load_from_file(&cli.config)?;
    if let Some(network) = cli.network {
        config.network_id = network.to_network_id();
    }

    if cli.compile_all {
        tracing::info!(
            "Recompilation requested; run your contract compiler first, strudel deploys what the \
             build directory holds"
        );
    }

    tracing::info!(
        network_id = config.network_id,
        rpc_url = %config.rpc_url,
        build_directory = %config.build_directory.display(),
        reset = cli.reset,
        dry_run = cli.dry_run,
        "Starting migration..."
    );

    let settings = MigrationSettings {
        network_id: config.network_id,
        production: config.production,
        dry_run: cli.dry_run,
        interactive: cli.interactive,
        build_directory: config.build_directory.clone(),
    };

    let env = HttpEnvironment::new(&config);
    let runner = runner::artifact_runner(config, cli.reset, cli.run_from);

    MigrationWorkflow::new(env, settings)
        .execute(runner, &StdinApproval)
        .await?;

    Ok(())
}
