//! Migration safety workflow.
//!
//! Classifies the target network and forces a forked rehearsal ahead of any
//! production deployment. A rehearsal runs against an ephemeral fork with the
//! build artifacts staged in a disposable directory, which is removed whether
//! the rehearsal succeeds or fails.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::chain::{ChainClient, ClientError};
use crate::fs::FsHandler;

/// Numeric identifiers of well-known public networks. Deployments targeting
/// any of these are always rehearsed on a fork first.
pub const PUBLIC_NETWORK_IDS: [u64; 10] = [
    1,  // Mainnet (ETH & ETC)
    2,  // Morden (ETC)
    3,  // Ropsten
    4,  // Rinkeby
    8,  // Ubiq
    42, // Kovan
    77, // Sokol
    99, // Core
    7_762_959,  // Musiccoin
    61_717_561, // Aquachain
];

/// Whether the target network must be treated as production.
pub fn is_production(network_id: u64, explicit_flag: bool) -> bool {
    explicit_flag || PUBLIC_NETWORK_IDS.contains(&network_id)
}

/// Settings for one migration run.
#[derive(Debug, Clone)]
pub struct MigrationSettings {
    pub network_id: u64,
    /// Treat the target as production regardless of its network id.
    pub production: bool,
    /// An explicit rehearsal was requested by the operator.
    pub dry_run: bool,
    /// Require operator confirmation between a production rehearsal and the
    /// real run.
    pub interactive: bool,
    /// Directory holding the current build artifacts.
    pub build_directory: PathBuf,
}

/// Everything a migration needs to run against one environment.
pub struct MigrationContext {
    pub client: Arc<dyn ChainClient>,
    /// Build directory the run should read and write artifacts in. Points at
    /// a disposable staging copy during rehearsals.
    pub build_directory: PathBuf,
    pub dry_run: bool,
}

/// Detects (and forks) the environment migrations run against.
#[async_trait]
pub trait MigrationEnvironment: Send + Sync {
    /// Connect to the live target environment.
    async fn detect(&self) -> Result<Arc<dyn ChainClient>, ClientError>;

    /// Fork the target into an ephemeral rehearsal environment.
    async fn fork(&self) -> Result<Arc<dyn ChainClient>, ClientError>;
}

/// Operator gate between a successful production rehearsal and the real run.
#[async_trait]
pub trait DryRunApproval: Send + Sync {
    async fn accept(&self) -> Result<bool>;
}

/// Accepts unconditionally; the non-interactive default.
pub struct AutoApprove;

#[async_trait]
impl DryRunApproval for AutoApprove {
    async fn accept(&self) -> Result<bool> {
        Ok(true)
    }
}

/// The migration body: invoked once per environment the workflow decides to
/// run against.
pub type MigrationRunner =
    Arc<dyn Fn(MigrationContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Runs migrations with the production-safety policy applied.
pub struct MigrationWorkflow<E> {
    env: E,
    settings: MigrationSettings,
}

impl<E: MigrationEnvironment> MigrationWorkflow<E> {
    pub fn new(env: E, settings: MigrationSettings) -> Self {
        Self { env, settings }
    }

    pub fn environment(&self) -> &E {
        &self.env
    }

    pub fn settings(&self) -> &MigrationSettings {
        &self.settings
    }

    /// Execute the workflow.
    ///
    /// - An explicit dry run on a non-production network runs the rehearsal
    ///   and stops.
    /// - A production target always rehearses first, flag or not; on
    ///   success the real run proceeds, gated on operator approval when
    ///   interactive. A declined approval finishes without touching the
    ///   network.
    /// - Anything else runs migrations directly, once.
    ///
    /// A failed rehearsal aborts before the real network is ever touched.
    pub async fn execute<A: DryRunApproval>(
        &self,
        runner: MigrationRunner,
        approval: &A,
    ) -> Result<()> {
        let production = is_production(self.settings.network_id, self.settings.production);

        if self.settings.dry_run && !production {
            return self.run_rehearsal(&runner).await;
        }

        if production {
            // Mandatory for production targets, whether or not a dry run was
            // requested.
            self.run_rehearsal(&runner)
                .await
                .context("Rehearsal failed; the production network was not touched")?;

            if self.settings.interactive && !approval.accept().await? {
                tracing::info!("Deployment declined by operator; the network was not touched");
                return Ok(());
            }

            // Re-detect the live environment; the rehearsal client pointed at
            // the fork.
            let client = self.env.detect().await?;
            let ctx = MigrationContext {
                client,
                build_directory: self.settings.build_directory.clone(),
                dry_run: false,
            };
            return runner(ctx).await;
        }

        let client = self.env.detect().await?;
        let ctx = MigrationContext {
            client,
            build_directory: self.settings.build_directory.clone(),
            dry_run: false,
        };
        runner(ctx).await
    }

    /// Fork the environment, stage artifacts into a disposable directory,
    /// run migrations against the fork, and remove the directory on success
    /// and failure alike.
    async fn run_rehearsal(&self, runner: &MigrationRunner) -> Result<()> {
        let client = self.env.fork().await?;

        let staging = tempdir::TempDir::new("strudel-dry-run-")
            .context("Failed to create dry-run staging directory")?;
        FsHandler::copy_dir_recursive(&self.settings.build_directory, staging.path())
            .context("Failed to stage build artifacts for the dry run")?;

        tracing::info!(
            network_id = self.settings.network_id,
            staging = %staging.path().display(),
            "Running migrations against a forked environment..."
        );

        let ctx = MigrationContext {
            client,
            build_directory: staging.path().to_path_buf(),
            dry_run: true,
        };
        let result = runner(ctx).await;

        // Removed on the failure path too; a close error must not mask the
        // rehearsal's own outcome.
        if let Err(err) = staging.close() {
            tracing::warn!(error = %err, "Failed to remove dry-run staging directory");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_networks_are_production() {
        assert!(is_production(1, false));
        assert!(is_production(42, false));
        assert!(is_production(61_717_561, false));
    }

    #[test]
    fn test_development_networks_are_not_production() {
        assert!(!is_production(1337, false));
        assert!(!is_production(11_155_111, false));
    }

    #[test]
    fn test_explicit_flag_forces_production() {
        assert!(is_production(1337, true));
    }
}
