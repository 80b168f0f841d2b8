//! Artifact-directory migration runner.
//!
//! Deploys every contract artifact found in the build directory, in file
//! order, writing addresses and transaction hashes back to the artifact
//! files as deployments settle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::Table;

use strudel_deploy::{
    ContractArtifact, ContractInstance, DeployOptions, Deployment, DeploymentOptions,
    MigrationContext, MigrationRunner, StrudelConfig, spawn_reporter,
};

/// Build the migration runner for one configuration.
///
/// `reset` redeploys contracts already recorded on the network; without it
/// they are kept. `run_from` skips artifacts before the given index.
pub fn artifact_runner(
    config: StrudelConfig,
    reset: bool,
    run_from: Option<usize>,
) -> MigrationRunner {
    Arc::new(move |ctx: MigrationContext| {
        let config = config.clone();
        Box::pin(async move { run_migration(ctx, config, reset, run_from).await })
    })
}

async fn run_migration(
    ctx: MigrationContext,
    config: StrudelConfig,
    reset: bool,
    run_from: Option<usize>,
) -> Result<()> {
    let mut artifacts = load_artifacts(&ctx.build_directory, config.network_id)?;
    if artifacts.is_empty() {
        tracing::info!("Network up to date.");
        return Ok(());
    }

    let session = Deployment::new(
        ctx.client.clone(),
        DeploymentOptions {
            confirmations: config.confirmations,
            timeout_blocks: config.timeout_blocks,
            ..DeploymentOptions::default()
        },
    );
    let reporter = spawn_reporter(session.events());

    let start = run_from.unwrap_or(0);
    // Without --reset, contracts already recorded on this network are kept.
    let overwrite = if reset { None } else { Some(false) };

    let mut summary = Vec::new();
    for (index, (path, artifact)) in artifacts.iter_mut().enumerate() {
        if index < start {
            tracing::debug!(contract = %artifact.contract_name, index, "Skipped by --from");
            continue;
        }

        let options = DeployOptions {
            overwrite,
            from: config.from,
            ..DeployOptions::default()
        };
        let instance = session
            .deploy_one(artifact, Vec::new(), options)
            .await
            .with_context(|| format!("Migration of {} failed", artifact.contract_name))?;

        save_artifact(path, artifact)?;
        summary.push(instance);
    }

    session.close();
    reporter.abort();

    print_summary(&summary, ctx.dry_run);
    Ok(())
}

/// Load every `.json` artifact in the build directory, in file-name order.
///
/// The configured network is always available to loaded artifacts, so fresh
/// builds can deploy without a pre-seeded record.
fn load_artifacts(
    build_directory: &Path,
    network_id: u64,
) -> Result<Vec<(PathBuf, ContractArtifact)>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(build_directory)
        .context(format!(
            "Failed to read build directory {}",
            build_directory.display()
        ))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut artifacts = Vec::new();
    for path in paths {
        let content = std::fs::read_to_string(&path)
            .context(format!("Failed to read artifact {}", path.display()))?;
        let mut artifact: ContractArtifact = serde_json::from_str(&content)
            .context(format!("Failed to parse artifact {}", path.display()))?;
        artifact.networks.entry(network_id).or_default();
        artifacts.push((path, artifact));
    }
    Ok(artifacts)
}

fn save_artifact(path: &Path, artifact: &ContractArtifact) -> Result<()> {
    let content =
        serde_json::to_string_pretty(artifact).context("Failed to serialize artifact")?;
    std::fs::write(path, content)
        .context(format!("Failed to write artifact {}", path.display()))?;
    Ok(())
}

fn print_summary(instances: &[ContractInstance], dry_run: bool) {
    let mut table = Table::new();
    table.set_header(["Contract", "Address", "Transaction"]);
    for instance in instances {
        table.add_row([
            instance.contract_name.clone(),
            instance.address.to_string(),
            instance
                .transaction_hash
                .map(|hash| hash.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }

    let title = if dry_run {
        "Dry run complete"
    } else {
        "Migration complete"
    };
    tracing::info!("{title}\n{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_artifacts_sorted_and_seeded() {
        let dir = tempdir::TempDir::new("strudel-artifacts-").unwrap();
        for name in ["02_Token.json", "01_Registry.json", "notes.txt"] {
            let body = if name.ends_with(".json") {
                format!(
                    r#"{{"contract_name": "{}", "bytecode": "0x6080"}}"#,
                    name.trim_end_matches(".json")
                )
            } else {
                "ignored".to_string()
            };
            std::fs::write(dir.path().join(name), body).unwrap();
        }

        let artifacts = load_artifacts(dir.path(), 1337).unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].1.contract_name, "01_Registry");
        assert_eq!(artifacts[1].1.contract_name, "02_Token");
        // The configured network is seeded on load.
        assert!(artifacts[0].1.network(1337).is_some());
    }

    #[test]
    fn test_save_artifact_round_trips() {
        let dir = tempdir::TempDir::new("strudel-artifacts-").unwrap();
        let path = dir.path().join("Example.json");
        let artifact: ContractArtifact =
            serde_json::from_str(r#"{"contract_name": "Example", "bytecode": "0x6080"}"#).unwrap();

        save_artifact(&path, &artifact).unwrap();
        let loaded = load_artifacts(dir.path(), 1).unwrap();
        assert_eq!(loaded[0].1.contract_name, "Example");
    }
}
