//! Project configuration.

use std::path::PathBuf;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// The default name for the strudel configuration file.
pub const STRUDELCONF_FILENAME: &str = "Strudel.toml";

/// Project configuration for a migration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrudelConfig {
    /// JSON-RPC endpoint of the target network.
    pub rpc_url: Url,
    /// Endpoint of a forked copy of the target, used for rehearsals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fork_rpc_url: Option<Url>,
    /// Network id deployments are recorded under.
    pub network_id: u64,
    /// Treat the target as production regardless of its network id.
    #[serde(default)]
    pub production: bool,
    /// Blocks to wait after each deployment before its instance resolves.
    #[serde(default)]
    pub confirmations: u64,
    /// Block-wait override handed to the client; zero defers to the client's
    /// own abandonment window.
    #[serde(default)]
    pub timeout_blocks: u64,
    /// Directory holding compiled contract artifacts.
    pub build_directory: PathBuf,
    /// Default sender for deployment transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
}

impl StrudelConfig {
    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &PathBuf) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file, or from the default file
    /// name inside a directory.
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file or directory not found: {}",
                path.display()
            ));
        }

        let config_path = if path.is_dir() {
            path.join(STRUDELCONF_FILENAME)
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(config_path)
            .context(format!("Failed to read config from {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_config() -> StrudelConfig {
        StrudelConfig {
            rpc_url: "http://localhost:8545/".parse().unwrap(),
            fork_rpc_url: Some("http://localhost:8546/".parse().unwrap()),
            network_id: 1337,
            production: false,
            confirmations: 2,
            timeout_blocks: 70,
            build_directory: PathBuf::from("build/contracts"),
            from: None,
        }
    }

    #[test]
    fn test_config_toml_round_trip() {
        let config = example_config();
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: StrudelConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_optional_fields_default() {
        let parsed: StrudelConfig = toml::from_str(
            r#"
            rpc_url = "http://localhost:8545/"
            network_id = 1337
            build_directory = "build/contracts"
            "#,
        )
        .unwrap();
        assert!(!parsed.production);
        assert_eq!(parsed.confirmations, 0);
        assert_eq!(parsed.timeout_blocks, 0);
        assert!(parsed.fork_rpc_url.is_none());
        assert!(parsed.from.is_none());
    }
}
