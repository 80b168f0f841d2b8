use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

/// Well-known networks, addressable by name instead of numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum NetworkName {
    Mainnet,
    Morden,
    Ropsten,
    Rinkeby,
    Kovan,
    Development,
    #[strum(serialize = "{0}")]
    Custom(u64),
}

impl NetworkName {
    pub fn to_network_id(self) -> u64 {
        match self {
            NetworkName::Mainnet => 1,
            NetworkName::Morden => 2,
            NetworkName::Ropsten => 3,
            NetworkName::Rinkeby => 4,
            NetworkName::Kovan => 42,
            NetworkName::Development => 1337,
            NetworkName::Custom(id) => id,
        }
    }
}

#[derive(Parser)]
#[command(name = "strudel")]
#[command(
    author,
    version,
    about = "Deploy contract artifacts with a production-safe migration workflow"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "STRUDEL_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the Strudel.toml configuration file, or a directory containing
    /// one.
    #[arg(long, alias = "conf", env = "STRUDEL_CONFIG", default_value = strudel_deploy::STRUDELCONF_FILENAME)]
    pub config: PathBuf,

    /// The target network (name or numeric id). Overrides the configured
    /// network id.
    #[arg(long, env = "STRUDEL_NETWORK")]
    pub network: Option<NetworkName>,

    /// Redeploy every contract, including ones already recorded on this
    /// network.
    #[arg(long, env = "STRUDEL_RESET", default_value_t = false)]
    pub reset: bool,

    /// Recompile all contracts before migrating.
    ///
    /// Compilation is delegated to the external contract compiler; strudel
    /// only deploys what it finds in the build directory.
    #[arg(long = "compile-all", env = "STRUDEL_COMPILE_ALL", default_value_t = false)]
    pub compile_all: bool,

    /// Run migrations against an in-memory fork, for testing.
    #[arg(long = "dry-run", env = "STRUDEL_DRY_RUN", default_value_t = false)]
    pub dry_run: bool,

    /// Artifact index to run migrations from.
    #[arg(short = 'f', long = "from", value_name = "NUMBER")]
    pub run_from: Option<usize>,

    /// Manually authorize the production deployment after seeing the
    /// rehearsal.
    #[arg(long, env = "STRUDEL_INTERACTIVE", default_value_t = false)]
    pub interactive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_network_names_resolve() {
        assert_eq!(NetworkName::from_str("mainnet").unwrap().to_network_id(), 1);
        assert_eq!(NetworkName::from_str("kovan").unwrap().to_network_id(), 42);
        assert_eq!(
            NetworkName::from_str("development").unwrap().to_network_id(),
            1337
        );
    }
}
