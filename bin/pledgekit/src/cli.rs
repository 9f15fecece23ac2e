use clap::Parser;
use pledgekit_deploy::NetworkId;
use tracing::level_filters::LevelFilter;
use url::Url;

/// How the final report is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser)]
#[command(name = "pledgekit")]
#[command(
    author,
    version,
    about = "Deploy the Pledge contracts to a local node or a public testnet"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "PLEDGE_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// The target network: hardhat, localhost, sepolia or bscTestnet.
    ///
    /// If not provided, the network from the configuration file is used, then hardhat.
    #[arg(short, long, env = "PLEDGE_NETWORK")]
    pub network: Option<NetworkId>,

    /// The URL of a JSON-RPC endpoint for the network.
    ///
    /// Local networks default to http://127.0.0.1:8545. Public networks default to the
    /// SEPOLIA_URL or BSC_TESTNET_URL environment variables.
    #[arg(long, alias = "rpc", env = "PLEDGE_RPC_URL")]
    pub rpc_url: Option<Url>,

    /// Root directory of the deployment records.
    ///
    /// If not provided, records are stored at: ./deployments/<network>
    #[arg(long, env = "PLEDGE_DEPLOYMENTS")]
    pub deployments: Option<String>,

    /// Path to the Hardhat artifacts directory.
    #[arg(long, env = "PLEDGE_ARTIFACTS")]
    pub artifacts: Option<String>,

    /// Index of the unlocked node account used to send transactions.
    #[arg(long, env = "PLEDGE_ACCOUNT_INDEX")]
    pub account_index: Option<usize>,

    /// API key of the source verifier. Verification is skipped without it.
    #[arg(long, env = "ETHERSCAN_API_KEY", hide_env_values = true)]
    pub etherscan_api_key: Option<String>,

    /// Redeploy all contracts.
    /// If not provided, contracts already deployed with the same inputs are reused.
    #[arg(long, env = "PLEDGE_REDEPLOY", default_value_t = false)]
    pub redeploy: bool,

    /// Only deploy the steps carrying one of these tags, and what they depend on.
    #[arg(long, value_delimiter = ',', env = "PLEDGE_TAGS")]
    pub tags: Vec<String>,

    /// Path to a Pledgekit.toml configuration file, or the directory holding one.
    ///
    /// If not provided, ./Pledgekit.toml is used when it exists.
    #[arg(long, alias = "conf", env = "PLEDGE_CONFIG")]
    pub config: Option<String>,

    /// Ignore the per-user configuration file.
    #[arg(long, env = "PLEDGE_NO_USER_CONFIG")]
    pub no_user_config: bool,

    /// How to print the deployment report.
    #[arg(long, env = "PLEDGE_OUTPUT", default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["pledgekit"]).unwrap();
        assert_eq!(cli.verbosity, LevelFilter::INFO);
        assert!(cli.network.is_none());
        assert!(cli.tags.is_empty());
        assert!(!cli.redeploy);
        assert_eq!(cli.output, OutputFormat::Table);
    }

    #[test]
    fn test_network_and_tags() {
        let cli = Cli::try_parse_from([
            "pledgekit",
            "--network",
            "bscTestnet",
            "--tags",
            "DebtToken,pledgePool",
            "--output",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.network, Some(NetworkId::BscTestnet));
        assert_eq!(cli.tags, vec!["DebtToken".to_string(), "pledgePool".to_string()]);
        assert_eq!(cli.output, OutputFormat::Json);
    }

    #[test]
    fn test_unknown_network_is_rejected() {
        assert!(Cli::try_parse_from(["pledgekit", "--network", "mainnet"]).is_err());
    }
}
