use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    ArtifactStore, ChainClient, DeploymentRegistry, EtherscanVerifier, ExecutionReport, Executor,
    JsonRpcChainClient, OrchestratorError, RpcClient, StepDefinition, Verifier, catalog,
    network::{Credentials, NetworkId, NetworkProfile},
    scheduler::{schedule, select_tags},
    verification::ETHERSCAN_API_URL,
};

/// The default name for the pledgekit configuration file.
pub const CONFIG_FILENAME: &str = "Pledgekit.toml";

/// Prefix of the environment variables overriding configuration values.
pub const ENV_PREFIX: &str = "PLEDGE_";

/// RPC endpoint of a local development node.
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://127.0.0.1:8545";

/// Source verification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Base URL of the Etherscan compatible API.
    pub api_url: Url,
    /// Never written back to disk.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse(ETHERSCAN_API_URL).expect("Etherscan API URL is valid"),
            api_key: None,
        }
    }
}

/// Configuration of a deployment run.
///
/// This struct can be serialized to/from TOML format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployer {
    /// Target network.
    pub network: NetworkId,
    /// JSON-RPC endpoint of a node for `network`.
    pub rpc_url: Url,
    /// Root of the deployment records, one subdirectory per network.
    pub deployments: PathBuf,
    /// Hardhat artifacts directory.
    pub artifacts: PathBuf,
    /// Index of the unlocked node account sending the transactions.
    #[serde(default)]
    pub account_index: usize,
    /// Deploy every contract again, even when a matching record exists.
    #[serde(default)]
    pub redeploy: bool,
    /// Only run the steps carrying one of these tags, and what they need.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub verifier: VerifierConfig,
}

impl Deployer {
    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize deployer config to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file, with `PLEDGE_` environment overrides.
    ///
    /// `path` may be the file itself or the directory holding `Pledgekit.toml`.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file or directory not found: {}",
                path.display()
            ));
        }

        let config_path = if path.is_dir() {
            path.join(CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        };

        let config: Self = Figment::new()
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .context(format!("Failed to load config from {}", config_path.display()))?;
        tracing::info!(path = %config_path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Save the configuration next to the deployment records.
    pub fn save_config(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.deployments).context(format!(
            "Failed to create deployments directory {}",
            self.deployments.display()
        ))?;
        let config_path = self.deployments.join(CONFIG_FILENAME);
        self.save_to_file(&config_path)?;
        Ok(config_path)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            etherscan_api_key: self.verifier.api_key.clone(),
        }
    }

    /// Deploy the Pledge contracts to the configured network.
    pub async fn deploy(&self) -> Result<ExecutionReport> {
        tracing::info!(network = %self.network, rpc_url = %self.rpc_url, "Starting deployment");

        let profile = NetworkProfile::resolve(&self.network.to_string(), &self.credentials())?;

        let rpc = RpcClient::new(self.rpc_url.clone())?;
        let artifacts = ArtifactStore::new(&self.artifacts);
        let chain = JsonRpcChainClient::new(rpc, artifacts.clone(), self.account_index);
        let verifier = EtherscanVerifier::new(
            self.verifier.api_url.clone(),
            self.verifier.api_key.clone().unwrap_or_default(),
            profile.chain_id,
            artifacts,
        )?;

        Orchestrator::new(catalog::pledge_steps())
            .tags(self.tags.clone())
            .redeploy(self.redeploy)
            .run(&profile, &self.deployments, chain, verifier)
            .await
    }
}

/// Location of the per-user configuration file.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pledgekit").join(CONFIG_FILENAME))
}

/// Runs a set of steps against any chain client and verifier.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    steps: Vec<StepDefinition>,
    tags: Vec<String>,
    redeploy: bool,
}

impl Orchestrator {
    pub fn new(steps: Vec<StepDefinition>) -> Self {
        Self {
            steps,
            tags: Vec::new(),
            redeploy: false,
        }
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn redeploy(mut self, redeploy: bool) -> Self {
        self.redeploy = redeploy;
        self
    }

    /// Schedule the steps, check the chain and execute them.
    ///
    /// Structural problems (unknown network, bad graph, wrong chain) are returned as
    /// errors before anything is written. Runtime failures are carried by the report.
    pub async fn run<C: ChainClient, V: Verifier>(
        &self,
        profile: &NetworkProfile,
        deployments: &Path,
        chain: C,
        verifier: V,
    ) -> Result<ExecutionReport> {
        let selected = select_tags(&self.steps, &self.tags, profile)?;
        let ordered = schedule(&selected, profile)?;

        let actual = chain
            .chain_id()
            .await
            .context("Failed to query the chain id of the node")?;
        if actual != profile.chain_id {
            return Err(OrchestratorError::ChainIdMismatch {
                network: profile.id,
                expected: profile.chain_id,
                actual,
            }
            .into());
        }

        let deployer = chain
            .deployer()
            .await
            .context("Failed to resolve the deployer account")?;

        let registry = DeploymentRegistry::open(deployments, profile.id, profile.chain_id)
            .map_err(OrchestratorError::registry)?;

        tracing::info!(
            network = %profile.id,
            deployer = %deployer,
            steps = ordered.len(),
            "Executing deployment steps"
        );

        let report = Executor::new(chain, verifier, deployer)
            .redeploy(self.redeploy)
            .execute(&ordered, profile, &registry)
            .await;

        if report.is_success() {
            tracing::info!(
                network = %profile.id,
                deployed = report.deployed().count(),
                "Deployment complete"
            );
        }

        Ok(report)
    }
}
