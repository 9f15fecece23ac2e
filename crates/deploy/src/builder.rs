//! Builder module for creating a [`Deployer`] configuration.
//!
//! Values set on the [`DeployerBuilder`] win over the project `Pledgekit.toml`, which
//! wins over the per-user configuration file. `PLEDGE_` environment variables override
//! both files. Whatever is still unset falls back to per-network defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use url::Url;

use crate::{
    Deployer,
    deployer::{CONFIG_FILENAME, DEFAULT_LOCAL_RPC_URL, ENV_PREFIX, VerifierConfig, user_config_path},
    network::NetworkId,
};

/// Default deployments directory, relative to the working directory.
pub const DEFAULT_DEPLOYMENTS_DIR: &str = "deployments";
/// Default Hardhat artifacts directory, relative to the working directory.
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// Settings read from configuration files and the environment. Every field is optional.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    network: Option<NetworkId>,
    rpc_url: Option<Url>,
    deployments: Option<PathBuf>,
    artifacts: Option<PathBuf>,
    account_index: Option<usize>,
    redeploy: Option<bool>,
    tags: Option<Vec<String>>,
    verifier: Option<FileVerifierConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct FileVerifierConfig {
    api_url: Option<Url>,
}

/// Builder for creating a [`Deployer`] configuration.
///
/// # Example
///
/// ```no_run
/// use pledgekit_deploy::{DeployerBuilder, NetworkId};
///
/// # async fn example() -> anyhow::Result<()> {
/// let report = DeployerBuilder::new()
///     .network(NetworkId::Localhost)
///     .tags(vec!["pledgePool".to_string()])
///     .build()?
///     .deploy()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct DeployerBuilder {
    network: Option<NetworkId>,
    rpc_url: Option<Url>,
    deployments: Option<PathBuf>,
    artifacts: Option<PathBuf>,
    account_index: Option<usize>,
    redeploy: Option<bool>,
    tags: Option<Vec<String>>,
    etherscan_api_key: Option<String>,
    /// Explicit configuration file, instead of `./Pledgekit.toml`.
    config: Option<PathBuf>,
    /// Skip the per-user configuration file.
    no_user_config: bool,
}

impl DeployerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn network(mut self, network: NetworkId) -> Self {
        self.network = Some(network);
        self
    }

    /// Set the RPC endpoint.
    ///
    /// If not set, local networks use `http://127.0.0.1:8545` and public networks read
    /// `SEPOLIA_URL` or `BSC_TESTNET_URL`.
    pub fn rpc_url(mut self, url: Url) -> Self {
        self.rpc_url = Some(url);
        self
    }

    pub fn deployments(mut self, path: impl Into<PathBuf>) -> Self {
        self.deployments = Some(path.into());
        self
    }

    pub fn artifacts(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifacts = Some(path.into());
        self
    }

    pub fn account_index(mut self, index: usize) -> Self {
        self.account_index = Some(index);
        self
    }

    pub fn redeploy(mut self, redeploy: bool) -> Self {
        self.redeploy = Some(redeploy);
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn etherscan_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.etherscan_api_key = Some(api_key.into());
        self
    }

    pub fn config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = Some(path.into());
        self
    }

    pub fn no_user_config(mut self, no_user_config: bool) -> Self {
        self.no_user_config = no_user_config;
        self
    }

    fn load_files(&self) -> Result<FileConfig> {
        let mut figment = Figment::new();

        if !self.no_user_config {
            if let Some(user_config) = user_config_path() {
                figment = figment.merge(Toml::file(user_config));
            }
        }

        let project_config = match &self.config {
            Some(path) if path.is_dir() => path.join(CONFIG_FILENAME),
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Configuration file not found: {}", path.display());
                }
                path.clone()
            }
            None => PathBuf::from(CONFIG_FILENAME),
        };

        figment
            .merge(Toml::file(&project_config))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .context("Failed to load pledgekit configuration")
    }

    /// Build the [`Deployer`] configuration.
    pub fn build(self) -> Result<Deployer> {
        let file = self.load_files()?;

        let network = self
            .network
            .or(file.network)
            .unwrap_or(NetworkId::Hardhat);

        let rpc_url = match self.rpc_url.or(file.rpc_url) {
            Some(url) => url,
            None => default_rpc_url(network)?,
        };

        let verifier = VerifierConfig {
            api_url: file
                .verifier
                .and_then(|v| v.api_url)
                .unwrap_or_else(|| VerifierConfig::default().api_url),
            api_key: self.etherscan_api_key.filter(|key| !key.trim().is_empty()),
        };

        let deployer = Deployer {
            network,
            rpc_url,
            deployments: self
                .deployments
                .or(file.deployments)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DEPLOYMENTS_DIR)),
            artifacts: self
                .artifacts
                .or(file.artifacts)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACTS_DIR)),
            account_index: self.account_index.or(file.account_index).unwrap_or_default(),
            redeploy: self.redeploy.or(file.redeploy).unwrap_or_default(),
            tags: self.tags.or(file.tags).unwrap_or_default(),
            verifier,
        };

        tracing::info!(
            network = %deployer.network,
            rpc_url = %deployer.rpc_url,
            deployments = %deployer.deployments.display(),
            "Building deployer configuration..."
        );

        Ok(deployer)
    }
}

/// RPC endpoint used when none is configured.
pub fn default_rpc_url(network: NetworkId) -> Result<Url> {
    let url = match network.rpc_url_env() {
        None => DEFAULT_LOCAL_RPC_URL.to_string(),
        Some(var) => std::env::var(var).context(format!(
            "No RPC URL for {}: pass --rpc-url or set {}",
            network, var
        ))?,
    };
    Url::parse(&url).context(format!("Invalid RPC URL: {}", url))
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = DeployerBuilder::new();
        assert!(builder.network.is_none());
        assert!(builder.rpc_url.is_none());
        assert!(builder.tags.is_none());
        assert!(!builder.no_user_config);
    }

    #[test]
    fn test_local_build_uses_defaults() {
        let temp_dir = TempDir::new("pledgekit-test").expect("Failed to create temp dir");
        let deployer = DeployerBuilder::new()
            .network(NetworkId::Localhost)
            .config(temp_dir.path())
            .no_user_config(true)
            .build()
            .unwrap();

        assert_eq!(deployer.rpc_url.as_str(), "http://127.0.0.1:8545/");
        assert_eq!(deployer.deployments, PathBuf::from(DEFAULT_DEPLOYMENTS_DIR));
        assert_eq!(deployer.artifacts, PathBuf::from(DEFAULT_ARTIFACTS_DIR));
        assert!(!deployer.redeploy);
        assert!(deployer.tags.is_empty());
    }

    #[test]
    fn test_builder_values_override_config_file() {
        let temp_dir = TempDir::new("pledgekit-test").expect("Failed to create temp dir");
        std::fs::write(
            temp_dir.path().join(CONFIG_FILENAME),
            r#"
network = "bscTestnet"
rpc_url = "https://bsc.example.org"
deployments = "out/deployments"
tags = ["DebtToken"]
"#,
        )
        .unwrap();

        let from_file = DeployerBuilder::new()
            .config(temp_dir.path())
            .no_user_config(true)
            .build()
            .unwrap();
        assert_eq!(from_file.network, NetworkId::BscTestnet);
        assert_eq!(from_file.rpc_url.as_str(), "https://bsc.example.org/");
        assert_eq!(from_file.deployments, PathBuf::from("out/deployments"));
        assert_eq!(from_file.tags, vec!["DebtToken".to_string()]);

        let overridden = DeployerBuilder::new()
            .config(temp_dir.path())
            .no_user_config(true)
            .deployments("elsewhere")
            .tags(vec!["pledgePool".to_string()])
            .build()
            .unwrap();
        assert_eq!(overridden.network, NetworkId::BscTestnet);
        assert_eq!(overridden.deployments, PathBuf::from("elsewhere"));
        assert_eq!(overridden.tags, vec!["pledgePool".to_string()]);
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let temp_dir = TempDir::new("pledgekit-test").expect("Failed to create temp dir");
        let result = DeployerBuilder::new()
            .config(temp_dir.path().join("missing.toml"))
            .no_user_config(true)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_blank_api_key_is_ignored() {
        let temp_dir = TempDir::new("pledgekit-test").expect("Failed to create temp dir");
        let deployer = DeployerBuilder::new()
            .config(temp_dir.path())
            .no_user_config(true)
            .etherscan_api_key(" ")
            .build()
            .unwrap();
        assert!(deployer.verifier.api_key.is_none());
    }
}
