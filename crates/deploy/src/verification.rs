//! Source verification of deployed contracts.
//!
//! Verification is best effort: the [`VerificationPipeline`] catches every verifier error,
//! logs it and records it in a [`VerificationLedger`] stored next to the deployment
//! records. A contract whose ledger entry is not marked verified is attempted again on
//! the next run, even when its deployment is reused.

use std::{
    collections::BTreeMap,
    future::Future,
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    ConstructorArg, DeploymentRecord, OrchestratorError, artifacts::ArtifactStore,
    network::NetworkProfile, registry::write_durable,
};

const LEDGER_FILENAME: &str = ".verifications.json";

/// Etherscan multichain API endpoint.
pub const ETHERSCAN_API_URL: &str = "https://api.etherscan.io/v2/api";

const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(5);
const STATUS_MAX_POLLS: usize = 24;

/// A deployed contract to verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    pub step: String,
    pub name: String,
    pub contract: String,
    pub address: Address,
    pub constructor_args: Vec<ConstructorArg>,
}

impl VerificationRequest {
    pub fn from_record(step: &str, record: &DeploymentRecord) -> Self {
        Self {
            step: step.to_string(),
            name: record.name.clone(),
            contract: record.contract.clone(),
            address: record.address,
            constructor_args: record.constructor_args.clone(),
        }
    }
}

/// Submits deployed contracts to a source verification service.
pub trait Verifier: Send + Sync {
    /// Verify one contract. Anything short of a confirmed verification is an error.
    fn verify(&self, request: &VerificationRequest) -> impl Future<Output = Result<()>> + Send;
}

/// Result of one verification attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub step_name: String,
    /// Logical record name of the contract.
    pub contract_name: String,
    pub address: Address,
    pub attempted: bool,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl VerificationOutcome {
    fn skipped(step: &str, record: &DeploymentRecord) -> Self {
        Self {
            step_name: step.to_string(),
            contract_name: record.name.clone(),
            address: record.address,
            attempted: false,
            succeeded: false,
            error_message: None,
        }
    }
}

/// Per-network record of verification attempts, keyed by logical name.
#[derive(Debug)]
pub struct VerificationLedger {
    path: PathBuf,
    entries: BTreeMap<String, VerificationOutcome>,
}

impl VerificationLedger {
    /// An empty ledger that will be written to `dir`.
    pub fn empty(dir: &Path) -> Self {
        Self {
            path: dir.join(LEDGER_FILENAME),
            entries: BTreeMap::new(),
        }
    }

    /// Load the ledger stored in a network's deployments directory.
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(LEDGER_FILENAME);
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .context(format!("Failed to read verification ledger {}", path.display()))?;
            serde_json::from_str(&content)
                .context(format!("Failed to parse verification ledger {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    /// Whether the contract currently deployed at `address` under `name` is verified.
    pub fn is_verified(&self, name: &str, address: Address) -> bool {
        self.entries
            .get(name)
            .is_some_and(|entry| entry.succeeded && entry.address == address)
    }

    pub fn get(&self, name: &str) -> Option<&VerificationOutcome> {
        self.entries.get(name)
    }

    /// Store an outcome, replacing any earlier one for the same name.
    pub fn record(&mut self, outcome: VerificationOutcome) -> Result<()> {
        self.entries.insert(outcome.contract_name.clone(), outcome);

        let json = serde_json::to_string_pretty(&self.entries)
            .context("Failed to serialize verification ledger")?;
        write_durable(&self.path, json.as_bytes()).context(format!(
            "Failed to commit verification ledger {}",
            self.path.display()
        ))
    }
}

/// Runs the verifier for deployed records without ever failing a run.
#[derive(Debug)]
pub struct VerificationPipeline<'a, V> {
    verifier: &'a V,
    ledger: VerificationLedger,
}

impl<'a, V: Verifier> VerificationPipeline<'a, V> {
    pub fn new(verifier: &'a V, ledger: VerificationLedger) -> Self {
        Self { verifier, ledger }
    }

    pub fn ledger(&self) -> &VerificationLedger {
        &self.ledger
    }

    /// Whether a reused record still needs a verification attempt.
    pub fn needs_verification(&self, record: &DeploymentRecord, profile: &NetworkProfile) -> bool {
        profile.verification_enabled && !self.ledger.is_verified(&record.name, record.address)
    }

    pub async fn verify(
        &mut self,
        step: &str,
        record: &DeploymentRecord,
        profile: &NetworkProfile,
    ) -> VerificationOutcome {
        if !profile.verification_enabled {
            return VerificationOutcome::skipped(step, record);
        }

        tracing::info!(step, name = %record.name, address = %record.address, "Verifying contract");

        let request = VerificationRequest::from_record(step, record);
        let result = self.verifier.verify(&request).await;

        let error_message = match result {
            Ok(()) => {
                tracing::info!(name = %record.name, "Contract verified");
                None
            }
            Err(err) => {
                let err = OrchestratorError::VerificationFailure {
                    contract: record.name.clone(),
                    reason: format!("{err:#}"),
                };
                tracing::warn!(step, error = %err, "Verification failed");
                Some(err.to_string())
            }
        };

        let outcome = VerificationOutcome {
            step_name: step.to_string(),
            contract_name: record.name.clone(),
            address: record.address,
            attempted: true,
            succeeded: error_message.is_none(),
            error_message,
        };

        if let Err(err) = self.ledger.record(outcome.clone()) {
            tracing::warn!(name = %record.name, error = %err, "Failed to store verification outcome");
        }

        outcome
    }
}

#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: serde_json::Value,
}

impl EtherscanResponse {
    fn result_text(&self) -> String {
        match &self.result {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug)]
enum StatusError {
    Pending,
    Failed(anyhow::Error),
}

/// [`Verifier`] backed by the Etherscan source verification API.
#[derive(Debug, Clone)]
pub struct EtherscanVerifier {
    client: reqwest::Client,
    api_url: Url,
    api_key: String,
    chain_id: u64,
    artifacts: ArtifactStore,
    poll_interval: Duration,
}

impl EtherscanVerifier {
    pub fn new(
        api_url: Url,
        api_key: impl Into<String>,
        chain_id: u64,
        artifacts: ArtifactStore,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url,
            api_key: api_key.into(),
            chain_id,
            artifacts,
            poll_interval: STATUS_POLL_INTERVAL,
        })
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn endpoint(&self) -> Url {
        let mut url = self.api_url.clone();
        url.query_pairs_mut()
            .append_pair("chainid", &self.chain_id.to_string());
        url
    }

    async fn submit(&self, request: &VerificationRequest) -> Result<String> {
        let artifact = self.artifacts.load(&request.contract)?;
        let build_info = self.artifacts.build_info(&request.contract)?;
        let source_code = serde_json::to_string(&build_info.input)
            .context("Failed to serialize compiler input")?;
        let constructor_args = hex::encode(ConstructorArg::abi_encode(&request.constructor_args));
        let address = request.address.to_string();
        let contract_name = artifact.qualified_name();
        let compiler_version = format!("v{}", build_info.solc_long_version);

        let form = [
            ("apikey", self.api_key.as_str()),
            ("module", "contract"),
            ("action", "verifysourcecode"),
            ("codeformat", "solidity-standard-json-input"),
            ("sourceCode", source_code.as_str()),
            ("contractaddress", address.as_str()),
            ("contractname", contract_name.as_str()),
            ("compilerversion", compiler_version.as_str()),
            ("constructorArguements", constructor_args.as_str()),
        ];

        let response: EtherscanResponse = self
            .client
            .post(self.endpoint())
            .form(&form)
            .send()
            .await
            .context("Failed to submit verification request")?
            .json()
            .await
            .context("Failed to parse verification response")?;

        if response.status != "1" {
            anyhow::bail!(
                "Verification submission rejected: {} ({})",
                response.result_text(),
                response.message
            );
        }

        Ok(response.result_text())
    }

    async fn check_status(&self, guid: &str) -> Result<(), StatusError> {
        let response: EtherscanResponse = self
            .client
            .get(self.endpoint())
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ])
            .send()
            .await
            .context("Failed to query verification status")
            .map_err(StatusError::Failed)?
            .json()
            .await
            .context("Failed to parse verification status")
            .map_err(StatusError::Failed)?;

        let result = response.result_text();
        if result.starts_with("Pending") {
            return Err(StatusError::Pending);
        }
        if response.status == "1" && result.starts_with("Pass") {
            return Ok(());
        }
        Err(StatusError::Failed(anyhow::anyhow!(
            "Verification failed: {}",
            result
        )))
    }
}

impl Verifier for EtherscanVerifier {
    async fn verify(&self, request: &VerificationRequest) -> Result<()> {
        let guid = self.submit(request).await?;
        tracing::debug!(name = %request.name, guid = %guid, "Verification submitted");

        let this = self;
        let guid = guid.as_str();
        (move || async move { this.check_status(guid).await })
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.poll_interval)
                    .with_max_times(STATUS_MAX_POLLS),
            )
            .when(|err| matches!(err, StatusError::Pending))
            .notify(|_, _| tracing::debug!(guid = %guid, "Verification pending"))
            .await
            .map_err(|err| match err {
                StatusError::Pending => {
                    anyhow::anyhow!("Verification of {} is still pending", request.name)
                }
                StatusError::Failed(err) => err,
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use alloy_core::primitives::address;
    use tempdir::TempDir;

    use super::*;
    use crate::network::{Credentials, NetworkId};

    const ORACLE: Address = address!("0x00000000000000000000000000000000000000bb");

    struct FlakyVerifier {
        calls: AtomicUsize,
        fail: bool,
    }

    impl Verifier for FlakyVerifier {
        async fn verify(&self, _request: &VerificationRequest) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("Fail - Unable to verify");
            }
            Ok(())
        }
    }

    fn record() -> DeploymentRecord {
        DeploymentRecord {
            name: "BscPledgeOracle".to_string(),
            contract: "BscPledgeOracle".to_string(),
            address: ORACLE,
            constructor_args: vec![],
            network: NetworkId::Sepolia,
            fingerprint: "f".repeat(64),
            transaction_hash: None,
            deployed_at: 0,
        }
    }

    fn verifier(fail: bool) -> FlakyVerifier {
        FlakyVerifier {
            calls: AtomicUsize::new(0),
            fail,
        }
    }

    #[tokio::test]
    async fn test_disabled_verification_is_a_noop() {
        let temp_dir = TempDir::new("pledgekit-test").expect("Failed to create temp dir");
        let profile = NetworkProfile::resolve("sepolia", &Credentials::default()).unwrap();
        let verifier = verifier(false);
        let mut pipeline =
            VerificationPipeline::new(&verifier, VerificationLedger::empty(temp_dir.path()));

        let outcome = pipeline.verify("bscPledgeOracle", &record(), &profile).await;

        assert!(!outcome.attempted);
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
        assert!(!temp_dir.path().join(LEDGER_FILENAME).exists());
    }

    #[tokio::test]
    async fn test_failure_is_recorded_not_raised() {
        let temp_dir = TempDir::new("pledgekit-test").expect("Failed to create temp dir");
        let profile =
            NetworkProfile::resolve("sepolia", &Credentials::with_etherscan_api_key("KEY")).unwrap();
        let verifier = verifier(true);
        let mut pipeline =
            VerificationPipeline::new(&verifier, VerificationLedger::empty(temp_dir.path()));

        let outcome = pipeline.verify("bscPledgeOracle", &record(), &profile).await;

        assert!(outcome.attempted);
        assert!(!outcome.succeeded);
        assert!(outcome.error_message.unwrap().contains("Unable to verify"));
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);
        assert!(pipeline.needs_verification(&record(), &profile));
    }

    #[tokio::test]
    async fn test_success_persists_in_ledger() {
        let temp_dir = TempDir::new("pledgekit-test").expect("Failed to create temp dir");
        let profile =
            NetworkProfile::resolve("sepolia", &Credentials::with_etherscan_api_key("KEY")).unwrap();

        let verifier = verifier(false);
        let mut first =
            VerificationPipeline::new(&verifier, VerificationLedger::open(temp_dir.path()).unwrap());
        assert!(first.verify("bscPledgeOracle", &record(), &profile).await.succeeded);

        let reopened = VerificationLedger::open(temp_dir.path()).unwrap();
        assert!(reopened.is_verified("BscPledgeOracle", ORACLE));
        assert!(!reopened.is_verified("BscPledgeOracle", Address::ZERO));
        assert!(!reopened.is_verified("PledgePool", ORACLE));
    }

    #[tokio::test]
    async fn test_ledger_write_replaces_file_in_place() {
        let temp_dir = TempDir::new("pledgekit-test").expect("Failed to create temp dir");
        let profile =
            NetworkProfile::resolve("sepolia", &Credentials::with_etherscan_api_key("KEY")).unwrap();

        let verifier = verifier(false);
        let mut pipeline =
            VerificationPipeline::new(&verifier, VerificationLedger::open(temp_dir.path()).unwrap());
        pipeline.verify("bscPledgeOracle", &record(), &profile).await;
        pipeline.verify("bscPledgeOracle", &record(), &profile).await;

        let files: Vec<String> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files, vec![LEDGER_FILENAME.to_string()]);
    }

    #[test]
    fn test_etherscan_endpoint_carries_chain_id() {
        let verifier = EtherscanVerifier::new(
            Url::parse(ETHERSCAN_API_URL).unwrap(),
            "KEY",
            11155111,
            ArtifactStore::new("artifacts"),
        )
        .unwrap();

        assert_eq!(
            verifier.endpoint().as_str(),
            "https://api.etherscan.io/v2/api?chainid=11155111"
        );
    }

    #[test]
    fn test_response_result_text() {
        let response: EtherscanResponse = serde_json::from_value(serde_json::json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Already Verified",
        }))
        .unwrap();
        assert_eq!(response.result_text(), "Already Verified");
    }
}
