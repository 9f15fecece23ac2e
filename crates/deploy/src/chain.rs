//! Chain client used to create contracts.

use std::{future::Future, time::Duration};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use backon::{ConstantBuilder, Retryable};
use serde::Deserialize;

use crate::{
    ConstructorArg,
    artifacts::ArtifactStore,
    rpc::{RpcClient, parse_quantity},
};

/// Interval between receipt polls.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default time to wait for a deploy transaction to be mined.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

/// A contract creation to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    /// Step the deployment belongs to.
    pub step: String,
    /// Logical record name.
    pub name: String,
    /// Artifact to instantiate.
    pub contract: String,
    pub constructor_args: Vec<ConstructorArg>,
    /// Account sending the creation transaction.
    pub from: Address,
}

/// Result of a successful contract creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedContract {
    pub address: Address,
    pub transaction_hash: Option<String>,
}

/// Creates contracts on the target chain.
///
/// Implementations own their transport, signing and per-call timeouts. A failed
/// `deploy` is never retried by the caller within a run.
pub trait ChainClient: Send + Sync {
    /// Chain id reported by the connected node.
    fn chain_id(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Account the deploy transactions are sent from.
    fn deployer(&self) -> impl Future<Output = Result<Address>> + Send;

    /// Hash of the creation bytecode of `contract`, when known.
    fn bytecode_hash(&self, contract: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Whether runtime code is deployed at `address`.
    ///
    /// A recorded deployment without code, as after a local node restart, must not be reused.
    fn code_exists(&self, address: Address) -> impl Future<Output = Result<bool>> + Send;

    fn deploy(&self, request: &DeployRequest) -> impl Future<Output = Result<DeployedContract>> + Send;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    contract_address: Option<Address>,
}

/// [`ChainClient`] sending creation transactions from an account unlocked on the node.
#[derive(Debug, Clone)]
pub struct JsonRpcChainClient {
    rpc: RpcClient,
    artifacts: ArtifactStore,
    account_index: usize,
    receipt_timeout: Duration,
}

impl JsonRpcChainClient {
    pub fn new(rpc: RpcClient, artifacts: ArtifactStore, account_index: usize) -> Self {
        Self {
            rpc,
            artifacts,
            account_index,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }

    pub fn receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    async fn fetch_receipt(rpc: &RpcClient, tx_hash: &str) -> Result<TransactionReceipt> {
        let receipt: Option<TransactionReceipt> = rpc
            .call("eth_getTransactionReceipt", vec![serde_json::json!(tx_hash)])
            .await?;
        receipt.context(format!("Transaction {} is not mined yet", tx_hash))
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TransactionReceipt> {
        let max_polls = (self.receipt_timeout.as_millis() / RECEIPT_POLL_INTERVAL.as_millis())
            .max(1) as usize;
        let rpc = &self.rpc;

        (move || async move { Self::fetch_receipt(rpc, tx_hash).await })
            .retry(
                ConstantBuilder::default()
                    .with_delay(RECEIPT_POLL_INTERVAL)
                    .with_max_times(max_polls),
            )
            .notify(|err, _| tracing::trace!(tx_hash, error = %err, "Waiting for receipt"))
            .await
            .context(format!(
                "No receipt for transaction {} after {:?}",
                tx_hash, self.receipt_timeout
            ))
    }
}

impl ChainClient for JsonRpcChainClient {
    async fn chain_id(&self) -> Result<u64> {
        let chain_id: String = self.rpc.call("eth_chainId", vec![]).await?;
        parse_quantity(&chain_id)
    }

    async fn deployer(&self) -> Result<Address> {
        let accounts: Vec<Address> = self.rpc.call("eth_accounts", vec![]).await?;
        accounts.get(self.account_index).copied().context(format!(
            "Node exposes {} unlocked accounts, account #{} is not available",
            accounts.len(),
            self.account_index
        ))
    }

    async fn bytecode_hash(&self, contract: &str) -> Result<Option<String>> {
        let artifact = self.artifacts.load(contract)?;
        Ok(Some(artifact.bytecode_hash()?))
    }

    async fn code_exists(&self, address: Address) -> Result<bool> {
        let code: String = self
            .rpc
            .call(
                "eth_getCode",
                vec![serde_json::json!(address), serde_json::json!("latest")],
            )
            .await
            .context(format!("Failed to fetch code at {}", address))?;
        Ok(has_code(&code))
    }

    async fn deploy(&self, request: &DeployRequest) -> Result<DeployedContract> {
        let artifact = self.artifacts.load(&request.contract)?;
        let mut data = artifact.creation_code()?;
        data.extend(ConstructorArg::abi_encode(&request.constructor_args));

        tracing::debug!(
            name = %request.name,
            contract = %request.contract,
            from = %request.from,
            size = data.len(),
            "Sending creation transaction"
        );

        let tx_hash: String = self
            .rpc
            .call(
                "eth_sendTransaction",
                vec![serde_json::json!({
                    "from": request.from,
                    "data": format!("0x{}", hex::encode(&data)),
                })],
            )
            .await
            .context(format!("Failed to send creation transaction for {}", request.name))?;

        tracing::debug!(name = %request.name, tx_hash = %tx_hash, "Creation transaction sent");

        let receipt = self.wait_for_receipt(&tx_hash).await?;

        if let Some(status) = receipt.status.as_deref() {
            if parse_quantity(status)? == 0 {
                anyhow::bail!("Creation transaction {} reverted", tx_hash);
            }
        }

        let address = receipt.contract_address.context(format!(
            "Receipt of {} has no contract address",
            tx_hash
        ))?;

        Ok(DeployedContract {
            address,
            transaction_hash: Some(tx_hash),
        })
    }
}

fn has_code(code: &str) -> bool {
    !code.strip_prefix("0x").unwrap_or(code).is_empty()
}
