//! Network profiles.
//!
//! A [`NetworkProfile`] is resolved once per run and threaded through the scheduler,
//! the executor and the verification pipeline. New networks are added here, as a new
//! [`NetworkId`] and a new table entry, never as branches in the executor.

use std::collections::BTreeMap;

use alloy_core::primitives::{Address, address};
use serde::{Deserialize, Serialize};

use crate::{
    OrchestratorError,
    catalog::{
        BSC_PLEDGE_ORACLE, BSC_PLEDGE_ORACLE_RECORD, MOCK_ORACLE, MOCK_ORACLE_RECORD,
        MOCK_SWAP_ROUTER, ROUTER_RECORD,
    },
};

/// Logical slot for the swap router used by the pledge pool.
pub const SWAP_ROUTER: &str = "swapRouter";
/// Logical slot for the price oracle used by the pledge pool.
pub const ORACLE: &str = "oracle";
/// Logical slot for the account collecting pool fees.
pub const FEE_ADDRESS: &str = "feeAddress";

/// Chain id shared by the in-process and standalone local nodes.
pub const LOCAL_CHAIN_ID: u64 = 31337;
/// Sepolia chain id.
pub const SEPOLIA_CHAIN_ID: u64 = 11155111;
/// BSC testnet chain id.
pub const BSC_TESTNET_CHAIN_ID: u64 = 97;

/// Uniswap V2 router on Sepolia.
pub const SEPOLIA_SWAP_ROUTER: Address = address!("0xeE567Fe1712Faf6149d80dA1E6934E354124CfE3");
/// PancakeSwap router on BSC testnet.
pub const BSC_TESTNET_SWAP_ROUTER: Address =
    address!("0xD99D1c33F9fC3444f8101754aBC46c52416550D1");

/// The networks a run can target.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum NetworkId {
    Hardhat,
    Localhost,
    Sepolia,
    BscTestnet,
}

impl NetworkId {
    pub fn chain_id(&self) -> u64 {
        match self {
            NetworkId::Hardhat | NetworkId::Localhost => LOCAL_CHAIN_ID,
            NetworkId::Sepolia => SEPOLIA_CHAIN_ID,
            NetworkId::BscTestnet => BSC_TESTNET_CHAIN_ID,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, NetworkId::Hardhat | NetworkId::Localhost)
    }

    /// Environment variable holding the RPC endpoint of a public network.
    pub fn rpc_url_env(&self) -> Option<&'static str> {
        match self {
            NetworkId::Hardhat | NetworkId::Localhost => None,
            NetworkId::Sepolia => Some("SEPOLIA_URL"),
            NetworkId::BscTestnet => Some("BSC_TESTNET_URL"),
        }
    }

    /// Whether the remote verifier supports this network at all.
    fn supports_verification(&self) -> bool {
        matches!(self, NetworkId::Sepolia)
    }
}

/// Where the address for an auxiliary slot comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AuxiliarySource {
    /// A well-known address hardcoded for the network.
    Fixed { address: Address },
    /// A record registered by another step during this or a prior run.
    Deployed { step: String, record: String },
    /// The operator account sending the deploy transactions.
    Deployer,
}

impl AuxiliarySource {
    fn deployed(step: &str, record: &str) -> Self {
        Self::Deployed {
            step: step.to_string(),
            record: record.to_string(),
        }
    }
}

/// Operator-supplied secrets that influence the profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub etherscan_api_key: Option<String>,
}

impl Credentials {
    pub fn with_etherscan_api_key(api_key: impl Into<String>) -> Self {
        Self {
            etherscan_api_key: Some(api_key.into()),
        }
    }

    fn has_verifier_key(&self) -> bool {
        self.etherscan_api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

/// Everything a run needs to know about its target network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProfile {
    pub id: NetworkId,
    pub chain_id: u64,
    pub is_local: bool,
    pub auxiliary: BTreeMap<String, AuxiliarySource>,
    pub verification_enabled: bool,
}

impl NetworkProfile {
    /// Resolve the profile for a network identifier.
    ///
    /// Local networks defer the swap router and oracle slots to the mock steps; public
    /// networks use the hardcoded router of the chain and the deployed production oracle.
    pub fn resolve(network: &str, credentials: &Credentials) -> Result<Self, OrchestratorError> {
        let id: NetworkId = network
            .parse()
            .map_err(|_| OrchestratorError::UnsupportedNetwork(network.to_string()))?;

        let mut auxiliary = BTreeMap::new();
        auxiliary.insert(FEE_ADDRESS.to_string(), AuxiliarySource::Deployer);

        match id {
            NetworkId::Hardhat | NetworkId::Localhost => {
                auxiliary.insert(
                    SWAP_ROUTER.to_string(),
                    AuxiliarySource::deployed(MOCK_SWAP_ROUTER, ROUTER_RECORD),
                );
                auxiliary.insert(
                    ORACLE.to_string(),
                    AuxiliarySource::deployed(MOCK_ORACLE, MOCK_ORACLE_RECORD),
                );
            }
            NetworkId::Sepolia => {
                auxiliary.insert(
                    SWAP_ROUTER.to_string(),
                    AuxiliarySource::Fixed {
                        address: SEPOLIA_SWAP_ROUTER,
                    },
                );
                auxiliary.insert(
                    ORACLE.to_string(),
                    AuxiliarySource::deployed(BSC_PLEDGE_ORACLE, BSC_PLEDGE_ORACLE_RECORD),
                );
            }
            NetworkId::BscTestnet => {
                auxiliary.insert(
                    SWAP_ROUTER.to_string(),
                    AuxiliarySource::Fixed {
                        address: BSC_TESTNET_SWAP_ROUTER,
                    },
                );
                auxiliary.insert(
                    ORACLE.to_string(),
                    AuxiliarySource::deployed(BSC_PLEDGE_ORACLE, BSC_PLEDGE_ORACLE_RECORD),
                );
            }
        }

        let verification_enabled = id.supports_verification() && credentials.has_verifier_key();

        tracing::debug!(
            network = %id,
            chain_id = id.chain_id(),
            verification_enabled,
            "Resolved network profile"
        );

        Ok(Self {
            id,
            chain_id: id.chain_id(),
            is_local: id.is_local(),
            auxiliary,
            verification_enabled,
        })
    }

    /// Look up how an auxiliary slot is satisfied on this network.
    pub fn auxiliary(&self, slot: &str) -> Option<&AuxiliarySource> {
        self.auxiliary.get(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_unknown_network() {
        let err = NetworkProfile::resolve("mainnet", &Credentials::default()).unwrap_err();
        assert_eq!(err, OrchestratorError::UnsupportedNetwork("mainnet".to_string()));
    }

    #[test]
    fn test_local_profile_defers_to_mocks() {
        let profile = NetworkProfile::resolve("hardhat", &Credentials::default()).unwrap();
        assert!(profile.is_local);
        assert_eq!(profile.chain_id, LOCAL_CHAIN_ID);
        assert_eq!(
            profile.auxiliary(SWAP_ROUTER),
            Some(&AuxiliarySource::deployed(MOCK_SWAP_ROUTER, ROUTER_RECORD))
        );
        assert_eq!(profile.auxiliary(FEE_ADDRESS), Some(&AuxiliarySource::Deployer));
    }

    #[test]
    fn test_public_profile_uses_fixed_router() {
        let profile = NetworkProfile::resolve("bscTestnet", &Credentials::default()).unwrap();
        assert!(!profile.is_local);
        assert_eq!(profile.chain_id, 97);
        assert_eq!(
            profile.auxiliary(SWAP_ROUTER),
            Some(&AuxiliarySource::Fixed {
                address: BSC_TESTNET_SWAP_ROUTER
            })
        );
    }

    #[test]
    fn test_verification_requires_key_and_network() {
        let key = Credentials::with_etherscan_api_key("KEY");

        let sepolia = NetworkProfile::resolve("sepolia", &key).unwrap();
        assert!(sepolia.verification_enabled);

        let sepolia_no_key = NetworkProfile::resolve("sepolia", &Credentials::default()).unwrap();
        assert!(!sepolia_no_key.verification_enabled);

        let blank_key = Credentials::with_etherscan_api_key("  ");
        assert!(!NetworkProfile::resolve("sepolia", &blank_key).unwrap().verification_enabled);

        let local = NetworkProfile::resolve("localhost", &key).unwrap();
        assert!(!local.verification_enabled);

        let bsc = NetworkProfile::resolve("bscTestnet", &key).unwrap();
        assert!(!bsc.verification_enabled);
    }

    #[test]
    fn test_network_id_round_trips_through_strings() {
        assert_eq!("bscTestnet".parse::<NetworkId>().unwrap(), NetworkId::BscTestnet);
        assert_eq!(NetworkId::BscTestnet.to_string(), "bscTestnet");
        assert_eq!(NetworkId::Hardhat.to_string(), "hardhat");
    }
}
