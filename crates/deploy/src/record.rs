use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, U256},
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::network::NetworkId;

/// A constructor argument value, kept in records for audit and verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ConstructorArg {
    Address(Address),
    AddressList(Vec<Address>),
    Uint(U256),
    String(String),
    Bool(bool),
}

impl ConstructorArg {
    pub fn uint(value: u64) -> Self {
        Self::Uint(U256::from(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    fn to_sol_value(&self) -> DynSolValue {
        match self {
            ConstructorArg::Address(address) => DynSolValue::Address(*address),
            ConstructorArg::AddressList(addresses) => {
                DynSolValue::Array(addresses.iter().copied().map(DynSolValue::Address).collect())
            }
            ConstructorArg::Uint(value) => DynSolValue::Uint(*value, 256),
            ConstructorArg::String(value) => DynSolValue::String(value.clone()),
            ConstructorArg::Bool(value) => DynSolValue::Bool(*value),
        }
    }

    /// ABI-encode a constructor argument list, as appended to the creation bytecode.
    pub fn abi_encode(args: &[ConstructorArg]) -> Vec<u8> {
        if args.is_empty() {
            return Vec::new();
        }
        DynSolValue::Tuple(args.iter().map(Self::to_sol_value).collect()).abi_encode_params()
    }
}

impl std::fmt::Display for ConstructorArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstructorArg::Address(address) => write!(f, "{address}"),
            ConstructorArg::AddressList(addresses) => {
                let items: Vec<String> = addresses.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
            ConstructorArg::Uint(value) => write!(f, "{value}"),
            ConstructorArg::String(value) => write!(f, "{value:?}"),
            ConstructorArg::Bool(value) => write!(f, "{value}"),
        }
    }
}

/// Inputs that, when changed, require a contract to be redeployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentFingerprint<'a> {
    /// Artifact the contract is created from.
    pub contract: &'a str,
    /// Hash of the creation bytecode, when the chain client can provide it.
    pub bytecode_hash: Option<&'a str>,
    /// Constructor arguments, in order.
    pub constructor_args: &'a [ConstructorArg],
}

impl DeploymentFingerprint<'_> {
    /// Compute a SHA-256 hex digest of the fingerprint inputs.
    pub fn compute_hash(&self) -> String {
        let json = serde_json::to_string(self)
            .expect("DeploymentFingerprint serialization should never fail");

        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A contract deployed under a logical name on one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    /// Logical name, unique per network.
    pub name: String,
    /// Artifact the contract was created from.
    pub contract: String,
    pub address: Address,
    pub constructor_args: Vec<ConstructorArg>,
    pub network: NetworkId,
    /// See [`DeploymentFingerprint`].
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    /// Unix timestamp of the deployment.
    pub deployed_at: i64,
}

impl DeploymentRecord {
    /// Whether this record was produced from exactly these inputs.
    pub fn matches(&self, fingerprint: &str) -> bool {
        self.fingerprint == fingerprint
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::address;

    use super::*;

    const OWNER: Address = address!("0x523df39cae18ea125930da730628213e4b147cdc");

    fn fingerprint(args: &[ConstructorArg]) -> String {
        DeploymentFingerprint {
            contract: "DebtToken",
            bytecode_hash: Some("abcd"),
            constructor_args: args,
        }
        .compute_hash()
    }

    #[test]
    fn test_fingerprint_determinism() {
        let args = vec![ConstructorArg::string("spBTC_1"), ConstructorArg::Address(OWNER)];
        let hash1 = fingerprint(&args);
        let hash2 = fingerprint(&args);

        assert_eq!(hash1, hash2, "Hash should be deterministic");
        assert_eq!(hash1.len(), 64, "SHA-256 hash should be 64 hex characters");
    }

    #[test]
    fn test_fingerprint_changes_with_args() {
        let base = fingerprint(&[ConstructorArg::Address(OWNER)]);
        let other = fingerprint(&[ConstructorArg::Address(Address::ZERO)]);
        assert_ne!(base, other, "Hash should change when an argument changes");
    }

    #[test]
    fn test_fingerprint_changes_with_bytecode() {
        let args = [ConstructorArg::Bool(true)];
        let with_code = DeploymentFingerprint {
            contract: "MockOracle",
            bytecode_hash: Some("aa"),
            constructor_args: &args,
        };
        let other_code = DeploymentFingerprint {
            bytecode_hash: Some("bb"),
            ..with_code.clone()
        };
        assert_ne!(with_code.compute_hash(), other_code.compute_hash());
    }

    #[test]
    fn test_abi_encode_address_and_uint() {
        let encoded = ConstructorArg::abi_encode(&[
            ConstructorArg::Address(OWNER),
            ConstructorArg::uint(2),
        ]);
        assert_eq!(encoded.len(), 64);
        assert_eq!(&encoded[12..32], OWNER.as_slice());
        assert_eq!(encoded[63], 2);
    }

    #[test]
    fn test_abi_encode_empty_args() {
        assert!(ConstructorArg::abi_encode(&[]).is_empty());
    }

    #[test]
    fn test_abi_encode_dynamic_list_uses_offset() {
        let encoded = ConstructorArg::abi_encode(&[
            ConstructorArg::AddressList(vec![OWNER, Address::ZERO]),
            ConstructorArg::uint(2),
        ]);
        // head: offset + uint, tail: length + two words
        assert_eq!(encoded.len(), 32 * 5);
        assert_eq!(encoded[31], 0x40);
        assert_eq!(encoded[95], 2);
    }

    #[test]
    fn test_record_json_shape() {
        let record = DeploymentRecord {
            name: "multiSignature".to_string(),
            contract: "multiSignature".to_string(),
            address: OWNER,
            constructor_args: vec![ConstructorArg::uint(2)],
            network: NetworkId::Sepolia,
            fingerprint: "f".repeat(64),
            transaction_hash: None,
            deployed_at: 1737316800,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["network"], "sepolia");
        assert_eq!(json["constructorArgs"][0]["type"], "uint");
        assert!(json.get("transactionHash").is_none());

        let back: DeploymentRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
