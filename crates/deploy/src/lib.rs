//! pledgekit-deploy - Deployment orchestration for the Pledge contracts.
//!
//! This crate resolves a network profile, orders the deployment steps by their
//! dependencies, deploys what is missing and records every address in a per-network
//! registry that later runs reuse.

mod artifacts;
pub use artifacts::{Artifact, ArtifactStore, BuildInfo};

mod builder;
pub use builder::{DEFAULT_ARTIFACTS_DIR, DEFAULT_DEPLOYMENTS_DIR, DeployerBuilder, default_rpc_url};

pub mod catalog;

mod chain;
pub use chain::{ChainClient, DeployRequest, DeployedContract, JsonRpcChainClient};

mod deployer;
pub use deployer::{
    CONFIG_FILENAME, DEFAULT_LOCAL_RPC_URL, Deployer, ENV_PREFIX, Orchestrator, VerifierConfig,
};

mod error;
pub use error::OrchestratorError;

mod executor;
pub use executor::{ExecutionReport, Executor, StepOutcome, StepReport};

pub mod network;
pub use network::{AuxiliarySource, Credentials, NetworkId, NetworkProfile};

mod record;
pub use record::{ConstructorArg, DeploymentFingerprint, DeploymentRecord};

mod registry;
pub use registry::{AddressBook, DeploymentRegistry};

mod rpc;
pub use rpc::RpcClient;

pub mod scheduler;
pub use scheduler::{ALL_TAG, schedule, select_tags};

mod step;
pub use step::{Applicability, BuildContext, BuildFn, ContractDeployment, Dependency, StepDefinition};

mod verification;
pub use verification::{
    ETHERSCAN_API_URL, EtherscanVerifier, VerificationLedger, VerificationOutcome,
    VerificationPipeline, VerificationRequest, Verifier,
};
