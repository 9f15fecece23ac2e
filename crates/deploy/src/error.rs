//! Error taxonomy for a deployment run.
//!
//! Structural errors (`UnsupportedNetwork`, `DuplicateStep`, `UnknownDependency`,
//! `InapplicableDependency`, `CyclicDependency`, `ChainIdMismatch`) are raised before
//! anything is written. Runtime errors (`MissingDependency`, `DeployFailure`, `Registry`)
//! halt a run after whatever was already committed to the registry.

use crate::network::NetworkId;

/// Errors produced while resolving, scheduling or executing a deployment run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("Step `{0}` is defined more than once")]
    DuplicateStep(String),

    #[error("No step matches tag `{0}`")]
    UnknownTag(String),

    #[error("Step `{step}` depends on `{dependency}`, which is not defined")]
    UnknownDependency { step: String, dependency: String },

    #[error("Step `{step}` depends on `{dependency}`, which does not apply to network {network}")]
    InapplicableDependency {
        step: String,
        dependency: String,
        network: NetworkId,
    },

    #[error("Cyclic dependency between steps: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Step `{step}` requires `{dependency}`, but no deployment record exists for it")]
    MissingDependency { step: String, dependency: String },

    #[error("Failed to deploy `{contract}` in step `{step}`: {reason}")]
    DeployFailure {
        step: String,
        contract: String,
        reason: String,
    },

    #[error("Deployment registry error: {0}")]
    Registry(String),

    #[error("Connected node reports chain id {actual}, but network {network} expects {expected}")]
    ChainIdMismatch {
        network: NetworkId,
        expected: u64,
        actual: u64,
    },

    #[error("Verification of `{contract}` failed: {reason}")]
    VerificationFailure { contract: String, reason: String },
}

impl OrchestratorError {
    /// Whether this error is raised before any side effect can happen.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedNetwork(_)
                | Self::DuplicateStep(_)
                | Self::UnknownTag(_)
                | Self::UnknownDependency { .. }
                | Self::InapplicableDependency { .. }
                | Self::CyclicDependency { .. }
                | Self::ChainIdMismatch { .. }
        )
    }

    /// Wrap an I/O or serialization error coming from the registry.
    pub(crate) fn registry(err: anyhow::Error) -> Self {
        Self::Registry(format!("{err:#}"))
    }
}
