//! Declarative deployment steps.

use std::{collections::BTreeMap, fmt, sync::Arc};

use alloy_core::primitives::Address;

use crate::{
    ConstructorArg, OrchestratorError,
    network::{NetworkId, NetworkProfile},
};

/// Computes constructor arguments from the resolved addresses of a step.
pub type BuildFn =
    Arc<dyn Fn(&BuildContext<'_>) -> Result<Vec<ConstructorArg>, OrchestratorError> + Send + Sync>;

/// Something a step needs before it can run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dependency {
    /// Every record produced by another step.
    Step(String),
    /// A logical slot the network profile maps to a fixed address, the deployer,
    /// or the record of another step.
    Auxiliary(String),
}

/// Gate deciding whether a step exists at all on a network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Applicability {
    #[default]
    Always,
    LocalOnly,
    PublicOnly,
    Networks(Vec<NetworkId>),
}

impl Applicability {
    pub fn applies(&self, profile: &NetworkProfile) -> bool {
        match self {
            Applicability::Always => true,
            Applicability::LocalOnly => profile.is_local,
            Applicability::PublicOnly => !profile.is_local,
            Applicability::Networks(networks) => networks.contains(&profile.id),
        }
    }
}

/// Addresses visible to a [`BuildFn`].
#[derive(Debug, Clone)]
pub struct BuildContext<'a> {
    pub step: &'a str,
    pub profile: &'a NetworkProfile,
    pub deployer: Address,
    records: BTreeMap<String, Address>,
    auxiliary: BTreeMap<String, Address>,
}

impl<'a> BuildContext<'a> {
    pub fn new(step: &'a str, profile: &'a NetworkProfile, deployer: Address) -> Self {
        Self {
            step,
            profile,
            deployer,
            records: BTreeMap::new(),
            auxiliary: BTreeMap::new(),
        }
    }

    pub fn with_record(mut self, name: impl Into<String>, address: Address) -> Self {
        self.insert_record(name, address);
        self
    }

    pub fn with_auxiliary(mut self, slot: impl Into<String>, address: Address) -> Self {
        self.auxiliary.insert(slot.into(), address);
        self
    }

    pub(crate) fn insert_record(&mut self, name: impl Into<String>, address: Address) {
        self.records.insert(name.into(), address);
    }

    /// Address of a record produced by a dependency or earlier in the same step.
    pub fn address(&self, name: &str) -> Result<Address, OrchestratorError> {
        self.records
            .get(name)
            .copied()
            .ok_or_else(|| self.missing(name))
    }

    /// Address an auxiliary slot resolved to on this network.
    pub fn auxiliary(&self, slot: &str) -> Result<Address, OrchestratorError> {
        self.auxiliary
            .get(slot)
            .copied()
            .ok_or_else(|| self.missing(slot))
    }

    fn missing(&self, dependency: &str) -> OrchestratorError {
        OrchestratorError::MissingDependency {
            step: self.step.to_string(),
            dependency: dependency.to_string(),
        }
    }
}

/// One contract created by a step, registered under `name`.
#[derive(Clone)]
pub struct ContractDeployment {
    /// Logical record name.
    pub name: String,
    /// Artifact to instantiate.
    pub contract: String,
    build: BuildFn,
}

impl ContractDeployment {
    pub fn new<F>(name: impl Into<String>, contract: impl Into<String>, build: F) -> Self
    where
        F: Fn(&BuildContext<'_>) -> Result<Vec<ConstructorArg>, OrchestratorError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            contract: contract.into(),
            build: Arc::new(build),
        }
    }

    /// A contract whose artifact shares its logical name.
    pub fn named<F>(name: impl Into<String>, build: F) -> Self
    where
        F: Fn(&BuildContext<'_>) -> Result<Vec<ConstructorArg>, OrchestratorError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        Self::new(name.clone(), name, build)
    }

    pub fn build(&self, ctx: &BuildContext<'_>) -> Result<Vec<ConstructorArg>, OrchestratorError> {
        (self.build)(ctx)
    }
}

impl fmt::Debug for ContractDeployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractDeployment")
            .field("name", &self.name)
            .field("contract", &self.contract)
            .finish_non_exhaustive()
    }
}

/// A named unit of deployment with its dependencies and applicability.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    pub name: String,
    pub dependencies: Vec<Dependency>,
    pub applicability: Applicability,
    pub contracts: Vec<ContractDeployment>,
    /// Selection tags, in addition to the step name itself.
    pub tags: Vec<String>,
}

impl StepDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            applicability: Applicability::Always,
            contracts: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn depends_on(mut self, step: impl Into<String>) -> Self {
        self.dependencies.push(Dependency::Step(step.into()));
        self
    }

    pub fn uses(mut self, slot: impl Into<String>) -> Self {
        self.dependencies.push(Dependency::Auxiliary(slot.into()));
        self
    }

    pub fn applicability(mut self, applicability: Applicability) -> Self {
        self.applicability = applicability;
        self
    }

    pub fn contract(mut self, contract: ContractDeployment) -> Self {
        self.contracts.push(contract);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.name == tag || self.tags.iter().any(|t| t == tag)
    }

    /// Names of the records this step registers.
    pub fn outputs(&self) -> impl Iterator<Item = &str> {
        self.contracts.iter().map(|c| c.name.as_str())
    }
}
