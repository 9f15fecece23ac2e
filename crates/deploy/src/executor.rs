//! Sequential execution of scheduled steps.

use alloy_core::primitives::Address;
use serde::{Serialize, Serializer};

use crate::{
    DeploymentFingerprint, DeploymentRecord, OrchestratorError,
    chain::{ChainClient, DeployRequest},
    network::{AuxiliarySource, NetworkId, NetworkProfile},
    registry::{AddressBook, DeploymentRegistry},
    step::{BuildContext, Dependency, StepDefinition},
    verification::{VerificationLedger, VerificationOutcome, VerificationPipeline, Verifier},
};

fn serialize_error<S: Serializer>(error: &OrchestratorError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(error)
}

fn serialize_optional_error<S: Serializer>(
    error: &Option<OrchestratorError>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(error) => s.collect_str(error),
        None => s.serialize_none(),
    }
}

/// What happened to one step during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum StepOutcome {
    /// At least one contract of the step was created in this run.
    Deployed,
    /// Every contract of the step was already deployed with the same inputs.
    Skipped,
    /// The step halted the run. Nothing of it was committed.
    Failed {
        #[serde(serialize_with = "serialize_error")]
        error: OrchestratorError,
    },
    /// The run halted before reaching the step.
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub name: String,
    pub outcome: StepOutcome,
    /// Records of the step, in contract order. Empty unless the step completed.
    pub records: Vec<DeploymentRecord>,
}

impl StepReport {
    fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            outcome: StepOutcome::NotAttempted,
            records: Vec::new(),
        }
    }
}

/// Summary of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub network: NetworkId,
    pub steps: Vec<StepReport>,
    /// Every address registered on the network once the run ended.
    pub addresses: AddressBook,
    pub verifications: Vec<VerificationOutcome>,
    /// Error that halted the run, if any.
    #[serde(serialize_with = "serialize_optional_error")]
    pub error: Option<OrchestratorError>,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|step| step.name == name)
    }

    /// Steps that created at least one contract.
    pub fn deployed(&self) -> impl Iterator<Item = &StepReport> {
        self.steps
            .iter()
            .filter(|step| step.outcome == StepOutcome::Deployed)
    }
}

/// A record produced while running a step, and whether it was created in this run.
struct StepRecord {
    record: DeploymentRecord,
    fresh: bool,
}

/// Runs scheduled steps one after the other against a chain.
#[derive(Debug, Clone)]
pub struct Executor<C, V> {
    chain: C,
    verifier: V,
    deployer: Address,
    redeploy: bool,
}

impl<C: ChainClient, V: Verifier> Executor<C, V> {
    /// `deployer` is the account the chain client sends transactions from.
    pub fn new(chain: C, verifier: V, deployer: Address) -> Self {
        Self {
            chain,
            verifier,
            deployer,
            redeploy: false,
        }
    }

    /// Ignore matching records and deploy every contract again.
    pub fn redeploy(mut self, redeploy: bool) -> Self {
        self.redeploy = redeploy;
        self
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    /// Execute `steps`, already in dependency order, against `registry`.
    ///
    /// The first runtime error halts the run: the failing step commits nothing and
    /// every later step is reported as not attempted.
    pub async fn execute(
        &self,
        steps: &[StepDefinition],
        profile: &NetworkProfile,
        registry: &DeploymentRegistry,
    ) -> ExecutionReport {
        let ledger = VerificationLedger::open(registry.path()).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "Ignoring unreadable verification ledger");
            VerificationLedger::empty(registry.path())
        });
        let mut pipeline = VerificationPipeline::new(&self.verifier, ledger);

        let mut reports: Vec<StepReport> =
            steps.iter().map(|s| StepReport::pending(&s.name)).collect();
        let mut verifications = Vec::new();
        let mut error = None;

        for (index, step) in steps.iter().enumerate() {
            tracing::info!(step = %step.name, network = %profile.id, "Running step");

            let records = match self.run_step(step, steps, profile, registry).await {
                Ok(records) => records,
                Err(err) => {
                    tracing::error!(step = %step.name, error = %err, "Step failed, halting run");
                    reports[index].outcome = StepOutcome::Failed { error: err.clone() };
                    error = Some(err);
                    break;
                }
            };

            for StepRecord { record, fresh } in &records {
                if *fresh || pipeline.needs_verification(record, profile) {
                    verifications.push(pipeline.verify(&step.name, record, profile).await);
                }
            }

            let report = &mut reports[index];
            report.outcome = if records.iter().any(|r| r.fresh) {
                StepOutcome::Deployed
            } else {
                tracing::info!(step = %step.name, "Step is up to date");
                StepOutcome::Skipped
            };
            report.records = records.into_iter().map(|r| r.record).collect();
        }

        let addresses = match registry.addresses() {
            Ok(addresses) => addresses,
            Err(err) => {
                let err = OrchestratorError::registry(err);
                tracing::error!(error = %err, "Failed to list registered addresses");
                if error.is_none() {
                    error = Some(err);
                }
                AddressBook::default()
            }
        };

        ExecutionReport {
            network: profile.id,
            steps: reports,
            addresses,
            verifications,
            error,
        }
    }

    async fn run_step(
        &self,
        step: &StepDefinition,
        steps: &[StepDefinition],
        profile: &NetworkProfile,
        registry: &DeploymentRegistry,
    ) -> Result<Vec<StepRecord>, OrchestratorError> {
        let mut ctx = self.resolve_dependencies(step, steps, profile, registry)?;
        let mut records = Vec::with_capacity(step.contracts.len());

        for contract in &step.contracts {
            let constructor_args = contract.build(&ctx)?;
            let deploy_failure = |err: anyhow::Error| OrchestratorError::DeployFailure {
                step: step.name.clone(),
                contract: contract.name.clone(),
                reason: format!("{err:#}"),
            };

            let bytecode_hash = self
                .chain
                .bytecode_hash(&contract.contract)
                .await
                .map_err(deploy_failure)?;
            let fingerprint = DeploymentFingerprint {
                contract: &contract.contract,
                bytecode_hash: bytecode_hash.as_deref(),
                constructor_args: &constructor_args,
            }
            .compute_hash();

            let existing = registry
                .get(&contract.name)
                .map_err(OrchestratorError::registry)?
                .filter(|r| !self.redeploy && r.matches(&fingerprint));
            let live = match &existing {
                Some(record) => self
                    .chain
                    .code_exists(record.address)
                    .await
                    .map_err(deploy_failure)?,
                None => false,
            };
            let existing = match existing {
                Some(record) if live => Some(record),
                Some(record) => {
                    tracing::warn!(
                        step = %step.name,
                        name = %record.name,
                        address = %record.address,
                        "Recorded deployment has no code on chain, redeploying"
                    );
                    None
                }
                None => None,
            };
            if let Some(existing) = existing {
                tracing::info!(
                    step = %step.name,
                    name = %existing.name,
                    address = %existing.address,
                    "Reusing existing deployment"
                );
                ctx.insert_record(&existing.name, existing.address);
                records.push(StepRecord {
                    record: existing,
                    fresh: false,
                });
                continue;
            }

            let request = DeployRequest {
                step: step.name.clone(),
                name: contract.name.clone(),
                contract: contract.contract.clone(),
                constructor_args,
                from: self.deployer,
            };
            let deployed = match self.chain.deploy(&request).await {
                Ok(deployed) => deployed,
                Err(err) => {
                    for orphan in records.iter().filter(|r| r.fresh) {
                        tracing::warn!(
                            step = %step.name,
                            name = %orphan.record.name,
                            address = %orphan.record.address,
                            "Contract deployed but not registered"
                        );
                    }
                    return Err(deploy_failure(err));
                }
            };

            tracing::info!(
                step = %step.name,
                name = %contract.name,
                address = %deployed.address,
                "Contract deployed"
            );

            ctx.insert_record(&contract.name, deployed.address);
            records.push(StepRecord {
                record: DeploymentRecord {
                    name: request.name,
                    contract: request.contract,
                    address: deployed.address,
                    constructor_args: request.constructor_args,
                    network: profile.id,
                    fingerprint,
                    transaction_hash: deployed.transaction_hash,
                    deployed_at: chrono::Utc::now().timestamp(),
                },
                fresh: true,
            });
        }

        for StepRecord { record, .. } in records.iter().filter(|r| r.fresh) {
            registry.put(record).map_err(OrchestratorError::registry)?;
        }

        Ok(records)
    }

    /// Build the context of a step from the registry and the network profile.
    fn resolve_dependencies<'a>(
        &self,
        step: &'a StepDefinition,
        steps: &[StepDefinition],
        profile: &'a NetworkProfile,
        registry: &DeploymentRegistry,
    ) -> Result<BuildContext<'a>, OrchestratorError> {
        let missing = |dependency: &str| OrchestratorError::MissingDependency {
            step: step.name.clone(),
            dependency: dependency.to_string(),
        };
        let lookup = |name: &str| -> Result<Address, OrchestratorError> {
            registry
                .get(name)
                .map_err(OrchestratorError::registry)?
                .map(|record| record.address)
                .ok_or_else(|| missing(name))
        };

        let mut ctx = BuildContext::new(&step.name, profile, self.deployer);

        for dependency in &step.dependencies {
            match dependency {
                Dependency::Step(name) => {
                    let provider = steps
                        .iter()
                        .find(|s| &s.name == name)
                        .ok_or_else(|| missing(name))?;
                    for output in provider.outputs() {
                        ctx.insert_record(output, lookup(output)?);
                    }
                }
                Dependency::Auxiliary(slot) => {
                    let address = match profile.auxiliary(slot).ok_or_else(|| missing(slot))? {
                        AuxiliarySource::Fixed { address } => *address,
                        AuxiliarySource::Deployer => self.deployer,
                        AuxiliarySource::Deployed { record, .. } => lookup(record)?,
                    };
                    ctx = ctx.with_auxiliary(slot.clone(), address);
                }
            }
        }

        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes_errors_as_messages() {
        let report = ExecutionReport {
            network: NetworkId::Hardhat,
            steps: vec![
                StepReport {
                    name: "a".to_string(),
                    outcome: StepOutcome::Failed {
                        error: OrchestratorError::DeployFailure {
                            step: "a".to_string(),
                            contract: "A".to_string(),
                            reason: "reverted".to_string(),
                        },
                    },
                    records: vec![],
                },
                StepReport::pending("b"),
            ],
            addresses: AddressBook::default(),
            verifications: vec![],
            error: Some(OrchestratorError::DeployFailure {
                step: "a".to_string(),
                contract: "A".to_string(),
                reason: "reverted".to_string(),
            }),
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["network"], "hardhat");
        assert_eq!(json["steps"][0]["outcome"]["status"], "failed");
        assert_eq!(
            json["steps"][0]["outcome"]["error"],
            "Failed to deploy `A` in step `a`: reverted"
        );
        assert_eq!(json["steps"][1]["outcome"]["status"], "notAttempted");
        assert!(!report.is_success());
        assert_eq!(report.deployed().count(), 0);
    }
}
