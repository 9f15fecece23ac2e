//! Dependency scheduling.
//!
//! Steps that do not apply to the active network are dropped before sorting. Auxiliary
//! slots served by a deployment step become ordinary edges, so a dependent always runs
//! after the step that registers its substitute address.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::{
    OrchestratorError,
    network::{AuxiliarySource, NetworkProfile},
    step::{Dependency, StepDefinition},
};

/// Tag selecting every step.
pub const ALL_TAG: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Order `steps` so that every step comes after all of its dependencies.
///
/// Independent steps keep their declaration order, so the result is stable across runs.
pub fn schedule(
    steps: &[StepDefinition],
    profile: &NetworkProfile,
) -> Result<Vec<StepDefinition>, OrchestratorError> {
    let mut defined = HashMap::with_capacity(steps.len());
    for (index, step) in steps.iter().enumerate() {
        if defined.insert(step.name.as_str(), index).is_some() {
            return Err(OrchestratorError::DuplicateStep(step.name.clone()));
        }
    }

    let applicable: Vec<&StepDefinition> = steps
        .iter()
        .filter(|step| {
            let applies = step.applicability.applies(profile);
            if !applies {
                tracing::debug!(step = %step.name, network = %profile.id, "Step does not apply, dropping");
            }
            applies
        })
        .collect();
    let applicable_names: HashSet<&str> = applicable.iter().map(|s| s.name.as_str()).collect();

    let mut edges: HashMap<&str, Vec<&str>> = HashMap::with_capacity(applicable.len());
    for &step in &applicable {
        let mut targets = Vec::new();
        for dependency in step_edges(step, profile)? {
            if !defined.contains_key(dependency) {
                return Err(OrchestratorError::UnknownDependency {
                    step: step.name.clone(),
                    dependency: dependency.to_string(),
                });
            }
            if !applicable_names.contains(dependency) {
                return Err(OrchestratorError::InapplicableDependency {
                    step: step.name.clone(),
                    dependency: dependency.to_string(),
                    network: profile.id,
                });
            }
            targets.push(dependency);
        }
        edges.insert(step.name.as_str(), targets);
    }

    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(applicable.len());
    let mut path: Vec<&str> = Vec::new();
    let mut order: Vec<&str> = Vec::with_capacity(applicable.len());

    for &step in &applicable {
        visit(step.name.as_str(), &edges, &mut marks, &mut path, &mut order)?;
    }

    tracing::debug!(network = %profile.id, order = ?order, "Deployment order resolved");

    Ok(order
        .into_iter()
        .map(|name| steps[defined[name]].clone())
        .collect())
}

fn visit<'a>(
    node: &'a str,
    edges: &HashMap<&'a str, Vec<&'a str>>,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
    order: &mut Vec<&'a str>,
) -> Result<(), OrchestratorError> {
    match marks.get(node) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = path.iter().position(|n| *n == node).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(node.to_string());
            return Err(OrchestratorError::CyclicDependency { cycle });
        }
        None => {}
    }

    marks.insert(node, Mark::Visiting);
    path.push(node);

    for &dependency in edges.get(node).map(Vec::as_slice).unwrap_or_default() {
        visit(dependency, edges, marks, path, order)?;
    }

    path.pop();
    marks.insert(node, Mark::Done);
    order.push(node);
    Ok(())
}

/// Names of the steps `step` must run after on this network, in declaration order.
fn step_edges<'a>(
    step: &'a StepDefinition,
    profile: &'a NetworkProfile,
) -> Result<Vec<&'a str>, OrchestratorError> {
    let mut targets = Vec::with_capacity(step.dependencies.len());
    for dependency in &step.dependencies {
        match dependency {
            Dependency::Step(name) => targets.push(name.as_str()),
            Dependency::Auxiliary(slot) => match profile.auxiliary(slot) {
                Some(AuxiliarySource::Deployed { step: provider, .. }) => {
                    targets.push(provider.as_str())
                }
                Some(AuxiliarySource::Fixed { .. } | AuxiliarySource::Deployer) => {}
                None => {
                    return Err(OrchestratorError::UnknownDependency {
                        step: step.name.clone(),
                        dependency: slot.clone(),
                    });
                }
            },
        }
    }
    Ok(targets)
}

/// Keep the steps matching any of `tags`, plus everything they transitively need.
///
/// Tagged steps that do not apply to the network are not selected. The result preserves
/// declaration order. Unresolvable dependencies are left for [`schedule`] to report.
pub fn select_tags(
    steps: &[StepDefinition],
    tags: &[String],
    profile: &NetworkProfile,
) -> Result<Vec<StepDefinition>, OrchestratorError> {
    if tags.is_empty() || tags.iter().any(|t| t == ALL_TAG) {
        return Ok(steps.to_vec());
    }

    for tag in tags {
        if !steps.iter().any(|step| step.has_tag(tag)) {
            return Err(OrchestratorError::UnknownTag(tag.clone()));
        }
    }

    let by_name: HashMap<&str, &StepDefinition> =
        steps.iter().map(|s| (s.name.as_str(), s)).collect();
    let mut selected: BTreeSet<&str> = BTreeSet::new();
    let mut pending: Vec<&str> = steps
        .iter()
        .filter(|step| {
            step.applicability.applies(profile) && tags.iter().any(|t| step.has_tag(t))
        })
        .map(|step| step.name.as_str())
        .collect();

    while let Some(name) = pending.pop() {
        if !selected.insert(name) {
            continue;
        }
        let Some(&step) = by_name.get(name) else {
            continue;
        };
        if !step.applicability.applies(profile) {
            continue;
        }
        if let Ok(targets) = step_edges(step, profile) {
            pending.extend(targets);
        }
    }

    Ok(steps
        .iter()
        .filter(|step| selected.contains(step.name.as_str()))
        .cloned()
        .collect())
}
