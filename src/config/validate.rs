// src/config/validate.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{Dag, RawDagFile, Step, StepConfig};
use crate::errors::{DagrunError, Result};

/// Validate a raw definition and turn it into a [`Dag`] rooted at `location`.
///
/// `location` should already be canonical; it becomes the DAG identity used
/// for the status store and the channel address.
pub fn validate_dag_file(raw: RawDagFile, location: PathBuf) -> Result<Dag> {
    ensure_has_steps(&raw)?;
    validate_steps(&raw)?;
    validate_acyclic(&raw)?;

    let name = match raw.name.as_deref().map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => location
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                DagrunError::ConfigError(format!(
                    "cannot derive a DAG name from {}",
                    location.display()
                ))
            })?,
    };

    let steps = ordered_steps(&raw.step);

    Ok(Dag {
        name,
        location,
        description: raw.description,
        default_params: raw.params.unwrap_or_default(),
        restart_wait: Duration::from_secs(raw.restart_wait_sec),
        hist_retention_days: raw.hist_retention_days,
        steps,
    })
}

fn ensure_has_steps(raw: &RawDagFile) -> Result<()> {
    if raw.step.is_empty() {
        return Err(DagrunError::ConfigError(
            "DAG must contain at least one [step.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_steps(raw: &RawDagFile) -> Result<()> {
    for (name, step) in raw.step.iter() {
        if step.command.trim().is_empty() {
            return Err(DagrunError::ConfigError(format!(
                "step '{}' has an empty command",
                name
            )));
        }
        for dep in step.after.iter() {
            if dep == name {
                return Err(DagrunError::ConfigError(format!(
                    "step '{}' cannot depend on itself in `after`",
                    name
                )));
            }
            if !raw.step.contains_key(dep) {
                return Err(DagrunError::ConfigError(format!(
                    "step '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_acyclic(raw: &RawDagFile) -> Result<()> {
    // Edge direction: dep -> step.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in raw.step.keys() {
        graph.add_node(name.as_str());
    }
    for (name, step) in raw.step.iter() {
        for dep in step.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(DagrunError::DagCycle(format!(
            "cycle detected in step DAG involving step '{}'",
            cycle.node_id()
        ))),
    }
}

/// Kahn's algorithm with a name-ordered ready set, so the order only depends
/// on the definition and never on hash iteration order.
fn ordered_steps(steps: &BTreeMap<String, StepConfig>) -> Vec<Step> {
    let mut remaining: BTreeMap<&str, BTreeSet<&str>> = steps
        .iter()
        .map(|(name, cfg)| (name.as_str(), cfg.after.iter().map(String::as_str).collect()))
        .collect();

    let mut ordered = Vec::with_capacity(steps.len());
    while !remaining.is_empty() {
        let ready: Vec<&str> = remaining
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(name, _)| *name)
            .collect();
        if ready.is_empty() {
            // Unreachable after validate_acyclic.
            break;
        }
        for name in ready {
            remaining.remove(name);
            for deps in remaining.values_mut() {
                deps.remove(name);
            }
            let cfg = &steps[name];
            ordered.push(Step {
                name: name.to_string(),
                command: cfg.command.clone(),
                after: cfg.after.clone(),
                dir: cfg.dir.clone(),
                precondition: cfg.precondition.clone(),
            });
        }
    }
    ordered
}
