// src/dag/state_manager.rs

//! Per-run state transitions for steps in the scheduler.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::dag::DagGraph;
use crate::dag::step_info::{RunState, ScheduledStep, StepInfo};
use crate::engine::StepName;

pub struct StateManager<'a> {
    graph: &'a DagGraph,
    steps: &'a mut HashMap<StepName, StepInfo>,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a DagGraph, steps: &'a mut HashMap<StepName, StepInfo>) -> Self {
        Self { graph, steps }
    }

    /// Cancel every pending step downstream of `failed`.
    ///
    /// Returns the newly canceled steps, excluding `failed` itself.
    pub fn mark_dependents_canceled(&mut self, failed: &str) -> Vec<StepName> {
        let mut stack: Vec<StepName> = self.graph.dependents_of(failed).to_vec();
        let mut canceled = Vec::new();

        while let Some(name) = stack.pop() {
            let Some(info) = self.steps.get_mut(&name) else {
                warn!(step = %name, "dependent missing from step map");
                continue;
            };
            if info.run_state == RunState::Pending {
                info.run_state = RunState::Canceled;
                debug!(step = %info.name, upstream = %failed, "canceled due to upstream failure");
                canceled.push(info.name.clone());
                stack.extend(self.graph.dependents_of(&name).iter().cloned());
            }
        }

        canceled
    }

    /// Cancel every step that has not been dispatched yet.
    pub fn cancel_pending(&mut self) -> Vec<StepName> {
        let mut canceled = Vec::new();
        for name in self.graph.steps() {
            if let Some(info) = self.steps.get_mut(name) {
                if info.run_state == RunState::Pending {
                    info.run_state = RunState::Canceled;
                    canceled.push(info.name.clone());
                }
            }
        }
        canceled
    }

    /// Mark pending steps whose dependencies are satisfied as `Running` and
    /// return them, in topological order.
    pub fn collect_new_ready_steps(&mut self) -> Vec<ScheduledStep> {
        let steps: &HashMap<StepName, StepInfo> = self.steps;
        let candidates: Vec<StepName> = self
            .graph
            .steps()
            .filter(|name| {
                steps.get(*name).is_some_and(|info| {
                    info.run_state == RunState::Pending && deps_satisfied(steps, info)
                })
            })
            .map(str::to_string)
            .collect();

        let mut ready = Vec::with_capacity(candidates.len());
        for name in candidates {
            if let Some(info) = self.steps.get_mut(&name) {
                info!(step = %info.name, "dependencies satisfied; scheduling step");
                info.run_state = RunState::Running;
                ready.push(ScheduledStep::from_step_info(info));
            }
        }
        ready
    }

    pub fn all_steps_terminal(&self) -> bool {
        self.steps.values().all(|info| info.run_state.is_terminal())
    }
}

/// Whether every dependency of `info` finished in a state that lets
/// dependents run.
pub fn deps_satisfied(steps: &HashMap<StepName, StepInfo>, info: &StepInfo) -> bool {
    info.deps.iter().all(|dep| match steps.get(dep) {
        Some(d) => d.run_state.satisfies_dependents(),
        None => {
            warn!(step = %info.name, dep = %dep, "dependency missing from step map");
            false
        }
    })
}
