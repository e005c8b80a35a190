// src/dag/scheduler.rs

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::config::model::Dag;
use crate::dag::graph::DagGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{StateManager, deps_satisfied};
use crate::dag::step_info::{RunState, StepInfo};
use crate::engine::{StepName, StepOutcome};

/// Scheduler holds the immutable DAG plus the state of its single run.
///
/// It is responsible for:
/// - deciding when a step is ready (all dependencies succeeded or skipped)
/// - recording step outcomes
/// - canceling dependents of a failed step
/// - canceling whatever has not started when the run is stopped
#[derive(Debug)]
pub struct Scheduler {
    graph: DagGraph,
    steps: HashMap<StepName, StepInfo>,
    started: bool,
}

impl Scheduler {
    pub fn from_dag(dag: &Dag) -> Self {
        let graph = DagGraph::from_dag(dag);
        let steps = dag
            .steps
            .iter()
            .map(|step| (step.name.clone(), StepInfo::from_step(step)))
            .collect();

        Self {
            graph,
            steps,
            started: false,
        }
    }

    /// Begin the run: every step becomes pending and the roots are scheduled.
    pub fn start(&mut self) -> SchedulerStep {
        if self.started {
            warn!("scheduler already started; ignoring");
            return SchedulerStep::default();
        }
        self.started = true;

        let mut manager = StateManager::new(&self.graph, &mut self.steps);
        let newly_scheduled = manager.collect_new_ready_steps();
        debug!(count = newly_scheduled.len(), "run started; roots scheduled");

        SchedulerStep {
            newly_scheduled,
            newly_canceled: Vec::new(),
            run_finished: self.is_finished(),
        }
    }

    /// Record the outcome of a dispatched step.
    pub fn handle_completion(&mut self, step: &str, outcome: StepOutcome) -> SchedulerStep {
        let Some(info) = self.steps.get_mut(step) else {
            warn!(step = %step, "completion for unknown step; ignoring");
            return SchedulerStep::default();
        };
        if info.run_state != RunState::Running {
            warn!(step = %step, state = ?info.run_state, "completion for step that is not running; ignoring");
            return SchedulerStep::default();
        }

        let mut step_result = SchedulerStep::default();
        match outcome {
            StepOutcome::Success | StepOutcome::Skipped => {
                info.run_state = if outcome == StepOutcome::Success {
                    RunState::Succeeded
                } else {
                    RunState::Skipped
                };
                debug!(step = %step, ?outcome, "step finished; checking dependents");
                let mut manager = StateManager::new(&self.graph, &mut self.steps);
                step_result.newly_scheduled = manager.collect_new_ready_steps();
            }
            StepOutcome::Failed(code) => {
                info.run_state = RunState::Failed;
                warn!(step = %step, exit_code = code, "step failed; canceling dependents");
                let mut manager = StateManager::new(&self.graph, &mut self.steps);
                step_result.newly_canceled = manager.mark_dependents_canceled(step);
            }
            StepOutcome::Canceled => {
                info.run_state = RunState::Canceled;
                let mut manager = StateManager::new(&self.graph, &mut self.steps);
                step_result.newly_canceled = manager.mark_dependents_canceled(step);
            }
        }

        step_result.run_finished = self.is_finished();
        if step_result.run_finished {
            info!("all steps terminal; run finished");
        }
        step_result
    }

    /// Cancel every step that has not been dispatched. Running steps keep
    /// their state until the executor reports them.
    pub fn cancel_pending(&mut self) -> SchedulerStep {
        let mut manager = StateManager::new(&self.graph, &mut self.steps);
        let newly_canceled = manager.cancel_pending();
        SchedulerStep {
            newly_scheduled: Vec::new(),
            newly_canceled,
            run_finished: self.is_finished(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.started && self.steps.values().all(|info| info.run_state.is_terminal())
    }

    pub fn state_of(&self, step: &str) -> Option<RunState> {
        self.steps.get(step).map(|info| info.run_state)
    }

    pub fn any_failed(&self) -> bool {
        self.steps
            .values()
            .any(|info| info.run_state == RunState::Failed)
    }

    pub fn has_running(&self) -> bool {
        self.steps
            .values()
            .any(|info| info.run_state == RunState::Running)
    }

    /// Whether the dependencies of `step` are satisfied. `None` for unknown
    /// steps.
    pub fn deps_satisfied(&self, step: &str) -> Option<bool> {
        let info = self.steps.get(step)?;
        Some(deps_satisfied(&self.steps, info))
    }

    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.graph.steps()
    }
}
