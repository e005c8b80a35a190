// src/dag/step_info.rs

//! Step metadata and per-run state.

use std::path::PathBuf;

use crate::config::model::Step;
use crate::engine::StepName;
use crate::types::NodeStatus;

/// Per-run state of a step (internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Waiting on dependencies.
    Pending,
    /// Dispatched to the executor.
    Running,
    Succeeded,
    Failed,
    /// Precondition did not hold. Counts as satisfied for dependents.
    Skipped,
    /// Stopped, or never ran because an upstream step failed.
    Canceled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunState::Pending | RunState::Running)
    }

    /// Whether dependents may start after this state.
    pub fn satisfies_dependents(self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Skipped)
    }

    pub fn node_status(self) -> NodeStatus {
        match self {
            RunState::Pending => NodeStatus::NotStarted,
            RunState::Running => NodeStatus::Running,
            RunState::Succeeded => NodeStatus::Success,
            RunState::Failed => NodeStatus::Error,
            RunState::Skipped => NodeStatus::Skipped,
            RunState::Canceled => NodeStatus::Cancel,
        }
    }
}

/// Static step information plus its state in the run.
#[derive(Debug, Clone)]
pub struct StepInfo {
    pub name: StepName,
    pub command: String,
    pub dir: Option<PathBuf>,
    pub precondition: Option<String>,
    pub deps: Vec<StepName>,
    pub run_state: RunState,
}

impl StepInfo {
    pub fn from_step(step: &Step) -> Self {
        Self {
            name: step.name.clone(),
            command: step.command.clone(),
            dir: step.dir.clone(),
            precondition: step.precondition.clone(),
            deps: step.after.clone(),
            run_state: RunState::Pending,
        }
    }
}

/// A step the scheduler wants the executor to run now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledStep {
    pub name: StepName,
    pub command: String,
    pub dir: Option<PathBuf>,
    pub precondition: Option<String>,
}

impl ScheduledStep {
    pub fn from_step_info(info: &StepInfo) -> Self {
        Self {
            name: info.name.clone(),
            command: info.command.clone(),
            dir: info.dir.clone(),
            precondition: info.precondition.clone(),
        }
    }
}
