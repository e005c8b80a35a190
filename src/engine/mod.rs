// src/engine/mod.rs

//! Orchestration engine for one run of a DAG.
//!
//! This module ties together:
//! - the step scheduler
//! - the executor that runs step processes
//! - the status sink that keeps the run's record current
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use crate::types::NodeStatus;

/// Canonical step name type used throughout the engine.
pub type StepName = String;

/// Outcome of a step for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    Failed(i32),
    /// The precondition did not hold; the command never ran.
    Skipped,
    /// Killed because the run was stopped.
    Canceled,
}

impl StepOutcome {
    pub fn node_status(self) -> NodeStatus {
        match self {
            StepOutcome::Success => NodeStatus::Success,
            StepOutcome::Failed(_) => NodeStatus::Error,
            StepOutcome::Skipped => NodeStatus::Skipped,
            StepOutcome::Canceled => NodeStatus::Cancel,
        }
    }

    pub fn exit_code(self) -> Option<i32> {
        match self {
            StepOutcome::Success => Some(0),
            StepOutcome::Failed(code) => Some(code),
            StepOutcome::Skipped | StepOutcome::Canceled => None,
        }
    }
}

/// Events flowing into the runtime from the executor and the outside world.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    /// A step process finished (or was skipped or killed).
    StepCompleted {
        step: StepName,
        outcome: StepOutcome,
        error: Option<String>,
    },
    /// Cancel the run (stop request over the socket, or Ctrl-C).
    StopRequested,
}

/// Change to one node of the run's status record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeUpdate {
    pub step: StepName,
    pub status: NodeStatus,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

impl NodeUpdate {
    pub fn status(step: impl Into<StepName>, status: NodeStatus) -> Self {
        Self {
            step: step.into(),
            status,
            exit_code: None,
            error: None,
        }
    }
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::{Runtime, StatusSink};
