// src/dag/scheduler_step.rs

//! Step-by-step result type for the scheduler.

use crate::dag::step_info::ScheduledStep;
use crate::engine::StepName;

/// Structured result of a single scheduler "step".
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Steps that became ready and are now marked running.
    pub newly_scheduled: Vec<ScheduledStep>,
    /// Steps canceled by this step (upstream failure or stop).
    pub newly_canceled: Vec<StepName>,
    /// Whether every step is now terminal.
    pub run_finished: bool,
}
