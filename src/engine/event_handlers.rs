// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::{debug, info};

use crate::dag::{ScheduledStep, Scheduler, SchedulerStep};
use crate::engine::{NodeUpdate, StepOutcome};
use crate::types::{NodeStatus, SchedulerStatus};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    /// Apply these node changes to the run's status record.
    MarkNodes(Vec<NodeUpdate>),
    /// Send these steps to the executor.
    DispatchSteps(Vec<ScheduledStep>),
    /// Kill every step process still running.
    CancelRunning,
    /// Every step is terminal; write the final record with this status.
    Finish(SchedulerStatus),
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Seed the run with its root steps.
pub fn handle_run_start(scheduler: &mut Scheduler) -> CoreStep {
    let step = scheduler.start();
    let run_finished = step.run_finished;
    let mut commands = Vec::new();
    push_scheduler_step(&mut commands, Vec::new(), step);
    finish_if_done(scheduler, false, run_finished, commands)
}

/// Handle a step completion event.
pub fn handle_step_completion(
    scheduler: &mut Scheduler,
    stop_requested: bool,
    step: &str,
    outcome: StepOutcome,
    error: Option<String>,
) -> CoreStep {
    let result = scheduler.handle_completion(step, outcome);

    let completed = NodeUpdate {
        step: step.to_string(),
        status: outcome.node_status(),
        exit_code: outcome.exit_code(),
        error,
    };
    let mut commands = Vec::new();
    let run_finished = result.run_finished;
    push_scheduler_step(&mut commands, vec![completed], result);

    finish_if_done(scheduler, stop_requested, run_finished, commands)
}

/// Handle a stop request. Only the first request has any effect.
pub fn handle_stop_request(scheduler: &mut Scheduler, stop_requested: &mut bool) -> CoreStep {
    if *stop_requested {
        debug!("stop already requested; ignoring");
        return CoreStep {
            commands: Vec::new(),
            keep_running: !scheduler.is_finished(),
        };
    }
    *stop_requested = true;
    info!("stop requested; canceling run");

    let result = scheduler.cancel_pending();
    let run_finished = result.run_finished;
    let mut commands = Vec::new();
    push_scheduler_step(&mut commands, Vec::new(), result);
    if scheduler.has_running() {
        commands.push(CoreCommand::CancelRunning);
    }

    finish_if_done(scheduler, true, run_finished, commands)
}

/// Translate a scheduler step into node updates followed by dispatches, so
/// the record shows a step running before its process starts.
fn push_scheduler_step(
    commands: &mut Vec<CoreCommand>,
    mut updates: Vec<NodeUpdate>,
    step: SchedulerStep,
) {
    updates.extend(
        step.newly_canceled
            .into_iter()
            .map(|name| NodeUpdate::status(name, NodeStatus::Cancel)),
    );
    updates.extend(
        step.newly_scheduled
            .iter()
            .map(|s| NodeUpdate::status(s.name.clone(), NodeStatus::Running)),
    );

    if !updates.is_empty() {
        commands.push(CoreCommand::MarkNodes(updates));
    }
    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchSteps(step.newly_scheduled));
    }
}

fn finish_if_done(
    scheduler: &Scheduler,
    stop_requested: bool,
    run_finished: bool,
    mut commands: Vec<CoreCommand>,
) -> CoreStep {
    if !run_finished {
        return CoreStep {
            commands,
            keep_running: true,
        };
    }

    let status = if stop_requested {
        SchedulerStatus::Cancel
    } else if scheduler.any_failed() {
        SchedulerStatus::Error
    } else {
        SchedulerStatus::Success
    };
    commands.push(CoreCommand::Finish(status));

    CoreStep {
        commands,
        keep_running: false,
    }
}
