// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending `ScheduledStep`s to the executor
//! - writing node updates to the status sink
//!
//! The core is unit tested without any Tokio, channels, filesystem, or
//! processes.

use crate::dag::Scheduler;
use crate::engine::RuntimeEvent;
use crate::engine::event_handlers::{
    CoreStep, handle_run_start, handle_step_completion, handle_stop_request,
};

#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    stop_requested: bool,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            stop_requested: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Schedule the root steps.
    pub fn start(&mut self) -> CoreStep {
        handle_run_start(&mut self.scheduler)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::StepCompleted {
                step,
                outcome,
                error,
            } => handle_step_completion(
                &mut self.scheduler,
                self.stop_requested,
                &step,
                outcome,
                error,
            ),
            RuntimeEvent::StopRequested => {
                handle_stop_request(&mut self.scheduler, &mut self.stop_requested)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Dag, Step};
    use crate::engine::event_handlers::CoreCommand;
    use crate::engine::{NodeUpdate, StepOutcome};
    use crate::types::{NodeStatus, SchedulerStatus};

    fn core() -> CoreRuntime {
        let dag = Dag::new_unchecked(
            "core",
            "/defs/core.toml",
            vec![
                Step::new("a", "true"),
                Step::new("b", "true").after("a"),
                Step::new("c", "true"),
            ],
        );
        CoreRuntime::new(Scheduler::from_dag(&dag))
    }

    fn completed(step: &str, outcome: StepOutcome) -> RuntimeEvent {
        RuntimeEvent::StepCompleted {
            step: step.to_string(),
            outcome,
            error: None,
        }
    }

    fn dispatched(step: &CoreStep) -> Vec<String> {
        step.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::DispatchSteps(steps) => Some(steps.iter().map(|s| s.name.clone())),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn finish(step: &CoreStep) -> Option<SchedulerStatus> {
        step.commands.iter().find_map(|c| match c {
            CoreCommand::Finish(status) => Some(*status),
            _ => None,
        })
    }

    #[test]
    fn start_marks_roots_running_before_dispatch() {
        let mut core = core();
        let step = core.start();

        assert!(step.keep_running);
        match &step.commands[..] {
            [CoreCommand::MarkNodes(updates), CoreCommand::DispatchSteps(steps)] => {
                assert_eq!(
                    updates,
                    &vec![
                        NodeUpdate::status("a", NodeStatus::Running),
                        NodeUpdate::status("c", NodeStatus::Running),
                    ]
                );
                assert_eq!(steps.len(), 2);
            }
            other => panic!("unexpected commands: {other:?}"),
        }
    }

    #[test]
    fn successful_run_finishes_with_success() {
        let mut core = core();
        core.start();

        let step = core.step(completed("a", StepOutcome::Success));
        assert_eq!(dispatched(&step), vec!["b"]);
        assert!(finish(&step).is_none());

        core.step(completed("c", StepOutcome::Success));
        let step = core.step(completed("b", StepOutcome::Success));
        assert_eq!(finish(&step), Some(SchedulerStatus::Success));
        assert!(!step.keep_running);
        assert!(core.is_finished());
    }

    #[test]
    fn failure_cancels_dependents_and_finishes_with_error() {
        let mut core = core();
        core.start();

        let step = core.step(completed("a", StepOutcome::Failed(2)));
        let CoreCommand::MarkNodes(updates) = &step.commands[0] else {
            panic!("expected node updates first");
        };
        assert_eq!(updates[0].status, NodeStatus::Error);
        assert_eq!(updates[0].exit_code, Some(2));
        assert_eq!(updates[1], NodeUpdate::status("b", NodeStatus::Cancel));

        let step = core.step(completed("c", StepOutcome::Success));
        assert_eq!(finish(&step), Some(SchedulerStatus::Error));
    }

    #[test]
    fn stop_cancels_pending_kills_running_and_is_idempotent() {
        let mut core = core();
        core.start();

        let step = core.step(RuntimeEvent::StopRequested);
        assert!(core.stop_requested());
        assert!(step.keep_running);
        assert!(matches!(step.commands[0], CoreCommand::MarkNodes(ref u) if u == &vec![NodeUpdate::status("b", NodeStatus::Cancel)]));
        assert!(matches!(step.commands[1], CoreCommand::CancelRunning));

        assert!(core.step(RuntimeEvent::StopRequested).commands.is_empty());

        core.step(completed("a", StepOutcome::Canceled));
        let step = core.step(completed("c", StepOutcome::Success));
        assert!(dispatched(&step).is_empty());
        assert_eq!(finish(&step), Some(SchedulerStatus::Cancel));
    }
}
