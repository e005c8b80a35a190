// src/dag/mod.rs

//! DAG representation and scheduling for a single run.
//!
//! - [`graph`] holds the adjacency of steps.
//! - [`scheduler`] decides which steps are ready and propagates failures.
//! - [`step_info`] provides step metadata and scheduled step types.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod step_info;

pub use graph::DagGraph;
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use step_info::{RunState, ScheduledStep};
