// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender, so
//! tests can swap in a fake that records dispatched steps and emits
//! `StepCompleted` events directly.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::dag::ScheduledStep;
use crate::engine::RuntimeEvent;
use crate::errors::{Error, Result};

use super::StepEnv;
use super::executor_loop::{ExecutorCommand, spawn_executor};

/// Trait abstracting how scheduled steps are executed.
pub trait ExecutorBackend: Send {
    /// Start the given steps.
    fn spawn_ready_steps(
        &mut self,
        steps: Vec<ScheduledStep>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Kill every running step. Each one still reports a completion
    /// (`Canceled`).
    fn cancel_running(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Executor backend used in production: forwards commands to the background
/// loop started by [`spawn_executor`].
pub struct RealExecutorBackend {
    tx: mpsc::Sender<ExecutorCommand>,
}

impl RealExecutorBackend {
    /// Spawns the background executor loop immediately.
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, env: StepEnv) -> Self {
        let tx = spawn_executor(runtime_tx, Arc::new(env));
        Self { tx }
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn spawn_ready_steps(
        &mut self,
        steps: Vec<ScheduledStep>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();

        Box::pin(async move {
            for step in steps {
                tx.send(ExecutorCommand::Run(step)).await.map_err(Error::from)?;
            }
            Ok(())
        })
    }

    fn cancel_running(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();

        Box::pin(async move {
            tx.send(ExecutorCommand::CancelAll).await.map_err(Error::from)?;
            Ok(())
        })
    }
}
