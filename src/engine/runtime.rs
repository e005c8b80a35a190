// src/engine/runtime.rs

use std::fmt;

use anyhow::anyhow;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::dag::ScheduledStep;
use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::types::SchedulerStatus;

use super::core::CoreRuntime;
use super::{CoreCommand, NodeUpdate, RuntimeEvent};

/// Where the runtime reports progress of the run.
pub trait StatusSink: Send {
    /// Apply node changes and persist the resulting record.
    fn apply(&mut self, updates: &[NodeUpdate]) -> Result<()>;

    /// Write the terminal record.
    fn finish(&mut self, status: SchedulerStatus) -> Result<()>;
}

/// Drives the scheduler in response to `RuntimeEvent`s, delegating step
/// execution to an `ExecutorBackend` and record keeping to a `StatusSink`.
///
/// This is an IO shell around `CoreRuntime`, which contains all the run
/// semantics. Stop requests arrive on a separate `watch` channel so they
/// never compete with step completions for queue space.
pub struct Runtime<E: ExecutorBackend, S: StatusSink> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    stop_rx: watch::Receiver<bool>,
    stop_armed: bool,
    executor: E,
    sink: S,
}

impl<E: ExecutorBackend, S: StatusSink> fmt::Debug for Runtime<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend, S: StatusSink> Runtime<E, S> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        stop_rx: watch::Receiver<bool>,
        executor: E,
        sink: S,
    ) -> Self {
        Self {
            core,
            event_rx,
            stop_rx,
            stop_armed: true,
            executor,
            sink,
        }
    }

    /// Run the DAG to completion and return its terminal status.
    pub async fn run(mut self) -> Result<SchedulerStatus> {
        info!("run started");

        let step = self.core.start();
        if let Some(status) = self.execute(step.commands).await? {
            return Ok(status);
        }

        loop {
            let event = match self.take_stop() {
                Some(event) => event,
                None => self.next_event().await?,
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);
            if let Some(status) = self.execute(step.commands).await? {
                info!(%status, "run finished");
                return Ok(status);
            }
            if !step.keep_running {
                return Err(anyhow!("core stopped without a final status").into());
            }
        }
    }

    /// A stop that is already flagged, handed out at most once.
    fn take_stop(&mut self) -> Option<RuntimeEvent> {
        if self.stop_armed && *self.stop_rx.borrow_and_update() {
            self.stop_armed = false;
            return Some(RuntimeEvent::StopRequested);
        }
        None
    }

    /// Wait for the next event. A stop request wins over queued completions.
    async fn next_event(&mut self) -> Result<RuntimeEvent> {
        loop {
            tokio::select! {
                biased;
                changed = self.stop_rx.changed(), if self.stop_armed => {
                    if changed.is_err() {
                        // Nobody can request a stop any more.
                        self.stop_armed = false;
                        continue;
                    }
                    if let Some(event) = self.take_stop() {
                        return Ok(event);
                    }
                }
                received = self.event_rx.recv() => {
                    return received.ok_or_else(|| {
                        anyhow!("runtime event channel closed before the run finished").into()
                    });
                }
            }
        }
    }

    /// Execute commands from the core. Returns the final status once a
    /// `Finish` command has been carried out.
    async fn execute(&mut self, commands: Vec<CoreCommand>) -> Result<Option<SchedulerStatus>> {
        let mut finished = None;
        for command in commands {
            match command {
                CoreCommand::MarkNodes(updates) => self.sink.apply(&updates)?,
                CoreCommand::DispatchSteps(steps) => self.spawn_ready(steps).await?,
                CoreCommand::CancelRunning => self.executor.cancel_running().await?,
                CoreCommand::Finish(status) => {
                    self.sink.finish(status)?;
                    finished = Some(status);
                }
            }
        }
        Ok(finished)
    }

    async fn spawn_ready(&mut self, steps: Vec<ScheduledStep>) -> Result<()> {
        if steps.is_empty() {
            return Ok(());
        }

        let names: Vec<_> = steps.iter().map(|s| s.name.as_str()).collect();
        debug!(?names, "spawning ready steps");

        self.executor.spawn_ready_steps(steps).await
    }
}
