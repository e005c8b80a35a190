// src/agent/live.rs

//! The in-memory record of a running DAG and its two views: the socket
//! handler that serves it and the sink that mutates and persists it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::engine::{NodeUpdate, StatusSink};
use crate::errors::{DagrunError, Result};
use crate::models::{Pid, Status};
use crate::sock::StatusHandler;
use crate::store::Writer;
use crate::types::{NodeStatus, SchedulerStatus};

/// Shared state of the live run.
///
/// Stop requests travel on their own `watch` channel rather than the runtime
/// event queue, so a burst of step completions can never crowd one out.
#[derive(Debug)]
pub struct LiveRun {
    status: Mutex<Status>,
    stop: watch::Sender<bool>,
}

impl LiveRun {
    pub fn new(status: Status) -> Arc<Self> {
        let (stop, _) = watch::channel(false);
        Arc::new(Self {
            status: Mutex::new(status),
            stop,
        })
    }

    pub fn snapshot(&self) -> Status {
        self.lock().clone()
    }

    /// Receiver the runtime watches for stop requests.
    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop.subscribe()
    }

    /// Ask the runtime to cancel the run. Idempotent, and never fails: the
    /// flag stays set until the runtime looks at it.
    pub fn request_stop(&self) {
        if self.stop.send_replace(true) {
            debug!("stop already requested");
        } else {
            info!("stop requested");
        }
    }

    pub fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    fn lock(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatusHandler for LiveRun {
    fn status(&self) -> Status {
        self.snapshot()
    }

    fn stop(&self) {
        self.request_stop();
    }
}

/// Applies runtime progress to the live record and appends every change
/// through the run's writer.
#[derive(Debug)]
pub struct RecordSink {
    live: Arc<LiveRun>,
    writer: Option<Writer>,
}

impl RecordSink {
    pub fn new(live: Arc<LiveRun>, writer: Writer) -> Self {
        Self {
            live,
            writer: Some(writer),
        }
    }

    fn persist(&mut self, status: &Status) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.write(status),
            None => Err(DagrunError::WriteOpenError(
                "status writer already closed".to_string(),
            )),
        }
    }
}

impl StatusSink for RecordSink {
    fn apply(&mut self, updates: &[NodeUpdate]) -> Result<()> {
        let now = Utc::now();
        let snapshot = {
            let mut status = self.live.lock();
            for update in updates {
                let Some(node) = status.node_mut(&update.step) else {
                    warn!(step = %update.step, "update for unknown node; ignoring");
                    continue;
                };
                node.set_status(update.status);
                match update.status {
                    NodeStatus::Running => node.started_at = Some(now),
                    s if s.is_terminal() => node.finished_at = Some(now),
                    _ => {}
                }
                if update.exit_code.is_some() {
                    node.exit_code = update.exit_code;
                }
                if update.error.is_some() {
                    node.error = update.error.clone();
                }
            }
            status.clone()
        };
        self.persist(&snapshot)
    }

    /// Writes the terminal record, then closes the writer.
    fn finish(&mut self, final_status: SchedulerStatus) -> Result<()> {
        let snapshot = {
            let mut status = self.live.lock();
            status.set_status(final_status);
            status.pid = Pid::NONE;
            status.finished_at = Some(Utc::now());
            status.clone()
        };
        self.persist(&snapshot)?;

        if let Some(writer) = self.writer.take() {
            writer.close()?;
        }
        Ok(())
    }
}
