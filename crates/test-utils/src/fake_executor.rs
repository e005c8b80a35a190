use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use dagrun::dag::ScheduledStep;
use dagrun::engine::{RuntimeEvent, StepOutcome};
use dagrun::exec::{ExecutorBackend, StepEnv};
use dagrun::errors::{Error, Result};

/// Scripted behaviour for a [`FakeExecutor`].
#[derive(Debug, Clone, Default)]
pub struct FakeScript {
    outcomes: HashMap<String, StepOutcome>,
    hold: HashSet<String>,
}

impl FakeScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `outcome` for `step` instead of `Success`.
    pub fn outcome(mut self, step: &str, outcome: StepOutcome) -> Self {
        self.outcomes.insert(step.to_string(), outcome);
        self
    }

    /// Never complete `step` on its own; it only ends when the run is
    /// canceled.
    pub fn hold(mut self, step: &str) -> Self {
        self.hold.insert(step.to_string());
        self
    }
}

/// A fake executor that:
/// - records which steps were "run" and the environment it was built with
/// - immediately reports `StepCompleted` for each scheduled step, with the
///   scripted outcome
/// - keeps held steps running until `cancel_running`.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    script: FakeScript,
    executed: Arc<Mutex<Vec<String>>>,
    running: Vec<String>,
}

impl FakeExecutor {
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        script: FakeScript,
        executed: Arc<Mutex<Vec<String>>>,
    ) -> Self {
        Self {
            runtime_tx,
            script,
            executed,
            running: Vec::new(),
        }
    }

    /// Factory usable with `dagrun::agent::run_dag_with`.
    ///
    /// The `StepEnv` the agent passes in is stored in `env_seen`.
    pub fn factory(
        script: FakeScript,
        executed: Arc<Mutex<Vec<String>>>,
        env_seen: Arc<Mutex<Option<StepEnv>>>,
    ) -> impl FnOnce(mpsc::Sender<RuntimeEvent>, StepEnv) -> FakeExecutor {
        move |tx, env| {
            *env_seen.lock().unwrap() = Some(env);
            FakeExecutor::new(tx, script, executed)
        }
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_steps(
        &mut self,
        steps: Vec<ScheduledStep>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for s in steps {
                self.executed.lock().unwrap().push(s.name.clone());

                if self.script.hold.contains(&s.name) {
                    self.running.push(s.name);
                    continue;
                }

                let outcome = self
                    .script
                    .outcomes
                    .get(&s.name)
                    .copied()
                    .unwrap_or(StepOutcome::Success);
                let error = match outcome {
                    StepOutcome::Failed(code) => Some(format!("exit status {code}")),
                    _ => None,
                };

                self.runtime_tx
                    .send(RuntimeEvent::StepCompleted {
                        step: s.name,
                        outcome,
                        error,
                    })
                    .await
                    .map_err(Error::from)?;
            }
            Ok(())
        })
    }

    fn cancel_running(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for step in std::mem::take(&mut self.running) {
                self.runtime_tx
                    .send(RuntimeEvent::StepCompleted {
                        step,
                        outcome: StepOutcome::Canceled,
                        error: None,
                    })
                    .await
                    .map_err(Error::from)?;
            }
            Ok(())
        })
    }
}
