// src/exec/executor_loop.rs

//! Main executor loop that manages running step processes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::dag::ScheduledStep;
use crate::engine::RuntimeEvent;
use crate::exec::StepEnv;
use crate::exec::step_runner::run_step;

/// What the runtime asks of the executor loop.
#[derive(Debug, Clone)]
pub enum ExecutorCommand {
    Run(ScheduledStep),
    CancelAll,
}

/// Internal handle for a currently-running step.
struct ActiveStep {
    cancel: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// Each step runs in its own Tokio task. A step name is never running twice;
/// a second `Run` for a live step is ignored.
pub fn spawn_executor(
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    env: Arc<StepEnv>,
) -> mpsc::Sender<ExecutorCommand> {
    let (tx, mut rx) = mpsc::channel::<ExecutorCommand>(32);

    tokio::spawn(async move {
        info!("executor loop started");

        let mut active: HashMap<String, ActiveStep> = HashMap::new();

        while let Some(command) = rx.recv().await {
            active.retain(|_, step| !step.handle.is_finished());
            match command {
                ExecutorCommand::Run(step) => {
                    start_step(step, &mut active, &env, &runtime_tx);
                }
                ExecutorCommand::CancelAll => cancel_all(&mut active),
            }
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

fn start_step(
    step: ScheduledStep,
    active: &mut HashMap<String, ActiveStep>,
    env: &Arc<StepEnv>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) {
    let name = step.name.clone();
    if active.contains_key(&name) {
        warn!(step = %name, "step already running; ignoring duplicate dispatch");
        return;
    }

    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let rt_tx = runtime_tx.clone();
    let env = Arc::clone(env);
    let spawn_name = name.clone();

    let handle = tokio::spawn(async move {
        run_step(step, env, rt_tx, cancel_rx).await;
        debug!(step = %spawn_name, "step runner future finished");
    });

    active.insert(
        name,
        ActiveStep {
            cancel: Some(cancel_tx),
            handle,
        },
    );
}

fn cancel_all(active: &mut HashMap<String, ActiveStep>) {
    for (name, step) in active.iter_mut() {
        match step.cancel.take() {
            Some(cancel) => {
                info!(step = %name, "canceling running step");
                if cancel.send(()).is_err() {
                    debug!(step = %name, "step already finished while canceling");
                }
            }
            None => debug!(step = %name, "step already canceled"),
        }
    }
}
