use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dagrun::models::Status;
use dagrun::sock::{SockServer, StatusHandler};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Handler that serves a fixed record and counts stop requests.
#[derive(Debug)]
pub struct FixedStatus {
    status: Mutex<Status>,
    stops: AtomicUsize,
}

impl FixedStatus {
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn set(&self, status: Status) {
        *self.status.lock().unwrap() = status;
    }
}

impl StatusHandler for FixedStatus {
    fn status(&self) -> Status {
        self.status.lock().unwrap().clone()
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// A live-status server standing in for an execution process.
pub struct FakeStatusServer {
    pub handler: Arc<FixedStatus>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl FakeStatusServer {
    /// Bind `addr` and serve `status` until [`FakeStatusServer::shutdown`].
    pub async fn spawn(addr: &Path, status: Status) -> Self {
        let server = SockServer::bind(addr).await.expect("bind fake status server");
        let handler = Arc::new(FixedStatus {
            status: Mutex::new(status),
            stops: AtomicUsize::new(0),
        });

        let (tx, rx) = oneshot::channel::<()>();
        let served = Arc::clone(&handler);
        let task = tokio::spawn(async move {
            server
                .serve(served, async move {
                    let _ = rx.await;
                })
                .await
                .expect("fake status server failed");
        });

        Self {
            handler,
            shutdown: Some(tx),
            task: Some(task),
        }
    }

    /// Stop serving and wait until the socket file is gone.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.await.expect("fake status server task panicked");
        }
    }
}
