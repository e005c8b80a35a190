// src/sock/server.rs

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hyper::header::{self, HeaderValue};
use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, Method, Request, Response, StatusCode};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use crate::errors::{DagrunError, Result};
use crate::models::Status;

/// How long `bind` waits for an existing socket to answer before treating it
/// as stale.
const PROBE_TIMEOUT: Duration = Duration::from_millis(250);
/// Slow or idle clients are dropped after this long.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// What the execution process exposes over its socket.
pub trait StatusHandler: Send + Sync + 'static {
    /// Snapshot of the in-memory status record.
    fn status(&self) -> Status;

    /// Request cancellation. Must be idempotent.
    fn stop(&self);
}

/// Live-status server bound to a DAG's socket address.
///
/// The socket file is removed when the server is dropped, whether `serve`
/// returned normally or never ran.
#[derive(Debug)]
pub struct SockServer {
    addr: PathBuf,
    listener: UnixListener,
    // Declared last so the listener closes before the file goes away.
    _guard: AddrGuard,
}

impl SockServer {
    /// Bind `addr`. A socket file that still answers means another live
    /// process owns it ([`DagrunError::AddressInUse`]); one that does not
    /// answer is a leftover and is replaced.
    pub async fn bind(addr: impl Into<PathBuf>) -> Result<Self> {
        let addr = addr.into();
        if let Some(parent) = addr.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if std::fs::symlink_metadata(&addr).is_ok() {
            match tokio::time::timeout(PROBE_TIMEOUT, UnixStream::connect(&addr)).await {
                Ok(Ok(_)) => return Err(DagrunError::AddressInUse(addr)),
                _ => {
                    warn!(addr = %addr.display(), "removing stale status socket");
                    remove_socket_file(&addr)?;
                }
            }
        }

        let listener = UnixListener::bind(&addr).map_err(|e| {
            if e.kind() == io::ErrorKind::AddrInUse {
                DagrunError::AddressInUse(addr.clone())
            } else {
                DagrunError::IoError(e)
            }
        })?;

        Ok(Self {
            _guard: AddrGuard(addr.clone()),
            addr,
            listener,
        })
    }

    pub fn addr(&self) -> &Path {
        &self.addr
    }

    /// Answer requests until `shutdown` resolves, then close the listener and
    /// remove the socket file.
    pub async fn serve<H, F>(self, handler: Arc<H>, shutdown: F) -> Result<()>
    where
        H: StatusHandler,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(addr = %self.addr.display(), "live status server listening");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let handler = Arc::clone(&handler);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, handler).await {
                                debug!(error = %e, "status connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept on status socket failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                }
            }
        }

        info!(addr = %self.addr.display(), "live status server stopped");
        Ok(())
    }
}

/// One request per connection. Malformed or oversized requests are answered
/// by hyper itself (400/431) before they reach [`route`].
async fn handle_connection<H: StatusHandler>(stream: UnixStream, handler: Arc<H>) -> hyper::Result<()> {
    let service = service_fn(move |request: Request<Body>| {
        let response = route(&request, handler.as_ref());
        async move { Ok::<_, Infallible>(response) }
    });

    let connection = Http::new()
        .http1_only(true)
        .http1_keep_alive(false)
        .serve_connection(stream, service);

    match tokio::time::timeout(CONNECTION_TIMEOUT, connection).await {
        Ok(result) => result,
        Err(_) => {
            debug!("status connection timed out");
            Ok(())
        }
    }
}

fn route<H: StatusHandler>(request: &Request<Body>, handler: &H) -> Response<Body> {
    match (request.method(), request.uri().path()) {
        (&Method::GET, "/status") => match handler.status().to_json() {
            Ok(body) => respond(StatusCode::OK, "application/json", body),
            Err(e) => respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", e.to_string()),
        },
        (&Method::POST, "/stop") => {
            debug!("stop requested over status socket");
            handler.stop();
            respond(StatusCode::OK, "text/plain", "OK")
        }
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
    }
}

fn respond(code: StatusCode, content_type: &'static str, body: impl Into<Body>) -> Response<Body> {
    let mut response = Response::new(body.into());
    *response.status_mut() = code;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn remove_socket_file(addr: &Path) -> io::Result<()> {
    match std::fs::remove_file(addr) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[derive(Debug)]
struct AddrGuard(PathBuf);

impl Drop for AddrGuard {
    fn drop(&mut self) {
        if let Err(e) = remove_socket_file(&self.0) {
            warn!(addr = %self.0.display(), error = %e, "could not remove status socket");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    use super::*;
    use crate::config::{Dag, Step};
    use crate::sock::SockClient;
    use crate::types::SchedulerStatus;

    struct Fixed {
        status: Mutex<Status>,
        stops: AtomicUsize,
    }

    impl StatusHandler for Fixed {
        fn status(&self) -> Status {
            self.status.lock().unwrap().clone()
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.status.lock().unwrap().set_status(SchedulerStatus::Cancel);
        }
    }

    fn running() -> Status {
        let dag = Dag::new_unchecked("etl", "/tmp/etl.toml", vec![Step::new("a", "true")]);
        let mut status = Status::placeholder(&dag);
        status.request_id = "req-1".to_string();
        status.set_status(SchedulerStatus::Running);
        status
    }

    #[tokio::test]
    async fn serves_status_and_stop_then_removes_socket() {
        let dir = tempfile::tempdir().unwrap();
        let addr = dir.path().join("s.sock");
        let server = SockServer::bind(&addr).await.unwrap();
        let handler = Arc::new(Fixed {
            status: Mutex::new(running()),
            stops: AtomicUsize::new(0),
        });

        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.serve(Arc::clone(&handler), async {
            let _ = rx.await;
        }));

        let client = SockClient::new(&addr, Duration::from_secs(2));
        let live = client.status().await.unwrap();
        assert_eq!(live.request_id, "req-1");
        assert_eq!(live.status, SchedulerStatus::Running);

        assert!(client.stop().await);
        assert!(client.stop().await);
        assert_eq!(handler.stops.load(Ordering::SeqCst), 2);
        assert_eq!(client.status().await.unwrap().status, SchedulerStatus::Cancel);

        assert!(matches!(
            client.request("GET", "/nope").await,
            Err(crate::sock::ChannelError::Status(404))
        ));

        tx.send(()).unwrap();
        task.await.unwrap().unwrap();
        assert!(!addr.exists());
        assert!(client.status().await.is_none());
    }

    #[tokio::test]
    async fn live_address_is_in_use() {
        let dir = tempfile::tempdir().unwrap();
        let addr = dir.path().join("s.sock");
        let _first = SockServer::bind(&addr).await.unwrap();

        let second = SockServer::bind(&addr).await;
        assert!(matches!(second, Err(DagrunError::AddressInUse(_))));
        assert!(addr.exists());
    }

    #[tokio::test]
    async fn stale_socket_is_replaced_and_dropped_server_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let addr = dir.path().join("s.sock");
        drop(std::os::unix::net::UnixListener::bind(&addr).unwrap());
        assert!(addr.exists());

        let server = SockServer::bind(&addr).await.unwrap();
        assert_eq!(server.addr(), addr.as_path());
        drop(server);
        assert!(!addr.exists());
    }

    async fn spawn_server(addr: &Path) -> (Arc<Fixed>, oneshot::Sender<()>) {
        let server = SockServer::bind(addr).await.unwrap();
        let handler = Arc::new(Fixed {
            status: Mutex::new(running()),
            stops: AtomicUsize::new(0),
        });
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(server.serve(Arc::clone(&handler), async {
            let _ = rx.await;
        }));
        (handler, tx)
    }

    async fn raw_exchange(addr: &Path, request: &[u8]) -> Vec<u8> {
        let mut stream = UnixStream::connect(addr).await.unwrap();
        // The server may hang up before it has read everything.
        let _ = stream.write_all(request).await;
        let mut reply = Vec::new();
        let _ = stream.read_to_end(&mut reply).await;
        reply
    }

    #[tokio::test]
    async fn garbage_request_is_rejected_without_touching_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let addr = dir.path().join("s.sock");
        let (handler, _shutdown) = spawn_server(&addr).await;

        let reply = raw_exchange(&addr, b"NOT HTTP AT ALL\r\n\r\n").await;
        assert!(reply.starts_with(b"HTTP/1.1 4"), "{}", String::from_utf8_lossy(&reply));
        assert_eq!(handler.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn endless_request_line_is_cut_off() {
        let dir = tempfile::tempdir().unwrap();
        let addr = dir.path().join("s.sock");
        let (_handler, _shutdown) = spawn_server(&addr).await;

        let mut request = b"GET /".to_vec();
        request.extend(std::iter::repeat_n(b'a', 4 * 1024 * 1024));

        let reply = tokio::time::timeout(Duration::from_secs(3), raw_exchange(&addr, &request))
            .await
            .expect("server should give up on an oversized request");
        assert!(!reply.starts_with(b"HTTP/1.1 200"));
    }
}
