// src/sock/client.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use hyper::client::conn;
use hyper::{Body, Request, StatusCode, header};
use tokio::net::UnixStream;
use tracing::debug;

use crate::models::Status;

use super::ChannelError;

/// Client side of the live-status channel.
///
/// Transport failures are the normal state of affairs for a DAG that is not
/// running, so [`SockClient::status`] and [`SockClient::stop`] fold every
/// failure into "no live server" instead of returning an error.
#[derive(Debug, Clone)]
pub struct SockClient {
    addr: PathBuf,
    timeout: Duration,
}

impl SockClient {
    pub fn new(addr: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    pub fn addr(&self) -> &Path {
        &self.addr
    }

    /// One request/response exchange, bounded by the client timeout.
    /// Only non-200 answers and transport problems are errors here.
    pub async fn request(&self, method: &str, path: &str) -> Result<Vec<u8>, ChannelError> {
        match tokio::time::timeout(self.timeout, self.exchange(method, path)).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout(self.timeout)),
        }
    }

    async fn exchange(&self, method: &str, path: &str) -> Result<Vec<u8>, ChannelError> {
        let stream = UnixStream::connect(&self.addr)
            .await
            .map_err(|source| ChannelError::NotRunning {
                addr: self.addr.clone(),
                source,
            })?;

        let (mut sender, connection) = conn::handshake(stream).await?;
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "status connection closed with error");
            }
        });

        let request = Request::builder()
            .method(method)
            .uri(path)
            .header(header::HOST, "localhost")
            .body(Body::empty())?;

        let result = async {
            let response = sender.send_request(request).await?;
            if response.status() != StatusCode::OK {
                return Err(ChannelError::Status(response.status().as_u16()));
            }
            let body = hyper::body::to_bytes(response.into_body()).await?;
            Ok::<_, ChannelError>(body.to_vec())
        }
        .await;

        driver.abort();
        result
    }

    /// Current in-memory record of the live run, or `None` when no process
    /// answers.
    pub async fn status(&self) -> Option<Status> {
        let body = match self.request("GET", "/status").await {
            Ok(body) => body,
            Err(e) => {
                debug!(addr = %self.addr.display(), error = %e, "no live status");
                return None;
            }
        };

        match Status::from_json(&body) {
            Ok(status) => Some(status),
            Err(e) => {
                debug!(addr = %self.addr.display(), error = %e, "live status could not be decoded");
                None
            }
        }
    }

    /// Ask the live run to cancel. Returns whether a server acknowledged.
    pub async fn stop(&self) -> bool {
        match self.request("POST", "/stop").await {
            Ok(_) => true,
            Err(e) => {
                debug!(addr = %self.addr.display(), error = %e, "stop not delivered");
                false
            }
        }
    }
}
