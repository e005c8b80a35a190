// src/sock/mod.rs

//! Live-status channel: HTTP/1.1 (via `hyper`) over a per-DAG Unix socket.
//!
//! The execution process serves `GET /status` and `POST /stop`; everyone else
//! talks to it through [`SockClient`], which reports any failure as "not
//! running".

pub mod client;
pub mod server;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub use client::SockClient;
pub use server::{SockServer, StatusHandler};

/// Why a request on the channel did not produce a body.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("nothing is listening on {}: {source}", addr.display())]
    NotRunning {
        addr: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    #[error("invalid request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("server answered with status {0}")]
    Status(u16),
}
