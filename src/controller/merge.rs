// src/controller/merge.rs

//! Which source answers "what is this DAG doing right now".

use std::future::Future;

use crate::errors::Result;
use crate::models::Status;

/// Two views of one DAG's current run: the live process, if any, and the
/// durable store.
pub trait StatusSource {
    /// Ask the live process. `None` means nothing answered.
    fn try_live(&self) -> impl Future<Output = Option<Status>> + Send;

    /// Read the durable record. Never fails for "nothing recorded"; that case
    /// yields a `None`-status record.
    fn read_durable(&self) -> Result<Status>;
}

/// A live answer always wins. Without one, the store is authoritative.
pub async fn resolve_status<S: StatusSource + Sync>(source: &S) -> Result<Status> {
    match source.try_live().await {
        Some(live) => Ok(live),
        None => source.read_durable(),
    }
}
