// src/models/mod.rs

//! Data types shared by the store, the live-status channel and the
//! controller.

pub mod status;

pub use status::{Node, Pid, Status, StatusFile, split_params};
