//! Remote call boundary between the dispatcher and workers.
//!
//! ## Contents
//! - [`WorkerClient`], [`HttpWorkerClient`] the dispatcher side
//! - [`router`], [`WorkerState`] the worker side (axum)
//! - [`RpcError`] transport vs status failures

mod client;
mod server;

pub use client::{
    HttpWorkerClient, RpcError, WorkerClient, WorkerResponse, BROWSER_VERSION_HEADER,
    WORKER_ID_HEADER,
};
pub use server::{error_response, router, WorkerState};
