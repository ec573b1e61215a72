//! # Request and result types shared by the dispatcher and the worker.
//!
//! - [`RenderRequest`]: what to render and how (validated before admission);
//! - [`RenderResult`]: PDF bytes plus the engine version that produced them.

mod request;
mod result;

pub use request::{
    Cookie, Margin, RenderOptions, RenderRequest, SameSite, WaitFor, WaitForOptions,
    ValidationError, MAX_TIMEOUT_MS,
};
pub use result::{BrowserVersion, RenderResult};
