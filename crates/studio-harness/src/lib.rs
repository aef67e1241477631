//! Host-side harness for the studio bridge.
//!
//! The host application cannot accept connections, so it drives the link:
//! [`PollLoop`] long-polls the bridge through [`BridgeClient`], hands each
//! job to the [`JobHandler`] registered for its type, and posts the result
//! back. Script jobs are served by [`ScriptService`] over any
//! [`ScriptHost`]; [`MemoryScriptHost`] backs tests and local demos.

mod cache;
mod client;
mod error;
mod handler;
mod poll_loop;
mod script;

pub use cache::InstanceCache;
pub use client::BridgeClient;
pub use error::{HarnessError, HarnessResult};
pub use handler::{HandlerOutcome, HandlerRegistry, JobHandler};
pub use poll_loop::PollLoop;
pub use script::{
    register_script_handlers, InstanceRef, MemoryScriptHost, ScriptHandle, ScriptHost,
    ScriptHostError, ScriptService, DEFAULT_CACHE_CAPACITY,
};
