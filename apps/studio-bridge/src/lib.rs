//! Bridge between an MCP tool client on stdio and Roblox Studio.
//!
//! Studio cannot accept inbound connections, so the plugin long-polls this
//! process over HTTP. Tool calls arriving on stdin become jobs in the
//! [`broker::JobBroker`]; the plugin picks them up through `GET /poll` and
//! answers through `POST /result`, which wakes the waiting call.

pub mod broker;
pub mod config;
pub mod liveness;
pub mod mcp;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod tools;

pub use broker::{BrokerError, BrokerSettings, BrokerStats, JobBroker};
pub use config::{BridgeConfig, Cli};
pub use liveness::LivenessTracker;
pub use mcp::McpServer;
pub use state::AppState;
