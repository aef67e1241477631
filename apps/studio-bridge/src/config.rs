use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::{ensure, Context};
use bridge_proto::{
    DEFAULT_CLIENT_ID, DEFAULT_HTTP_PORT, DEFAULT_JOB_TIMEOUT_SECS, DEFAULT_LIVENESS_WINDOW_SECS,
    DEFAULT_POLL_TIMEOUT_SECS,
};
use clap::Parser;

use crate::broker::BrokerSettings;

pub const DEFAULT_MAX_PENDING_JOBS: usize = 1024;

#[derive(Debug, Parser)]
#[command(
    name = "studio-bridge",
    author,
    version,
    about = "MCP stdio server relaying tool calls to Roblox Studio over HTTP long-poll"
)]
pub struct Cli {
    /// Interface the HTTP listener binds to.
    #[arg(long, env = "STUDIO_BRIDGE_HTTP_BIND", default_value = "0.0.0.0")]
    pub http_bind: String,

    #[arg(long, env = "STUDIO_BRIDGE_HTTP_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    pub http_port: u16,

    /// How long an idle `GET /poll` is held open.
    #[arg(
        long = "poll-timeout",
        env = "STUDIO_BRIDGE_POLL_TIMEOUT_SECS",
        default_value_t = DEFAULT_POLL_TIMEOUT_SECS
    )]
    pub poll_timeout_secs: u64,

    /// How long a tool call waits for Studio to post a result.
    #[arg(
        long = "job-timeout",
        env = "STUDIO_BRIDGE_JOB_TIMEOUT_SECS",
        default_value_t = DEFAULT_JOB_TIMEOUT_SECS
    )]
    pub job_timeout_secs: u64,

    /// A client counts as connected while its last poll or ping is this recent.
    #[arg(
        long = "liveness-window",
        env = "STUDIO_BRIDGE_LIVENESS_WINDOW_SECS",
        default_value_t = DEFAULT_LIVENESS_WINDOW_SECS
    )]
    pub liveness_window_secs: u64,

    /// Upper bound on jobs awaiting a result across all clients.
    #[arg(
        long,
        env = "STUDIO_BRIDGE_MAX_PENDING_JOBS",
        default_value_t = DEFAULT_MAX_PENDING_JOBS
    )]
    pub max_pending_jobs: usize,

    /// Client id used when a request does not name one.
    #[arg(long, env = "STUDIO_BRIDGE_CLIENT_ID", default_value = DEFAULT_CLIENT_ID)]
    pub client_id: String,

    /// Serve HTTP only; do not read MCP requests from stdin.
    #[arg(long, env = "STUDIO_BRIDGE_HTTP_ONLY", default_value_t = false)]
    pub http_only: bool,

    /// Suppress per-request logging.
    #[arg(long, env = "STUDIO_BRIDGE_QUIET", default_value_t = false)]
    pub quiet: bool,
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub listen_addr: SocketAddr,
    pub poll_timeout: Duration,
    pub job_timeout: Duration,
    pub liveness_window: Duration,
    pub max_pending_jobs: usize,
    pub client_id: String,
    pub http_only: bool,
    pub quiet: bool,
}

impl BridgeConfig {
    pub fn broker_settings(&self) -> BrokerSettings {
        BrokerSettings {
            job_timeout: self.job_timeout,
            max_pending_jobs: self.max_pending_jobs,
        }
    }
}

impl TryFrom<Cli> for BridgeConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let ip: IpAddr = cli
            .http_bind
            .parse()
            .with_context(|| format!("invalid bind address: {}", cli.http_bind))?;
        ensure!(cli.poll_timeout_secs > 0, "--poll-timeout must be at least 1 second");
        ensure!(cli.job_timeout_secs > 0, "--job-timeout must be at least 1 second");
        ensure!(
            cli.liveness_window_secs > 0,
            "--liveness-window must be at least 1 second"
        );
        ensure!(cli.max_pending_jobs > 0, "--max-pending-jobs must be positive");
        let client_id = cli.client_id.trim().to_string();
        ensure!(!client_id.is_empty(), "--client-id must not be empty");

        Ok(BridgeConfig {
            listen_addr: SocketAddr::new(ip, cli.http_port),
            poll_timeout: Duration::from_secs(cli.poll_timeout_secs),
            job_timeout: Duration::from_secs(cli.job_timeout_secs),
            liveness_window: Duration::from_secs(cli.liveness_window_secs),
            max_pending_jobs: cli.max_pending_jobs,
            client_id,
            http_only: cli.http_only,
            quiet: cli.quiet,
        })
    }
}
