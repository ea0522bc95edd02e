use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::time::Duration;
use url::Url;

#[derive(Debug, Parser)]
#[command(name = "netgate-console", about = "Live approval console for network join requests")]
pub struct Cli {
    /// Base URL of the network management server
    #[arg(long, env = "NETGATE_BASE_URL", default_value = "http://127.0.0.1:8000")]
    pub base_url: String,

    /// Network whose status is polled
    #[arg(long, env = "NETGATE_NETWORK_ID", default_value_t = 1)]
    pub network_id: u64,

    /// Display name of the router node
    #[arg(long, env = "NETGATE_NETWORK_NAME", default_value = "Network")]
    pub network_name: String,

    #[arg(long, env = "NETGATE_CSRF_TOKEN")]
    pub csrf_token: Option<String>,

    /// Value of the `sessionid` cookie of an authenticated operator
    #[arg(long, env = "NETGATE_SESSION_COOKIE")]
    pub session_cookie: Option<String>,

    #[arg(long, default_value_t = 5)]
    pub poll_interval_secs: u64,

    #[arg(long, default_value_t = 60)]
    pub intruder_ttl_secs: u64,

    #[arg(long, default_value_t = 10)]
    pub request_timeout_secs: u64,

    #[command(subcommand)]
    pub mode: Option<Mode>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Mode {
    /// Operator console window (default)
    Console,
    /// Poll without a window and log every change
    Watch,
    /// Guest window for requesting access to the network
    Join {
        /// Device to request access for; can also be picked in the window
        #[arg(long)]
        device_id: Option<u64>,
    },
}

/// Validated runtime settings shared by every mode.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: Url,
    pub network_id: u64,
    pub network_name: String,
    pub csrf_token: Option<String>,
    pub session_cookie: Option<String>,
    pub poll_interval: Duration,
    pub intruder_ttl: Duration,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        if cli.poll_interval_secs == 0 {
            bail!("--poll-interval-secs must be greater than zero");
        }
        if cli.intruder_ttl_secs == 0 {
            bail!("--intruder-ttl-secs must be greater than zero");
        }
        if cli.request_timeout_secs == 0 {
            bail!("--request-timeout-secs must be greater than zero");
        }
        let base_url = Url::parse(&cli.base_url)
            .map_err(|e| anyhow::anyhow!("Invalid base URL {}: {}", cli.base_url, e))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            bail!("base URL must use http or https, got {}", base_url.scheme());
        }

        Ok(Self {
            base_url,
            network_id: cli.network_id,
            network_name: cli.network_name.clone(),
            csrf_token: cli.csrf_token.clone(),
            session_cookie: cli.session_cookie.clone(),
            poll_interval: Duration::from_secs(cli.poll_interval_secs),
            intruder_ttl: Duration::from_secs(cli.intruder_ttl_secs),
            request_timeout: Duration::from_secs(cli.request_timeout_secs),
        })
    }

    /// WebSocket endpoint of the guest join channel, derived from the base URL.
    pub fn join_socket_url(&self) -> Result<Url> {
        let mut url = self.base_url.join("/ws/network/join/")?;
        let scheme = if self.base_url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| anyhow::anyhow!("Cannot derive websocket URL from {}", self.base_url))?;
        Ok(url)
    }
}
