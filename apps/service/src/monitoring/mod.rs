//! Probe execution: target validation, HTTP/TCP checkers, and the
//! debouncing state machine.

pub mod http;
pub mod state_machine;
pub mod targets;
pub mod tcp;
pub mod types;

use async_trait::async_trait;

pub use http::{run_http_check, HttpCheckConfig};
pub use state_machine::{compute_next_state, NextState, OutageAction, StateSnapshot, StateThresholds};
pub use tcp::{run_tcp_check, TcpCheckConfig};
pub use types::{CheckOutcome, CheckStatus, MonitorStatus};

/// Seam between the scheduler and the network. Production uses
/// [`NetworkCheckRunner`]; tests substitute a scripted fake.
#[async_trait]
pub trait CheckRunner: Send + Sync {
    async fn http(&self, config: &HttpCheckConfig) -> CheckOutcome;
    async fn tcp(&self, config: &TcpCheckConfig) -> CheckOutcome;
}

/// A fully resolved probe for one monitor, ready to hand to a runner.
#[derive(Debug, Clone)]
pub enum ProbeConfig {
    Http(HttpCheckConfig),
    Tcp(TcpCheckConfig),
}

impl ProbeConfig {
    pub async fn run(&self, checks: &dyn CheckRunner) -> CheckOutcome {
        match self {
            ProbeConfig::Http(config) => checks.http(config).await,
            ProbeConfig::Tcp(config) => checks.tcp(config).await,
        }
    }
}

pub struct NetworkCheckRunner {
    client: reqwest::Client,
}

impl NetworkCheckRunner {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for NetworkCheckRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckRunner for NetworkCheckRunner {
    async fn http(&self, config: &HttpCheckConfig) -> CheckOutcome {
        run_http_check(&self.client, config).await
    }

    async fn tcp(&self, config: &TcpCheckConfig) -> CheckOutcome {
        run_tcp_check(config).await
    }
}
