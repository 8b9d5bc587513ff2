//! Scripted fakes shared by scheduler and admin-boundary tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::monitoring::types::{CheckOutcome, CheckStatus};
use crate::monitoring::{CheckRunner, HttpCheckConfig, TcpCheckConfig};
use crate::notify::{OutboundRequest, TransportResponse, WebhookTransport};

/// Returns scripted outcomes per target; defaults to a fast `up`.
pub struct FakeCheckRunner {
    outcomes: Mutex<HashMap<String, CheckOutcome>>,
}

impl FakeCheckRunner {
    pub fn new() -> Self {
        Self { outcomes: Mutex::new(HashMap::new()) }
    }

    pub fn script(&self, target: &str, outcome: CheckOutcome) {
        self.outcomes.lock().unwrap().insert(target.to_string(), outcome);
    }

    fn outcome_for(&self, target: &str) -> CheckOutcome {
        self.outcomes.lock().unwrap().get(target).cloned().unwrap_or(CheckOutcome {
            status: CheckStatus::Up,
            latency_ms: Some(12),
            http_status: Some(200),
            error: None,
            attempts: 1,
        })
    }
}

impl Default for FakeCheckRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckRunner for FakeCheckRunner {
    async fn http(&self, config: &HttpCheckConfig) -> CheckOutcome {
        self.outcome_for(&config.url)
    }

    async fn tcp(&self, config: &TcpCheckConfig) -> CheckOutcome {
        self.outcome_for(&config.target)
    }
}

/// Records outbound requests and answers with a fixed status.
pub struct FakeTransport {
    pub requests: Mutex<Vec<OutboundRequest>>,
    pub response_status: u16,
    gate: Option<Arc<Semaphore>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::with_status(200)
    }

    pub fn with_status(response_status: u16) -> Self {
        Self { requests: Mutex::new(Vec::new()), response_status, gate: None }
    }

    /// Holds every send until the gate releases a permit, so tests can
    /// observe what happens while a delivery is still in flight.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self { requests: Mutex::new(Vec::new()), response_status: 200, gate: Some(gate) }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookTransport for FakeTransport {
    async fn send(&self, request: OutboundRequest) -> anyhow::Result<TransportResponse> {
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        self.requests.lock().unwrap().push(request);
        Ok(TransportResponse { http_status: self.response_status, body: "ok".to_string() })
    }
}
