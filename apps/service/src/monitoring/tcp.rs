//! TCP connect probe. A completed handshake within the timeout is `up`.

use std::time::{Duration, Instant};

use tokio::net::TcpStream;

use crate::monitoring::targets::{parse_tcp_target, validate_tcp_target};
use crate::monitoring::types::{CheckOutcome, CheckStatus};

const RETRY_DELAYS_MS: [u64; 2] = [300, 800];

#[derive(Debug, Clone)]
pub struct TcpCheckConfig {
    pub target: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone)]
struct Attempt {
    status: CheckStatus,
    latency_ms: Option<i64>,
    error: Option<String>,
}

async fn attempt_tcp_check(config: &TcpCheckConfig) -> Attempt {
    let Some(parsed) = parse_tcp_target(&config.target) else {
        return Attempt {
            status: CheckStatus::Unknown,
            latency_ms: None,
            error: Some("Invalid target format".to_string()),
        };
    };

    let started = Instant::now();
    let timeout = Duration::from_millis(config.timeout_ms);
    let connect = TcpStream::connect((parsed.host.as_str(), parsed.port));

    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => {
            let latency_ms = started.elapsed().as_millis() as i64;
            drop(stream);
            Attempt { status: CheckStatus::Up, latency_ms: Some(latency_ms), error: None }
        }
        Ok(Err(err)) => Attempt {
            status: CheckStatus::Down,
            latency_ms: Some(started.elapsed().as_millis() as i64),
            error: Some(err.to_string()),
        },
        Err(_) => Attempt {
            status: CheckStatus::Down,
            latency_ms: Some(started.elapsed().as_millis() as i64),
            error: Some(format!("Timeout after {}ms", config.timeout_ms)),
        },
    }
}

/// Run a TCP check with retries. `up` and `unknown` are terminal; `down`
/// retries after 300ms, then 800ms.
pub async fn run_tcp_check(config: &TcpCheckConfig) -> CheckOutcome {
    if let Err(err) = validate_tcp_target(&config.target) {
        return CheckOutcome::invalid_target(err.to_string());
    }

    let max_attempts = 1 + RETRY_DELAYS_MS.len() as u32;
    let mut last: Option<CheckOutcome> = None;

    for attempt in 1..=max_attempts {
        let result = attempt_tcp_check(config).await;
        let outcome = CheckOutcome {
            status: result.status,
            latency_ms: result.latency_ms,
            http_status: None,
            error: result.error,
            attempts: attempt,
        };
        if outcome.status != CheckStatus::Down {
            return outcome;
        }

        last = Some(outcome);
        if let Some(&delay) = RETRY_DELAYS_MS.get(attempt as usize - 1) {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    last.unwrap_or_else(|| CheckOutcome {
        status: CheckStatus::Unknown,
        latency_ms: None,
        http_status: None,
        error: Some("No attempts executed".to_string()),
        attempts: 0,
    })
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn connect_to_listener_is_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let attempt = attempt_tcp_check(&TcpCheckConfig {
            target: format!("127.0.0.1:{port}"),
            timeout_ms: 1000,
        })
        .await;

        assert_eq!(attempt.status, CheckStatus::Up);
        assert!(attempt.latency_ms.is_some());
        assert_eq!(attempt.error, None);
    }

    #[tokio::test]
    async fn refused_connect_is_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let attempt = attempt_tcp_check(&TcpCheckConfig {
            target: format!("127.0.0.1:{port}"),
            timeout_ms: 1000,
        })
        .await;

        assert_eq!(attempt.status, CheckStatus::Down);
        assert!(attempt.error.is_some());
    }

    #[tokio::test]
    async fn malformed_target_is_unknown_without_retry() {
        let outcome =
            run_tcp_check(&TcpCheckConfig { target: "no-port".to_string(), timeout_ms: 1000 })
                .await;
        assert_eq!(outcome.status, CheckStatus::Unknown);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(
            outcome.error.as_deref(),
            Some("target must be in host:port format (IPv6: [addr]:port)")
        );
    }

    #[tokio::test]
    async fn blocked_target_is_unknown_without_retry() {
        let outcome = run_tcp_check(&TcpCheckConfig {
            target: "192.168.1.10:5432".to_string(),
            timeout_ms: 1000,
        })
        .await;
        assert_eq!(outcome.status, CheckStatus::Unknown);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.error.as_deref(), Some("target hostname is not allowed"));
    }
}
