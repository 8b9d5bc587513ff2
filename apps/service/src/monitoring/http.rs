//! HTTP(S) probe.
//!
//! One check is up to three attempts; only `down` results retry. The body is
//! only read when a keyword assertion is configured, and never past 1 MiB.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, Method};

use crate::monitoring::targets::validate_http_target;
use crate::monitoring::types::{CheckOutcome, CheckStatus};

pub const DEFAULT_USER_AGENT: &str = "Uptimer/0.1";

pub(crate) const RETRY_DELAYS_MS: [u64; 2] = [300, 800];
const MAX_ASSERTION_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct HttpCheckConfig {
    pub url: String,
    pub timeout_ms: u64,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub expected_status: Option<Vec<u16>>,
    pub response_keyword: Option<String>,
    pub response_forbidden_keyword: Option<String>,
}

/// A single attempt, before the retry loop assigns `attempts`.
#[derive(Debug, Clone)]
struct Attempt {
    status: CheckStatus,
    latency_ms: Option<i64>,
    http_status: Option<u16>,
    error: Option<String>,
}

impl Attempt {
    fn into_outcome(self, attempts: u32) -> CheckOutcome {
        CheckOutcome {
            status: self.status,
            latency_ms: self.latency_ms,
            http_status: self.http_status,
            error: self.error,
            attempts,
        }
    }
}

fn status_ok(http_status: u16, expected: Option<&[u16]>) -> bool {
    match expected {
        Some(list) if !list.is_empty() => list.contains(&http_status),
        _ => (200..300).contains(&http_status),
    }
}

/// Evaluate keyword assertions against a (possibly truncated) body prefix.
/// Returns `None` when every configured assertion passes.
fn assert_keywords(
    text: &str,
    truncated: bool,
    required: Option<&str>,
    forbidden: Option<&str>,
) -> Option<(CheckStatus, String)> {
    if let Some(keyword) = required {
        if !text.contains(keyword) {
            return Some(if truncated {
                (
                    CheckStatus::Unknown,
                    format!(
                        "Response body exceeded {MAX_ASSERTION_BODY_BYTES} bytes; cannot assert required keyword"
                    ),
                )
            } else {
                (CheckStatus::Down, "Response keyword not found".to_string())
            });
        }
    }

    if let Some(keyword) = forbidden {
        if text.contains(keyword) {
            return Some((CheckStatus::Down, "Forbidden response keyword found".to_string()));
        }
        if truncated {
            return Some((
                CheckStatus::Unknown,
                format!(
                    "Response body exceeded {MAX_ASSERTION_BODY_BYTES} bytes; cannot assert forbidden keyword absence"
                ),
            ));
        }
    }

    None
}

fn build_headers(pairs: &[(String, String)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else { continue };
        let Ok(value) = HeaderValue::from_str(value) else { continue };
        headers.insert(name, value);
    }
    if !headers.contains_key(USER_AGENT) {
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    }
    headers
}

async fn attempt_http_check(client: &Client, config: &HttpCheckConfig) -> Attempt {
    let started = Instant::now();
    let timeout = Duration::from_millis(config.timeout_ms);

    let method = Method::from_bytes(config.method.as_bytes()).unwrap_or(Method::GET);
    let mut request = client
        .request(method, &config.url)
        .timeout(timeout)
        .headers(build_headers(&config.headers));
    if let Some(body) = &config.body {
        request = request.body(body.clone());
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            let latency_ms = started.elapsed().as_millis() as i64;
            let error = if err.is_timeout() {
                format!("Timeout after {}ms", config.timeout_ms)
            } else {
                err.to_string()
            };
            return Attempt {
                status: CheckStatus::Down,
                latency_ms: Some(latency_ms),
                http_status: None,
                error: Some(error),
            };
        }
    };

    let latency_ms = started.elapsed().as_millis() as i64;
    let http_status = response.status().as_u16();

    if !status_ok(http_status, config.expected_status.as_deref()) {
        return Attempt {
            status: CheckStatus::Down,
            latency_ms: Some(latency_ms),
            http_status: Some(http_status),
            error: Some(format!("Unexpected HTTP status: {http_status}")),
        };
    }

    let required = config.response_keyword.as_deref();
    let forbidden = config.response_forbidden_keyword.as_deref();
    if required.is_none() && forbidden.is_none() {
        return Attempt {
            status: CheckStatus::Up,
            latency_ms: Some(latency_ms),
            http_status: Some(http_status),
            error: None,
        };
    }

    // Stream the body only as far as the assertion cap.
    let mut buffer: Vec<u8> = Vec::new();
    let mut truncated = false;
    let mut response = response;
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let remaining = MAX_ASSERTION_BODY_BYTES - buffer.len();
                if chunk.len() >= remaining {
                    buffer.extend_from_slice(&chunk[..remaining]);
                    truncated = chunk.len() > remaining || {
                        // At exactly the cap, anything further means truncation.
                        matches!(response.chunk().await, Ok(Some(_)))
                    };
                    break;
                }
                buffer.extend_from_slice(&chunk);
            }
            Ok(None) => break,
            Err(err) => {
                let error = if err.is_timeout() {
                    format!("Timeout after {}ms", config.timeout_ms)
                } else {
                    err.to_string()
                };
                return Attempt {
                    status: CheckStatus::Down,
                    latency_ms: Some(latency_ms),
                    http_status: Some(http_status),
                    error: Some(error),
                };
            }
        }
    }

    let text = String::from_utf8_lossy(&buffer);
    match assert_keywords(&text, truncated, required, forbidden) {
        Some((status, error)) => Attempt {
            status,
            latency_ms: Some(latency_ms),
            http_status: Some(http_status),
            error: Some(error),
        },
        None => Attempt {
            status: CheckStatus::Up,
            latency_ms: Some(latency_ms),
            http_status: Some(http_status),
            error: None,
        },
    }
}

/// Run an HTTP check with retries. `up` and `unknown` are terminal; `down`
/// retries after 300ms, then 800ms.
pub async fn run_http_check(client: &Client, config: &HttpCheckConfig) -> CheckOutcome {
    if let Err(err) = validate_http_target(&config.url) {
        return CheckOutcome::invalid_target(err.to_string());
    }

    let max_attempts = 1 + RETRY_DELAYS_MS.len() as u32;
    let mut last: Option<CheckOutcome> = None;

    for attempt in 1..=max_attempts {
        let outcome = attempt_http_check(client, config).await.into_outcome(attempt);
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
    use super::*;

    fn config(url: &str) -> HttpCheckConfig {
        HttpCheckConfig {
            url: url.to_string(),
            timeout_ms: 1000,
            method: "GET".to_string(),
            headers: Vec::new(),
            body: None,
            expected_status: None,
            response_keyword: None,
            response_forbidden_keyword: None,
        }
    }

    #[test]
    fn status_ok_defaults_to_2xx() {
        assert!(status_ok(200, None));
        assert!(status_ok(299, None));
        assert!(!status_ok(301, None));
        assert!(!status_ok(500, None));
    }

    #[test]
    fn status_ok_honours_expected_list() {
        assert!(status_ok(404, Some(&[404])));
        assert!(!status_ok(200, Some(&[404])));
        // An empty list falls back to the 2xx default.
        assert!(status_ok(204, Some(&[])));
    }

    #[test]
    fn keyword_assertions() {
        assert_eq!(assert_keywords("all good", false, Some("good"), None), None);
        assert_eq!(
            assert_keywords("nope", false, Some("good"), None),
            Some((CheckStatus::Down, "Response keyword not found".to_string()))
        );
        assert_eq!(
            assert_keywords("fatal error", false, None, Some("error")),
            Some((CheckStatus::Down, "Forbidden response keyword found".to_string()))
        );
        assert_eq!(assert_keywords("healthy", false, None, Some("error")), None);
    }

    #[test]
    fn truncated_body_makes_assertions_inconclusive() {
        let missing = assert_keywords("partial", true, Some("good"), None).unwrap();
        assert_eq!(missing.0, CheckStatus::Unknown);
        assert!(missing.1.contains("exceeded 1048576 bytes"));

        let absent = assert_keywords("partial", true, None, Some("error")).unwrap();
        assert_eq!(absent.0, CheckStatus::Unknown);
        assert!(absent.1.contains("exceeded 1048576 bytes"));

        // A forbidden keyword that was already seen is conclusive.
        assert_eq!(
            assert_keywords("an error occurred", true, None, Some("error")),
            Some((CheckStatus::Down, "Forbidden response keyword found".to_string()))
        );
    }

    #[test]
    fn default_user_agent_is_injected() {
        let headers = build_headers(&[]);
        assert_eq!(headers.get(USER_AGENT).unwrap(), DEFAULT_USER_AGENT);

        let headers =
            build_headers(&[("User-Agent".to_string(), "custom/1.0".to_string())]);
        assert_eq!(headers.get(USER_AGENT).unwrap(), "custom/1.0");
    }

    #[tokio::test]
    async fn blocked_target_short_circuits() {
        let client = Client::new();
        let outcome = run_http_check(&client, &config("https://127.0.0.1/")).await;
        assert_eq!(outcome.status, CheckStatus::Unknown);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.latency_ms, None);
        assert_eq!(outcome.error.as_deref(), Some("target hostname is not allowed"));
    }

    #[tokio::test]
    async fn malformed_url_short_circuits() {
        let client = Client::new();
        let outcome = run_http_check(&client, &config("not a url")).await;
        assert_eq!(outcome.status, CheckStatus::Unknown);
        assert_eq!(outcome.error.as_deref(), Some("target must be a valid URL"));
    }
}
