//! Webhook channel: config schema, payload shaping, and the HTTP transport
//! seam used by the dispatcher.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::template::{
    render_json_template, render_string_template, DEFAULT_JSON_TEMPLATE_DEPTH,
};

pub const SIGNATURE_HEADER: &str = "X-Uptimer-Signature";
pub const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadType {
    #[default]
    Json,
    Param,
    #[serde(rename = "x-www-form-urlencoded")]
    FormUrlencoded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSigning {
    pub enabled: bool,
    pub secret_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookChannelConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub payload_type: PayloadType,
    #[serde(default)]
    pub message_template: Option<String>,
    #[serde(default)]
    pub payload_template: Option<Value>,
    /// Absent means the channel receives every event type.
    #[serde(default)]
    pub enabled_events: Option<Vec<String>>,
    #[serde(default)]
    pub signing: Option<WebhookSigning>,
}

fn default_method() -> String {
    "POST".to_string()
}

impl WebhookChannelConfig {
    pub fn accepts_event(&self, event_type: &str) -> bool {
        match &self.enabled_events {
            Some(events) => events.iter().any(|e| e == event_type),
            None => true,
        }
    }
}

/// What the dispatcher hands the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub http_status: u16,
    pub body: String,
}

/// Transport seam over reqwest so dispatch logic is testable offline.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> anyhow::Result<TransportResponse>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn send(&self, request: OutboundRequest) -> anyhow::Result<TransportResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .unwrap_or(reqwest::Method::POST);

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(Duration::from_millis(request.timeout_ms));
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let http_status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(TransportResponse { http_status, body })
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn render_flat_pairs(template: &Value, vars: &Value) -> Vec<(String, String)> {
    let rendered = render_json_template(template, vars, DEFAULT_JSON_TEMPLATE_DEPTH);
    match rendered.as_object() {
        Some(map) => map.iter().map(|(k, v)| (k.clone(), scalar_to_string(v))).collect(),
        None => Vec::new(),
    }
}

fn form_encode(pairs: &[(String, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        serializer.append_pair(k, v);
    }
    serializer.finish()
}

fn append_query_params(raw_url: &str, pairs: &[(String, String)]) -> anyhow::Result<String> {
    let mut parsed = url::Url::parse(raw_url)?;
    {
        let mut query = parsed.query_pairs_mut();
        for (k, v) in pairs {
            query.append_pair(k, v);
        }
    }
    Ok(parsed.to_string())
}

fn sign_body(secret: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build the outbound request for one webhook delivery. `vars` must already
/// carry the rendered `message`.
pub fn build_webhook_request(
    config: &WebhookChannelConfig,
    vars: &Value,
) -> anyhow::Result<OutboundRequest> {
    let mut headers: Vec<(String, String)> =
        config.headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

    let (url, body) = match config.payload_type {
        PayloadType::Json => {
            let payload = match &config.payload_template {
                Some(template) => render_json_template(template, vars, DEFAULT_JSON_TEMPLATE_DEPTH),
                None => vars.clone(),
            };
            if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type")) {
                headers.push(("Content-Type".to_string(), "application/json".to_string()));
            }
            (config.url.clone(), Some(serde_json::to_string(&payload)?))
        }
        PayloadType::Param => {
            let pairs = match &config.payload_template {
                Some(template) => render_flat_pairs(template, vars),
                None => vec![(
                    "message".to_string(),
                    vars.get("message").and_then(Value::as_str).unwrap_or("").to_string(),
                )],
            };
            (append_query_params(&config.url, &pairs)?, None)
        }
        PayloadType::FormUrlencoded => {
            let pairs = match &config.payload_template {
                Some(template) => render_flat_pairs(template, vars),
                None => vec![(
                    "message".to_string(),
                    vars.get("message").and_then(Value::as_str).unwrap_or("").to_string(),
                )],
            };
            if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type")) {
                headers.push((
                    "Content-Type".to_string(),
                    "application/x-www-form-urlencoded".to_string(),
                ));
            }
            (config.url.clone(), Some(form_encode(&pairs)))
        }
    };

    if let Some(signing) = &config.signing {
        if signing.enabled {
            let secret = std::env::var(&signing.secret_ref).map_err(|_| {
                anyhow::anyhow!("signing secret env var {} is not set", signing.secret_ref)
            })?;
            let signature = sign_body(&secret, body.as_deref().unwrap_or(""));
            headers.push((SIGNATURE_HEADER.to_string(), signature));
        }
    }

    Ok(OutboundRequest {
        url,
        method: config.method.clone(),
        headers,
        body,
        timeout_ms: config.timeout_ms.unwrap_or(DEFAULT_DELIVERY_TIMEOUT_MS),
    })
}

/// Render the message for a webhook channel, template or default.
pub fn render_webhook_message(config: &WebhookChannelConfig, event_type: &str, vars: &Value) -> String {
    match &config.message_template {
        Some(template) => render_string_template(template, vars),
        None => super::template::default_message_for_event(event_type, vars),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn base_config(payload_type: PayloadType) -> WebhookChannelConfig {
        WebhookChannelConfig {
            url: "https://hooks.example.com/notify".to_string(),
            method: "POST".to_string(),
            headers: BTreeMap::new(),
            timeout_ms: None,
            payload_type,
            message_template: None,
            payload_template: None,
            enabled_events: None,
            signing: None,
        }
    }

    #[test]
    fn config_defaults_apply_on_deserialize() {
        let config: WebhookChannelConfig =
            serde_json::from_str(r#"{"url":"https://hooks.example.com/x"}"#).unwrap();
        assert_eq!(config.method, "POST");
        assert_eq!(config.payload_type, PayloadType::Json);
        assert!(config.headers.is_empty());
        assert!(config.accepts_event("monitor.down"));

        let config: WebhookChannelConfig = serde_json::from_value(json!({
            "url": "https://hooks.example.com/x",
            "payload_type": "x-www-form-urlencoded",
            "enabled_events": ["monitor.down"],
        }))
        .unwrap();
        assert_eq!(config.payload_type, PayloadType::FormUrlencoded);
        assert!(config.accepts_event("monitor.down"));
        assert!(!config.accepts_event("monitor.up"));
    }

    #[test]
    fn json_payload_defaults_to_event_bag() {
        let config = base_config(PayloadType::Json);
        let vars = json!({ "event": "monitor.down", "message": "down" });

        let request = build_webhook_request(&config, &vars).unwrap();
        assert_eq!(request.url, config.url);
        assert_eq!(request.timeout_ms, DEFAULT_DELIVERY_TIMEOUT_MS);
        assert!(request
            .headers
            .contains(&("Content-Type".to_string(), "application/json".to_string())));
        let body: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, vars);
    }

    #[test]
    fn json_payload_template_is_rendered() {
        let mut config = base_config(PayloadType::Json);
        config.payload_template = Some(json!({ "text": "$MSG", "m": "{{monitor.name}}" }));
        let vars = json!({ "message": "down", "monitor": { "name": "api" } });

        let request = build_webhook_request(&config, &vars).unwrap();
        let body: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({ "text": "down", "m": "api" }));
    }

    #[test]
    fn param_payload_appends_query_pairs() {
        let mut config = base_config(PayloadType::Param);
        config.payload_template = Some(json!({ "text": "$MSG", "chat_id": 42 }));
        let vars = json!({ "message": "api is down" });

        let request = build_webhook_request(&config, &vars).unwrap();
        assert_eq!(request.body, None);
        assert!(request.url.contains("text=api+is+down"));
        assert!(request.url.contains("chat_id=42"));
    }

    #[test]
    fn form_payload_is_urlencoded() {
        let mut config = base_config(PayloadType::FormUrlencoded);
        config.payload_template = Some(json!({ "text": "$MSG" }));
        let vars = json!({ "message": "a b&c" });

        let request = build_webhook_request(&config, &vars).unwrap();
        assert_eq!(request.body.as_deref(), Some("text=a+b%26c"));
        assert!(request
            .headers
            .contains(&("Content-Type".to_string(), "application/x-www-form-urlencoded".to_string())));
    }

    #[test]
    fn signing_adds_signature_header() {
        let mut config = base_config(PayloadType::Json);
        config.signing = Some(WebhookSigning {
            enabled: true,
            secret_ref: "UPTIMER_TEST_WEBHOOK_SECRET".to_string(),
        });
        unsafe { std::env::set_var("UPTIMER_TEST_WEBHOOK_SECRET", "s3cret") };

        let vars = json!({ "message": "down" });
        let request = build_webhook_request(&config, &vars).unwrap();
        let signature = request
            .headers
            .iter()
            .find(|(k, _)| k == SIGNATURE_HEADER)
            .map(|(_, v)| v.clone())
            .unwrap();
        assert_eq!(signature, sign_body("s3cret", request.body.as_deref().unwrap()));
        assert_eq!(signature.len(), 64);
    }

    #[test]
    fn signing_with_missing_secret_fails() {
        let mut config = base_config(PayloadType::Json);
        config.signing = Some(WebhookSigning {
            enabled: true,
            secret_ref: "UPTIMER_TEST_MISSING_SECRET".to_string(),
        });
        unsafe { std::env::remove_var("UPTIMER_TEST_MISSING_SECRET") };

        assert!(build_webhook_request(&config, &json!({})).is_err());
    }

    #[test]
    fn custom_message_template_wins_over_default() {
        let mut config = base_config(PayloadType::Json);
        let vars = json!({
            "message": "ignored",
            "monitor": { "name": "api", "target": "https://example.com/" },
        });

        assert_eq!(
            render_webhook_message(&config, "monitor.up", &vars),
            "Monitor UP: api (https://example.com/)"
        );

        config.message_template = Some("[{{monitor.name}}] recovered".to_string());
        assert_eq!(render_webhook_message(&config, "monitor.up", &vars), "[api] recovered");
    }
}
