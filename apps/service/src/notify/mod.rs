//! Notification dispatch.
//!
//! Delivery is at-most-once per `(event_key, channel)`: a claim row is
//! inserted before any network call, and losing the claim is a normal
//! outcome, not an error. Send failures are recorded on the delivery row;
//! there is no retry loop.

pub mod google_chat;
pub mod template;
pub mod webhook;

use serde_json::Value;
use tracing::{debug, warn};

pub use template::{default_message_for_event, render_json_template, render_string_template};
pub use webhook::{
    build_webhook_request, HttpTransport, OutboundRequest, TransportResponse, WebhookChannelConfig,
    WebhookTransport,
};

use crate::database::models::{ChannelKind, NotificationChannel};
use crate::database::Database;
use google_chat::{build_google_chat_card, GoogleChatChannelConfig};

const MAX_RECORDED_ERROR_BYTES: usize = 500;

/// One event to fan out. `vars` is the template bag; `message` is injected
/// per channel before rendering.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub event_type: String,
    pub event_key: String,
    pub timestamp: i64,
    pub vars: Value,
}

impl NotificationEvent {
    pub fn new(event_type: &str, event_key: String, timestamp: i64, mut vars: Value) -> Self {
        if let Some(map) = vars.as_object_mut() {
            map.insert("event".to_string(), Value::String(event_type.to_string()));
            map.insert("timestamp".to_string(), Value::from(timestamp));
        }
        Self { event_type: event_type.to_string(), event_key, timestamp, vars }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub success: bool,
    pub http_status: Option<u16>,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn status_str(&self) -> &'static str {
        if self.success { "success" } else { "failed" }
    }
}

fn truncate_error(text: &str) -> String {
    if text.len() <= MAX_RECORDED_ERROR_BYTES {
        return text.to_string();
    }
    let mut end = MAX_RECORDED_ERROR_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

fn outcome_from_response(response: TransportResponse) -> DeliveryOutcome {
    if (200..300).contains(&response.http_status) {
        DeliveryOutcome { success: true, http_status: Some(response.http_status), error: None }
    } else {
        DeliveryOutcome {
            success: false,
            http_status: Some(response.http_status),
            error: Some(truncate_error(&format!(
                "HTTP {}: {}",
                response.http_status, response.body
            ))),
        }
    }
}

fn build_request_for_channel(
    channel: &NotificationChannel,
    event: &NotificationEvent,
) -> anyhow::Result<Option<OutboundRequest>> {
    let mut vars = event.vars.clone();
    if let Some(map) = vars.as_object_mut() {
        map.insert(
            "channel".to_string(),
            serde_json::json!({ "id": channel.id, "name": channel.name }),
        );
    }

    match channel.kind {
        ChannelKind::Webhook => {
            let config: WebhookChannelConfig = serde_json::from_str(&channel.config_json)?;
            if !config.accepts_event(&event.event_type) {
                return Ok(None);
            }
            let message = webhook::render_webhook_message(&config, &event.event_type, &vars);
            if let Some(map) = vars.as_object_mut() {
                map.insert("message".to_string(), Value::String(message));
            }
            Ok(Some(build_webhook_request(&config, &vars)?))
        }
        ChannelKind::GoogleChat => {
            let config: GoogleChatChannelConfig = serde_json::from_str(&channel.config_json)?;
            if !config.accepts_event(&event.event_type) {
                return Ok(None);
            }
            let card = build_google_chat_card(&event.event_type, &vars, event.timestamp);
            Ok(Some(OutboundRequest {
                url: config.webhook_url,
                method: "POST".to_string(),
                headers: vec![("Content-Type".to_string(), "application/json".to_string())],
                body: Some(card.to_string()),
                timeout_ms: webhook::DEFAULT_DELIVERY_TIMEOUT_MS,
            }))
        }
    }
}

/// Deliver one event to one channel. Returns `None` when the channel filters
/// the event out or another worker holds the claim.
pub async fn dispatch_to_channel(
    db: &dyn Database,
    transport: &dyn WebhookTransport,
    channel: &NotificationChannel,
    event: &NotificationEvent,
) -> anyhow::Result<Option<DeliveryOutcome>> {
    let request = match build_request_for_channel(channel, event) {
        Ok(Some(request)) => Some(request),
        Ok(None) => return Ok(None),
        Err(err) => {
            warn!(channel = channel.id, error = %err, "notification channel config is invalid");
            None
        }
    };

    if !db.claim_notification_delivery(&event.event_key, channel.id, event.timestamp).await? {
        debug!(
            channel = channel.id,
            event_key = %event.event_key,
            "delivery already claimed"
        );
        return Ok(None);
    }

    let outcome = match request {
        None => DeliveryOutcome {
            success: false,
            http_status: None,
            error: Some("channel config is invalid".to_string()),
        },
        Some(request) => match transport.send(request).await {
            Ok(response) => outcome_from_response(response),
            Err(err) => DeliveryOutcome {
                success: false,
                http_status: None,
                error: Some(truncate_error(&err.to_string())),
            },
        },
    };

    db.finalize_notification_delivery(
        &event.event_key,
        channel.id,
        outcome.status_str(),
        outcome.http_status,
        outcome.error.as_deref(),
    )
    .await?;

    Ok(Some(outcome))
}

/// Fan an event out to every given channel. Per-channel failures are logged
/// and recorded; they never abort the rest of the fan-out.
pub async fn dispatch_event(
    db: &dyn Database,
    transport: &dyn WebhookTransport,
    channels: &[NotificationChannel],
    event: &NotificationEvent,
) {
    for channel in channels {
        match dispatch_to_channel(db, transport, channel, event).await {
            Ok(Some(outcome)) if !outcome.success => {
                warn!(
                    channel = channel.id,
                    event_key = %event.event_key,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "notification delivery failed"
                );
            }
            Ok(_) => {}
            Err(err) => {
                warn!(
                    channel = channel.id,
                    event_key = %event.event_key,
                    error = %err,
                    "notification delivery errored"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::database::repository::tests::test_db;
    use crate::testutil::FakeTransport;

    async fn insert_channel(
        db: &crate::database::DatabaseImpl,
        kind: &str,
        config: Value,
        created_at: i64,
    ) -> NotificationChannel {
        let mut channel = NotificationChannel {
            id: 0,
            name: "chan".to_string(),
            kind: ChannelKind::parse(kind).unwrap(),
            config_json: config.to_string(),
            is_active: true,
            created_at,
        };
        channel.id = db.insert_channel(&channel).await.unwrap();
        channel
    }

    fn event(event_type: &str, key: &str) -> NotificationEvent {
        NotificationEvent::new(
            event_type,
            key.to_string(),
            600,
            json!({
                "monitor": { "name": "api", "target": "https://example.com/" },
                "state": { "status": "down", "error": "Unexpected HTTP status: 503" },
            }),
        )
    }

    #[tokio::test]
    async fn delivers_once_per_event_and_channel() {
        let (_dir, db) = test_db().await;
        let channel =
            insert_channel(&db, "webhook", json!({ "url": "https://hooks.example.com/n" }), 0)
                .await;
        let transport = FakeTransport::with_status(204);
        let ev = event("monitor.down", "monitor:1:down:600");

        let first = dispatch_to_channel(&db, &transport, &channel, &ev).await.unwrap();
        assert_eq!(
            first,
            Some(DeliveryOutcome { success: true, http_status: Some(204), error: None })
        );

        let second = dispatch_to_channel(&db, &transport, &channel, &ev).await.unwrap();
        assert_eq!(second, None);
        assert_eq!(transport.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_send_is_recorded_not_retried() {
        let (_dir, db) = test_db().await;
        let channel =
            insert_channel(&db, "webhook", json!({ "url": "https://hooks.example.com/n" }), 0)
                .await;
        let transport = FakeTransport::with_status(500);
        let ev = event("monitor.down", "monitor:1:down:600");

        let outcome = dispatch_to_channel(&db, &transport, &channel, &ev).await.unwrap().unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.http_status, Some(500));
        assert!(outcome.error.as_deref().unwrap().starts_with("HTTP 500"));

        // The claim row persists, so the failure is not re-sent.
        assert_eq!(dispatch_to_channel(&db, &transport, &channel, &ev).await.unwrap(), None);
    }

    #[tokio::test]
    async fn event_filter_skips_without_claiming() {
        let (_dir, db) = test_db().await;
        let channel = insert_channel(
            &db,
            "webhook",
            json!({ "url": "https://hooks.example.com/n", "enabled_events": ["monitor.up"] }),
            0,
        )
        .await;
        let transport = FakeTransport::with_status(204);
        let ev = event("monitor.down", "monitor:1:down:600");

        assert_eq!(dispatch_to_channel(&db, &transport, &channel, &ev).await.unwrap(), None);
        assert!(transport.requests.lock().unwrap().is_empty());
        // The event key is still claimable by a matching channel later.
        assert!(db.claim_notification_delivery("monitor:1:down:600", channel.id, 600).await.unwrap());
    }

    #[tokio::test]
    async fn google_chat_channels_post_cards() {
        let (_dir, db) = test_db().await;
        let channel = insert_channel(
            &db,
            "google-chat",
            json!({ "webhook_url": "https://chat.googleapis.com/v1/spaces/x/messages" }),
            0,
        )
        .await;
        let transport = FakeTransport::with_status(200);
        let ev = event("monitor.down", "monitor:1:down:600");

        let outcome = dispatch_to_channel(&db, &transport, &channel, &ev).await.unwrap().unwrap();
        assert!(outcome.success);

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].url.starts_with("https://chat.googleapis.com/"));
        assert!(requests[0].body.as_deref().unwrap().contains("cardsV2"));
    }

    #[tokio::test]
    async fn invalid_config_finalizes_failed() {
        let (_dir, db) = test_db().await;
        let channel = insert_channel(&db, "webhook", json!({ "not_url": true }), 0).await;
        let transport = FakeTransport::with_status(200);
        let ev = event("monitor.down", "monitor:1:down:600");

        let outcome = dispatch_to_channel(&db, &transport, &channel, &ev).await.unwrap().unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("channel config is invalid"));
        assert!(transport.requests.lock().unwrap().is_empty());
    }
}
