//! Google Chat channel: renders Card v2 payloads for monitor transitions
//! and test pings, plus a plain-text fallback for everything else.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleChatChannelConfig {
    pub webhook_url: String,
    #[serde(default)]
    pub enabled_events: Option<Vec<String>>,
    #[serde(default)]
    pub space_name: Option<String>,
}

impl GoogleChatChannelConfig {
    pub fn accepts_event(&self, event_type: &str) -> bool {
        match &self.enabled_events {
            Some(events) => events.iter().any(|e| e == event_type),
            None => true,
        }
    }
}

const SIGNATURE_LINE: &str = "— Your friendly Uptime Monitoring Bot";

/// "Feb 23, 2026 11:59 PM UTC" for a unix timestamp.
fn format_timestamp(ts: i64) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%b %-d, %Y %-I:%M %p UTC").to_string(),
        None => ts.to_string(),
    }
}

/// "45s", "2m 34s", "1h 15m", "3d 2h".
fn format_duration(seconds: i64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    let minutes = seconds / 60;
    let rem_seconds = seconds % 60;
    if minutes < 60 {
        return if rem_seconds > 0 {
            format!("{minutes}m {rem_seconds}s")
        } else {
            format!("{minutes}m")
        };
    }
    let hours = minutes / 60;
    let rem_minutes = minutes % 60;
    if hours < 24 {
        return if rem_minutes > 0 { format!("{hours}h {rem_minutes}m") } else { format!("{hours}h") };
    }
    let days = hours / 24;
    let rem_hours = hours % 24;
    if rem_hours > 0 {
        format!("{days}d {rem_hours}h")
    } else {
        format!("{days}d")
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn field(vars: &Value, path: &[&str]) -> String {
    let mut cur = vars;
    for key in path {
        match cur.get(key) {
            Some(next) => cur = next,
            None => return String::new(),
        }
    }
    match cur {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn decorated_text(label: &str, text: String, icon: &str) -> Value {
    json!({
        "decoratedText": {
            "topLabel": label,
            "text": text,
            "startIcon": { "knownIcon": icon },
        }
    })
}

fn signature_widget() -> Value {
    json!({
        "textParagraph": {
            "text": format!("<font color=\"#888888\"><i>{SIGNATURE_LINE}</i></font>"),
        }
    })
}

fn card(card_id: String, title: &str, subtitle: String, widgets: Vec<Value>) -> Value {
    json!({
        "cardsV2": [{
            "cardId": card_id,
            "card": {
                "header": { "title": title, "subtitle": subtitle },
                "sections": [{ "widgets": widgets }],
            },
        }]
    })
}

fn build_monitor_down_card(vars: &Value, timestamp: i64) -> Value {
    let mut widgets = vec![
        decorated_text("Website", format!("<b>{}</b>", field(vars, &["monitor", "target"])), "DESCRIPTION"),
        decorated_text("Status", format!("<b>{}</b>", capitalize(&field(vars, &["state", "status"]))), "BOOKMARK"),
        decorated_text("Time Detected", format_timestamp(timestamp), "CLOCK"),
    ];
    let error = field(vars, &["state", "error"]);
    if !error.is_empty() {
        widgets.push(decorated_text("Error", error, "STAR"));
    }
    widgets.push(signature_widget());

    card(
        format!("uptimer-down-{timestamp}"),
        "🔴 Website Down Alert",
        field(vars, &["monitor", "name"]),
        widgets,
    )
}

fn build_monitor_up_card(vars: &Value, timestamp: i64) -> Value {
    let mut widgets = vec![
        decorated_text("Website", format!("<b>{}</b>", field(vars, &["monitor", "target"])), "DESCRIPTION"),
        decorated_text("Status", format!("<b>{}</b>", capitalize(&field(vars, &["state", "status"]))), "BOOKMARK"),
        decorated_text("Recovered At", format_timestamp(timestamp), "CLOCK"),
    ];
    if let Some(duration) = vars.get("downtime_seconds").and_then(Value::as_i64) {
        if duration > 0 {
            widgets.push(decorated_text(
                "Downtime Duration",
                format!("<b>{}</b>", format_duration(duration)),
                "STAR",
            ));
        }
    }
    widgets.push(signature_widget());

    card(
        format!("uptimer-up-{timestamp}"),
        "✅ Website Recovered",
        field(vars, &["monitor", "name"]),
        widgets,
    )
}

fn build_test_ping_card(vars: &Value, timestamp: i64) -> Value {
    let channel_name = {
        let name = field(vars, &["channel", "name"]);
        if name.is_empty() { "Google Chat".to_string() } else { name }
    };

    card(
        format!("uptimer-test-{timestamp}"),
        "Test Notification",
        "Uptimer Monitoring System".to_string(),
        vec![
            json!({
                "textParagraph": {
                    "text": format!("This is a test notification from <b>{channel_name}</b>."),
                }
            }),
            decorated_text("Test Time", format_timestamp(timestamp), "CLOCK"),
            json!({
                "textParagraph": {
                    "text": "<font color=\"#888888\"><i>If you see this message, your Google Chat integration is working correctly!</i></font>",
                }
            }),
            signature_widget(),
        ],
    )
}

/// Build the Chat message body for an event. Unknown events fall back to a
/// plain text line.
pub fn build_google_chat_card(event_type: &str, vars: &Value, timestamp: i64) -> Value {
    match event_type {
        "monitor.down" => build_monitor_down_card(vars, timestamp),
        "monitor.up" => build_monitor_up_card(vars, timestamp),
        "test.ping" => build_test_ping_card(vars, timestamp),
        _ => json!({ "text": format!("Uptimer event: {event_type}") }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_durations_humanly() {
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(60), "1m");
        assert_eq!(format_duration(154), "2m 34s");
        assert_eq!(format_duration(4500), "1h 15m");
        assert_eq!(format_duration(3600 * 26), "1d 2h");
        assert_eq!(format_duration(3600 * 24 * 3), "3d");
    }

    #[test]
    fn formats_timestamps_in_utc() {
        // 2026-02-23 23:59:00 UTC
        assert_eq!(format_timestamp(1771891140), "Feb 23, 2026 11:59 PM UTC");
        assert_eq!(format_timestamp(0), "Jan 1, 1970 12:00 AM UTC");
    }

    #[test]
    fn down_card_includes_error_when_present() {
        let vars = serde_json::json!({
            "monitor": { "name": "api", "target": "https://example.com/" },
            "state": { "status": "down", "error": "Timeout after 10000ms" },
        });

        let body = build_google_chat_card("monitor.down", &vars, 600);
        let rendered = body.to_string();
        assert!(rendered.contains("Website Down Alert"));
        assert!(rendered.contains("Timeout after 10000ms"));
        assert!(rendered.contains("<b>Down</b>"));
        assert!(rendered.contains("uptimer-down-600"));
    }

    #[test]
    fn up_card_reports_downtime_duration() {
        let vars = serde_json::json!({
            "monitor": { "name": "api", "target": "https://example.com/" },
            "state": { "status": "up" },
            "downtime_seconds": 154,
        });

        let rendered = build_google_chat_card("monitor.up", &vars, 600).to_string();
        assert!(rendered.contains("Website Recovered"));
        assert!(rendered.contains("2m 34s"));
    }

    #[test]
    fn unknown_events_fall_back_to_text() {
        let body = build_google_chat_card("incident.created", &serde_json::json!({}), 0);
        assert_eq!(body, serde_json::json!({ "text": "Uptimer event: incident.created" }));
    }

    #[test]
    fn event_filter_respects_allow_list() {
        let config: GoogleChatChannelConfig = serde_json::from_value(serde_json::json!({
            "webhook_url": "https://chat.googleapis.com/v1/spaces/x/messages?key=k",
            "enabled_events": ["monitor.down", "monitor.up"],
        }))
        .unwrap();

        assert!(config.accepts_event("monitor.down"));
        assert!(!config.accepts_event("test.ping"));
    }
}
