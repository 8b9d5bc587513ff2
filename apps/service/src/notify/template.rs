//! Notification payload templating.
//!
//! Operator templates reference event fields with `{{path.to[0].value}}`
//! placeholders plus the `$MSG` shorthand for the rendered message. Paths
//! are parsed into a small token AST and resolved against a JSON bag, so a
//! hostile template can only ever read from the event payload.

use serde_json::Value;

const FORBIDDEN_KEYS: [&str; 3] = ["__proto__", "prototype", "constructor"];

pub const DEFAULT_JSON_TEMPLATE_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathToken {
    Prop(String),
    Index(usize),
}

fn parse_path(path: &str) -> Option<Vec<PathToken>> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return None;
    }

    let chars: Vec<char> = trimmed.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '.' {
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
            i += 1;
        }
        if i > start {
            let key: String = chars[start..i].iter().collect();
            if FORBIDDEN_KEYS.contains(&key.as_str()) {
                return None;
            }
            tokens.push(PathToken::Prop(key));
        }

        while i < chars.len() && chars[i] == '[' {
            i += 1;
            let idx_start = i;
            while i < chars.len() && chars[i] != ']' {
                i += 1;
            }
            if i >= chars.len() {
                return None;
            }
            let raw: String = chars[idx_start..i].iter().collect();
            i += 1;
            let raw = raw.trim();
            if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            tokens.push(PathToken::Index(raw.parse().ok()?));
        }

        if i < chars.len() && chars[i] == '.' {
            i += 1;
        }
    }

    (!tokens.is_empty()).then_some(tokens)
}

fn resolve_path_value<'a>(vars: &'a Value, path: &str) -> Option<&'a Value> {
    let tokens = parse_path(path)?;

    let mut cur = vars;
    for token in &tokens {
        cur = match token {
            PathToken::Index(idx) => cur.as_array()?.get(*idx)?,
            PathToken::Prop(key) => cur.as_object()?.get(key)?,
        };
    }
    Some(cur)
}

fn to_template_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Render a string template against the event bag. `$MSG` and
/// `{{message}}` both expand to the message variable.
pub fn render_string_template(template: &str, vars: &Value) -> String {
    let message = vars.get("message").and_then(Value::as_str).unwrap_or("");

    if template == "$MSG" {
        return message.to_string();
    }
    let with_msg =
        if message.is_empty() { template.to_string() } else { template.replace("$MSG", message) };

    let mut out = String::with_capacity(with_msg.len());
    let mut rest = with_msg.as_str();
    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        match after.find("}}") {
            Some(close) if !after[..close].contains(['{', '}']) => {
                out.push_str(&rest[..open]);
                let expr = after[..close].trim();
                out.push_str(&to_template_string(resolve_path_value(vars, expr)));
                rest = &after[close + 2..];
            }
            _ => {
                // No well-formed placeholder here; emit one brace and rescan.
                out.push_str(&rest[..open + 1]);
                rest = &rest[open + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Recursively render every string inside a JSON template. Branches deeper
/// than `max_depth` collapse to `null`.
pub fn render_json_template(value: &Value, vars: &Value, max_depth: usize) -> Value {
    fn inner(value: &Value, vars: &Value, depth: usize, max_depth: usize) -> Value {
        if depth > max_depth {
            return Value::Null;
        }
        match value {
            Value::String(s) => Value::String(render_string_template(s, vars)),
            Value::Array(items) => Value::Array(
                items.iter().map(|it| inner(it, vars, depth + 1, max_depth)).collect(),
            ),
            Value::Object(map) => Value::Object(
                map.iter().map(|(k, v)| (k.clone(), inner(v, vars, depth + 1, max_depth))).collect(),
            ),
            other => other.clone(),
        }
    }
    inner(value, vars, 0, max_depth)
}

fn as_string(vars: &Value, path: &str) -> String {
    to_template_string(resolve_path_value(vars, path))
}

/// Fallback message when a channel has no `message_template`.
pub fn default_message_for_event(event_type: &str, vars: &Value) -> String {
    match event_type {
        "monitor.down" => {
            let name = as_string(vars, "monitor.name");
            let target = as_string(vars, "monitor.target");
            let err = as_string(vars, "state.error");
            let mut msg = format!("Monitor DOWN: {name}");
            if !target.is_empty() {
                msg.push_str(&format!(" ({target})"));
            }
            if !err.is_empty() {
                msg.push_str(&format!("\nError: {err}"));
            }
            msg
        }
        "monitor.up" => {
            let name = as_string(vars, "monitor.name");
            let target = as_string(vars, "monitor.target");
            if target.is_empty() {
                format!("Monitor UP: {name}")
            } else {
                format!("Monitor UP: {name} ({target})")
            }
        }
        "incident.created" => {
            let title = as_string(vars, "incident.title");
            let impact = as_string(vars, "incident.impact");
            if impact.is_empty() {
                format!("Incident created: {title}")
            } else {
                format!("Incident created: {title} (impact: {impact})")
            }
        }
        "incident.updated" => {
            let title = as_string(vars, "incident.title");
            let msg = as_string(vars, "update.message");
            if msg.is_empty() {
                format!("Incident updated: {title}")
            } else {
                format!("Incident updated: {title}\n{msg}")
            }
        }
        "incident.resolved" => format!("Incident resolved: {}", as_string(vars, "incident.title")),
        "maintenance.started" => {
            format!("Maintenance started: {}", as_string(vars, "maintenance.title"))
        }
        "maintenance.ended" => {
            format!("Maintenance ended: {}", as_string(vars, "maintenance.title"))
        }
        "test.ping" => "Uptimer test notification".to_string(),
        _ => {
            let ev = as_string(vars, "event");
            if ev.is_empty() {
                "Uptimer notification".to_string()
            } else {
                format!("Uptimer event: {ev}")
            }
        }
    }
}
