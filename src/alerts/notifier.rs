//! Notification dispatch.
//!
//! A templated JSON body posted via `reqwest`, fail-open on transport
//! errors (an unreachable webhook must never block alert evaluation), with
//! every attempt logged.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::alerts::state::Alert;
use crate::ids::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Webhook,
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: Id,
    pub name: String,
    pub kind: ChannelKind,
    pub url: Option<String>,
    pub timeout_ms: u64,
    /// `${field}` placeholders substituted into the request body.
    pub body_template: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("channel {0} missing a url")]
    MissingUrl(Id),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("channel responded with status {0}")]
    BadStatus(u16),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel: &NotificationChannel, alert: &Alert, rule_name: &str) -> Result<(), NotifyError>;
}

fn render_template(template: &str, fields: &HashMap<&str, String>) -> String {
    let mut out = template.to_string();
    for (k, v) in fields {
        out = out.replace(&format!("${{{k}}}"), v);
    }
    out
}

/// Fires a webhook POST with a JSON body built from `render_template`.
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, channel: &NotificationChannel, alert: &Alert, rule_name: &str) -> Result<(), NotifyError> {
        let url = channel
            .url
            .as_ref()
            .ok_or_else(|| NotifyError::MissingUrl(channel.id))?;

        let mut fields = HashMap::new();
        fields.insert("alert_id", alert.id.to_string());
        fields.insert("rule_name", rule_name.to_string());
        fields.insert("state", format!("{:?}", alert.state));
        fields.insert("value", alert.value.to_string());

        let body: Value = match &channel.body_template {
            Some(tpl) => {
                let rendered = render_template(tpl, &fields);
                serde_json::from_str(&rendered).unwrap_or(Value::String(rendered))
            }
            None => serde_json::json!({
                "alert_id": alert.id.to_string(),
                "rule_name": rule_name,
                "state": format!("{:?}", alert.state),
                "value": alert.value,
            }),
        };

        debug!(channel = %channel.name, url, "dispatching alert notification");

        let resp = self
            .client
            .post(url)
            .timeout(Duration::from_millis(channel.timeout_ms))
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            warn!(channel = %channel.name, status = %resp.status(), "notifier channel returned non-success");
            return Err(NotifyError::BadStatus(resp.status().as_u16()));
        }
        Ok(())
    }
}

/// Writes the notification to the trace log instead of over the network —
/// used for channels with no `url` and in tests.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, channel: &NotificationChannel, alert: &Alert, rule_name: &str) -> Result<(), NotifyError> {
        tracing::info!(
            channel = %channel.name,
            alert = %alert.id,
            rule = rule_name,
            state = ?alert.state,
            "alert notification"
        );
        Ok(())
    }
}
