use crate::error::NotifyError;
use crate::AutomationHandler;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use vigil_common::types::{Event, WebhookAudit};

/// Fixed client-side timeout for a single webhook request.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Total delivery attempts before giving up.
pub(crate) const MAX_ATTEMPTS: u32 = 3;

/// First retry interval; doubles per attempt.
pub(crate) const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Audit entries keep at most this many response-body characters.
const MAX_AUDIT_BODY_CHARS: usize = 500;

/// Generic webhook sender with retry, exponential backoff, and URL
/// allow-listing.
///
/// Params shape: `{url, method?, data?}`. The payload posted is
/// `{event, timestamp, params}` where `timestamp` is the event's
/// `observed` time and `params` is the `data` map. Successful delivery
/// appends `{url, status, body}` to the event's webhook audit trail.
pub struct WebhookSender {
    client: reqwest::Client,
    allow_list: Vec<String>,
    backoff_base: Duration,
}

impl WebhookSender {
    /// An empty `allow_list` permits any URL; a non-empty list refuses
    /// targets not present in it.
    pub fn new(allow_list: Vec<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            allow_list,
            backoff_base: DEFAULT_BACKOFF,
        }
    }

    /// Overrides the first backoff interval (doubles per attempt).
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    async fn attempt(&self, method: &str, url: &str, payload: &Value) -> Result<(u16, String)> {
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .unwrap_or(reqwest::Method::POST);
        let resp = self
            .client
            .request(method, url)
            .json(payload)
            .send()
            .await
            .map_err(NotifyError::Http)?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if status.is_success() {
            Ok((status.as_u16(), body))
        } else {
            Err(NotifyError::Api {
                status: status.as_u16(),
                body: truncate_chars(&body, MAX_AUDIT_BODY_CHARS),
            }
            .into())
        }
    }
}

#[async_trait]
impl AutomationHandler for WebhookSender {
    async fn run(&self, params: &Value, event: &Event) -> Result<()> {
        let Some(url) = params.get("url").and_then(Value::as_str) else {
            tracing::warn!("webhook action missing url, skipping");
            return Ok(());
        };
        let method = params
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("POST")
            .to_uppercase();

        if !self.allow_list.is_empty() && !self.allow_list.iter().any(|a| a == url) {
            tracing::warn!(
                url,
                error = %NotifyError::TargetNotAllowed(url.to_string()),
                "webhook refused"
            );
            return Ok(());
        }

        let payload = json!({
            "event": event,
            "timestamp": event.observed,
            "params": params.get("data").cloned().unwrap_or_else(|| json!({})),
        });

        for attempt in 0..MAX_ATTEMPTS {
            match self.attempt(&method, url, &payload).await {
                Ok((status, body)) => {
                    tracing::info!(url, status, "webhook delivered");
                    event.record_webhook_response(WebhookAudit {
                        url: url.to_string(),
                        status,
                        body: truncate_chars(&body, MAX_AUDIT_BODY_CHARS),
                    });
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(url, attempt = attempt + 1, error = %e, "webhook attempt failed");
                }
            }
            if attempt + 1 < MAX_ATTEMPTS {
                tokio::time::sleep(self.backoff_base * 2u32.pow(attempt)).await;
            }
        }

        tracing::error!(url, attempts = MAX_ATTEMPTS, "webhook failed after all attempts");
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook.send"
    }
}

/// Truncate to at most `max` characters, never splitting a multi-byte
/// character.
fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
