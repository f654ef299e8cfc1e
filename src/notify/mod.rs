/// External notifier interface
///
/// The core hands notification requests to an external delivery system and
/// never waits on the outcome. Implementations log failures; nothing in the
/// engine treats a lost notification as an error.

use async_trait::async_trait;

/// Fire-and-forget notification sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, kind: &str, record_id: &str, recipients: &[String]);
}

/// Notifier that drops everything; used in tests and when no webhook is
/// configured.
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, kind: &str, record_id: &str, _recipients: &[String]) {
        tracing::debug!("Dropping notification '{}' for record {}", kind, record_id);
    }
}

/// Notifier that POSTs each request to a configured webhook endpoint.
#[derive(Debug)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, kind: &str, record_id: &str, recipients: &[String]) {
        let body = serde_json::json!({
            "kind": kind,
            "record_id": record_id,
            "recipients": recipients,
        });

        match self.client.post(&self.url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("Delivered notification '{}' for record {}", kind, record_id);
            }
            Ok(response) => {
                tracing::warn!(
                    "Notifier endpoint returned {} for record {}",
                    response.status(),
                    record_id
                );
            }
            Err(e) => {
                tracing::warn!("Notification delivery failed for record {}: {}", record_id, e);
            }
        }
    }
}
