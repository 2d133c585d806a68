//! Plain-POST notification sink
//!
//! Posts short UTF-8 text bodies to a configured URL (an ntfy-style topic).
//! Failures are logged and never propagated; notifications are best-effort.

use std::time::Duration;

/// Per-notification timeout
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Best-effort text notifier
#[derive(Debug, Clone)]
pub struct Notifier {
    url: Option<String>,
    client: reqwest::Client,
}

impl Notifier {
    /// Create a notifier for the given URL; `None` disables sending
    #[must_use]
    pub fn new(url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { url, client }
    }

    /// A notifier that drops everything
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Post a text notification
    pub async fn send(&self, text: &str) {
        let Some(url) = &self.url else {
            return;
        };

        let result = self
            .client
            .post(url)
            .body(text.to_string())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        if let Err(e) = result {
            tracing::error!(url = %url, error = %e, "notification post failed");
        }
    }
}
