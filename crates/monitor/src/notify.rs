//! Out-of-band notifications.
//!
//! Device loops never talk to the [`NotificationSink`] directly. They hand
//! messages to a [`Notifier`], which queues them on an unbounded channel
//! drained by a single dispatcher task. Sampling therefore never waits on
//! delivery, and deliveries are serialized. Failed deliveries are logged and
//! dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::PushoverConfig;

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Label used for notices about the monitor itself rather than a device.
pub const MONITOR_LABEL: &str = "Laundry monitor";

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

pub fn finished_message(device_label: &str) -> String {
    format!("{device_label} has finished")
}

pub fn started_message(device_labels: &[&str]) -> String {
    format!("Laundry monitor started ({})", device_labels.join(", "))
}

pub fn setup_failed_message(error: &dyn std::fmt::Display) -> String {
    format!("Laundry monitor failed to start: {error}")
}

pub fn crashed_message(device_label: &str, error: &dyn std::fmt::Display) -> String {
    format!("{device_label} monitor crashed: {error}")
}

pub const STOPPED_MESSAGE: &str = "Laundry monitor stopped running.";

// ---------------------------------------------------------------------------
// Sink capability
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The notification service rejected the message.
    #[error("Notification service returned HTTP {status}: {detail}")]
    Rejected { status: u16, detail: String },
}

/// Delivers a message about a device out-of-band.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, message: &str, device_label: &str) -> Result<(), SendError>;
}

// ---------------------------------------------------------------------------
// Pushover
// ---------------------------------------------------------------------------

/// Form body accepted by the Pushover messages API.
#[derive(Debug, Serialize)]
struct PushoverMessage<'a> {
    token: &'a str,
    user: &'a str,
    title: &'a str,
    message: &'a str,
    sound: &'a str,
}

/// Error body returned by Pushover on a rejected request.
#[derive(Debug, Default, Deserialize)]
struct PushoverResponse {
    #[serde(default)]
    errors: Vec<String>,
}

/// Sends push notifications through the Pushover messages API.
pub struct PushoverSink {
    client: reqwest::Client,
    config: PushoverConfig,
}

impl PushoverSink {
    pub fn new(config: PushoverConfig) -> Result<Self, SendError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl NotificationSink for PushoverSink {
    async fn send(&self, message: &str, device_label: &str) -> Result<(), SendError> {
        let form = PushoverMessage {
            token: &self.config.token,
            user: &self.config.user,
            title: device_label,
            message,
            sound: &self.config.sound,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        tracing::info!(device = device_label, text = message, status = status.as_u16(), "Notification sent");

        if !status.is_success() {
            let body: PushoverResponse = response.json().await.unwrap_or_default();
            let detail = if body.errors.is_empty() {
                "no error detail".to_string()
            } else {
                body.errors.join("; ")
            };
            return Err(SendError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Notification {
    message: String,
    device_label: String,
}

/// Fire-and-forget handle for queueing notifications.
///
/// Cheap to clone; the dispatcher task exits once every clone is dropped
/// and the queue has drained.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    /// Spawn the dispatcher task delivering through `sink`.
    pub fn spawn(sink: Arc<dyn NotificationSink>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(dispatch(sink, rx));
        (Self { tx }, handle)
    }

    /// Queue a notification without waiting for delivery.
    pub fn notify(&self, message: impl Into<String>, device_label: impl Into<String>) {
        let notification = Notification {
            message: message.into(),
            device_label: device_label.into(),
        };
        if let Err(e) = self.tx.send(notification) {
            tracing::error!(text = %e.0.message, "Notification dispatcher is gone, dropping message");
        }
    }
}

async fn dispatch(sink: Arc<dyn NotificationSink>, mut rx: mpsc::UnboundedReceiver<Notification>) {
    while let Some(notification) = rx.recv().await {
        if let Err(e) = sink
            .send(&notification.message, &notification.device_label)
            .await
        {
            tracing::error!(
                device = %notification.device_label,
                text = %notification.message,
                error = %e,
                "Notification delivery failed",
            );
        }
    }
    tracing::debug!("Notification dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_formats() {
        assert_eq!(finished_message("Washer"), "Washer has finished");
        assert_eq!(
            started_message(&["Washer", "Dryer"]),
            "Laundry monitor started (Washer, Dryer)"
        );
        assert_eq!(
            crashed_message("Dryer", &"boom"),
            "Dryer monitor crashed: boom"
        );
        assert_eq!(
            setup_failed_message(&"no route to host"),
            "Laundry monitor failed to start: no route to host"
        );
    }

    #[test]
    fn send_error_display_rejected() {
        let err = SendError::Rejected {
            status: 400,
            detail: "application token is invalid".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Notification service returned HTTP 400: application token is invalid"
        );
    }
}
