/// Outbound notifications (admin alerts, payment links, OTP codes, credentials)
///
/// Delivery is best-effort: `Dispatcher::dispatch` hands the notification
/// to a spawned task and returns immediately. A failed delivery is logged and
/// never fails the operation that triggered it.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Admin channel: a new enquiry arrived
    EnquiryReceived {
        enquiry_id: String,
        name: String,
        email: String,
        course_title: String,
    },
    PaymentLink {
        email: String,
        name: String,
        course_title: String,
        link: String,
    },
    Otp {
        email: String,
        purpose: String,
        code: String,
    },
    /// Account created during payment redemption
    AccountProvisioned {
        email: String,
        name: String,
        temporary_password: String,
    },
    EnrollmentConfirmed {
        email: String,
        name: String,
        course_title: String,
        enrollment_id: String,
    },
}

impl Notification {
    /// Short label used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::EnquiryReceived { .. } => "enquiry_received",
            Notification::PaymentLink { .. } => "payment_link",
            Notification::Otp { .. } => "otp",
            Notification::AccountProvisioned { .. } => "account_provisioned",
            Notification::EnrollmentConfirmed { .. } => "enrollment_confirmed",
        }
    }

    /// Email address the notification is about, for logging
    pub fn recipient(&self) -> &str {
        match self {
            Notification::EnquiryReceived { email, .. }
            | Notification::PaymentLink { email, .. }
            | Notification::Otp { email, .. }
            | Notification::AccountProvisioned { email, .. }
            | Notification::EnrollmentConfirmed { email, .. } => email,
        }
    }
}

/// Somewhere notifications can be delivered to
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Writes a log line instead of sending anything. Secrets are not logged.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            "📨 Notification '{}' for {} (no webhook configured, logged only)",
            notification.kind(),
            notification.recipient()
        );
        Ok(())
    }
}

/// POSTs each notification as JSON to an external mail/chat bridge
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        self.client
            .post(&self.url)
            .json(notification)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Forwards notifications into a channel for an in-process consumer
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        self.tx
            .send(notification.clone())
            .map_err(|_| anyhow::anyhow!("Notification receiver dropped"))
    }
}

/// Fire-and-forget front for a sink
#[derive(Clone)]
pub struct Dispatcher {
    sink: Arc<dyn NotificationSink>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Webhook sink when a URL is configured, log sink otherwise
    pub fn from_webhook_url(url: Option<&str>) -> Result<Self> {
        let sink: Arc<dyn NotificationSink> = match url {
            Some(url) => {
                tracing::info!("📬 Delivering notifications to webhook: {}", url);
                Arc::new(WebhookSink::new(url.to_string())?)
            }
            None => Arc::new(LogSink),
        };
        Ok(Self::new(sink))
    }

    /// Deliver in the background; failures are only logged
    pub fn dispatch(&self, notification: Notification) {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            if let Err(e) = sink.deliver(&notification).await {
                tracing::warn!(
                    "⚠️ Failed to deliver '{}' notification to {}: {}",
                    notification.kind(),
                    notification.recipient(),
                    e
                );
            }
        });
    }
}
