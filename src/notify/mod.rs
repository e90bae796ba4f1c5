//! Notification delivery: capability traits and the fan-out dispatcher.
//!
//! The evaluator decides *whether* to notify; this module only delivers.
//! Failures are isolated per recipient and per endpoint, and a notification
//! counts as delivered when at least one of them got through on either
//! channel.

mod email;
mod webhook;

pub use email::LettreSmtpSender;
pub use webhook::HttpWebhookSender;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::database::SecurityMode;
use crate::errors::NotifyError;

/// Resolved SMTP connection parameters with the password already
/// unprotected.
#[derive(Debug, Clone)]
pub struct SmtpConnection {
    pub host: String,
    pub port: u16,
    pub security: SecurityMode,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
}

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

/// JSON body POSTed to each webhook endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAlertPayload {
    pub event_type: String,
    pub instance_id: String,
    pub target_id: i64,
    pub url: String,
    pub is_up: bool,
    pub state_since_utc: DateTime<Utc>,
    pub timestamp_utc: DateTime<Utc>,
    pub summary: String,
}

#[async_trait]
pub trait SmtpSender: Send + Sync {
    async fn send(
        &self,
        connection: &SmtpConnection,
        to: &str,
        message: &EmailMessage,
    ) -> Result<(), NotifyError>;
}

#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn send(&self, url: &str, payload: &WebhookAlertPayload) -> Result<(), NotifyError>;
}

/// The notification channels resolved for one instance at evaluation time.
#[derive(Debug, Clone, Default)]
pub struct InstanceChannels {
    /// Connection plus enabled recipient addresses; `None` when email is not
    /// configured (or its password failed to unprotect).
    pub email: Option<(SmtpConnection, Vec<String>)>,
    /// Enabled webhook endpoint URLs.
    pub endpoints: Vec<String>,
}

impl InstanceChannels {
    pub fn is_configured(&self) -> bool {
        self.email.is_some() || !self.endpoints.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeliveryOutcome {
    pub delivered: bool,
    pub failures: Vec<String>,
}

/// Fans one notification out to every configured recipient and endpoint.
pub struct Dispatcher {
    smtp: Arc<dyn SmtpSender>,
    webhook: Arc<dyn WebhookSender>,
}

impl Dispatcher {
    pub fn new(smtp: Arc<dyn SmtpSender>, webhook: Arc<dyn WebhookSender>) -> Self {
        Self { smtp, webhook }
    }

    pub async fn dispatch(
        &self,
        channels: &InstanceChannels,
        email: &EmailMessage,
        payload: &WebhookAlertPayload,
    ) -> DeliveryOutcome {
        let mut outcome = DeliveryOutcome::default();

        if let Some((connection, recipients)) = &channels.email {
            for recipient in recipients {
                match self.smtp.send(connection, recipient, email).await {
                    Ok(()) => {
                        debug!("Email delivered to {}", recipient);
                        outcome.delivered = true;
                    }
                    Err(e) => {
                        warn!("Email to {} failed: {}", recipient, e);
                        outcome.failures.push(format!("email {recipient}: {e}"));
                    }
                }
            }
        }

        for endpoint in &channels.endpoints {
            match self.webhook.send(endpoint, payload).await {
                Ok(()) => {
                    debug!("Webhook delivered to {}", endpoint);
                    outcome.delivered = true;
                }
                Err(e) => {
                    warn!("Webhook to {} failed: {}", endpoint, e);
                    outcome.failures.push(format!("webhook {endpoint}: {e}"));
                }
            }
        }

        outcome
    }
}
