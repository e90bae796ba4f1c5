//! Webhook delivery via HTTP POST.

use async_trait::async_trait;
use std::time::Duration;

use super::{WebhookAlertPayload, WebhookSender};
use crate::constants::alerts::WEBHOOK_TIMEOUT_SECONDS;
use crate::errors::NotifyError;

const BODY_SNIPPET_LEN: usize = 512;

pub struct HttpWebhookSender {
    client: reqwest::Client,
}

impl HttpWebhookSender {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECONDS))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn send(&self, url: &str, payload: &WebhookAlertPayload) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| NotifyError::WebhookTransport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail: String = body.chars().take(BODY_SNIPPET_LEN).collect();
            return Err(NotifyError::WebhookStatus {
                status: status.as_u16(),
                detail,
            });
        }
        Ok(())
    }
}
