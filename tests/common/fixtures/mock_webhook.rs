//! Mock webhook receiver for alert delivery tests.
//!
//! Simulates a webhook endpoint that captures alert payloads so tests can
//! verify what was sent and when.

use serde_json::Value;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub struct MockWebhookServer {
    pub server: MockServer,
    captured: Arc<Mutex<Vec<Value>>>,
}

impl MockWebhookServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            captured: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Accept every POST to /webhook with 200, capturing the JSON body.
    pub async fn mock_success(&self) {
        let captured = self.captured.clone();
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(move |request: &Request| {
                if let Ok(body) = request.body_json::<Value>() {
                    captured.lock().unwrap().push(body);
                }
                ResponseTemplate::new(200)
            })
            .mount(&self.server)
            .await;
    }

    /// Fail every POST with the given status.
    pub async fn mock_failure(&self, status_code: u16) {
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(status_code))
            .mount(&self.server)
            .await;
    }

    /// Swap the mounted behavior (e.g. failure -> success mid-test).
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    pub fn webhook_url(&self) -> String {
        format!("{}/webhook", self.server.uri())
    }

    pub fn captured(&self) -> Vec<Value> {
        self.captured.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.captured.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.captured.lock().unwrap().clear();
    }

    /// Number of captured payloads with the given eventType.
    pub fn count_of(&self, event_type: &str) -> usize {
        self.captured
            .lock()
            .unwrap()
            .iter()
            .filter(|payload| {
                payload
                    .get("eventType")
                    .and_then(|v| v.as_str())
                    .map(|v| v == event_type)
                    .unwrap_or(false)
            })
            .count()
    }
}
