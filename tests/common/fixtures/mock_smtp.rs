//! Recording SMTP sender: captures messages instead of talking SMTP.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use sitewatch::errors::NotifyError;
use sitewatch::notify::{EmailMessage, SmtpConnection, SmtpSender};

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub text_body: String,
}

#[derive(Default)]
pub struct RecordingSmtpSender {
    sent: Mutex<Vec<SentEmail>>,
    fail: AtomicBool,
}

impl RecordingSmtpSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl SmtpSender for RecordingSmtpSender {
    async fn send(
        &self,
        _connection: &SmtpConnection,
        to: &str,
        message: &EmailMessage,
    ) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Smtp("simulated failure".to_string()));
        }
        self.sent.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            subject: message.subject.clone(),
            text_body: message.text_body.clone(),
        });
        Ok(())
    }
}
