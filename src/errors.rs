//! Typed error kinds for the capability seams.
//!
//! The scheduler and evaluator translate these into `ProbeResult` fields or
//! `Error` event rows rather than propagating them upward.

use std::time::Duration;
use thiserror::Error;

/// Failures inside the probe pipeline. The engine folds every variant into a
/// failed `ProbeResult`; nothing here escapes a cycle.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("dns resolution failed: {0}")]
    Dns(String),
    #[error("tcp connect failed: {0}")]
    Tcp(String),
    #[error("http transport failed: {0}")]
    HttpTransport(String),
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
}

/// Failures while delivering a notification. The evaluator isolates these per
/// recipient/endpoint and records an `Error` event when nothing got through.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("smtp delivery failed: {0}")]
    Smtp(String),
    #[error("webhook returned {status}: {detail}")]
    WebhookStatus { status: u16, detail: String },
    #[error("webhook transport failed: {0}")]
    WebhookTransport(String),
}

/// Protector (password-at-rest) failures. Decryption failure skips email for
/// the instance; it never aborts an evaluation.
#[derive(Error, Debug)]
pub enum ProtectorError {
    #[error("ciphertext malformed: {0}")]
    Malformed(String),
    #[error("decryption failed")]
    Decrypt,
}
