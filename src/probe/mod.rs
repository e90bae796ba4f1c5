//! Probe pipeline: DNS, TCP, HTTP with manual redirects, body sampling and
//! login-surface heuristics.

mod body;
mod engine;
mod login;

pub use engine::ProbeEngine;
pub use login::{classify, classify_with_hint, LoginSignal};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured outcome of one probe. Transport failures are folded in
/// (`tcp_ok`/`http_ok` false, `http_status_code` null); nothing here is an
/// error to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub target_id: i64,
    pub timestamp_utc: DateTime<Utc>,
    pub tcp_ok: bool,
    pub tcp_latency_ms: i64,
    pub used_ip: Option<String>,
    pub http_ok: bool,
    pub http_status_code: Option<i64>,
    pub http_latency_ms: i64,
    pub final_url: Option<String>,
    pub login_detected: bool,
    pub detected_login_type: Option<String>,
    pub summary: String,
}

/// The fixed human-readable summary format:
/// `"TCP OK (Xms); HTTP OK (code, Yms)"`, FAIL variants symmetric, the
/// status code omitted when the transport never produced one.
pub fn summary(
    tcp_ok: bool,
    tcp_latency_ms: i64,
    http_ok: bool,
    http_status_code: Option<i64>,
    http_latency_ms: i64,
) -> String {
    let tcp = if tcp_ok {
        format!("TCP OK ({tcp_latency_ms}ms)")
    } else {
        format!("TCP FAIL ({tcp_latency_ms}ms)")
    };
    let http = match (http_ok, http_status_code) {
        (true, Some(code)) => format!("HTTP OK ({code}, {http_latency_ms}ms)"),
        (false, Some(code)) => format!("HTTP FAIL ({code}, {http_latency_ms}ms)"),
        (true, None) => format!("HTTP OK ({http_latency_ms}ms)"),
        (false, None) => format!("HTTP FAIL ({http_latency_ms}ms)"),
    };
    format!("{tcp}; {http}")
}
