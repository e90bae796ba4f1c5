//! The probe engine: one shared HTTP client driving the full pipeline per
//! target.

use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::header;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::{debug, warn};
use url::Url;

use super::login::{self, LoginSignal};
use super::{body, summary, ProbeResult};
use crate::constants::probe::{
    ACCEPT, ACCEPT_ENCODING, CONNECT_TIMEOUT, MAX_REDIRECTS, PROBE_TIMEOUT, USER_AGENT,
};
use crate::database::Target;
use crate::errors::ProbeError;

pub struct ProbeEngine {
    client: reqwest::Client,
}

struct HttpOutcome {
    ok: bool,
    status: Option<i64>,
    latency_ms: i64,
    final_url: Option<String>,
    login: LoginSignal,
}

impl ProbeEngine {
    /// Build the engine with its long-lived pooled client. Redirects are
    /// followed manually and bodies arrive with their transport encoding
    /// intact, so both are disabled on the client.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// Probe one target. Never fails; transport problems come back as a
    /// failed result. The whole pipeline runs under a 45 second cap.
    pub async fn probe(&self, target: &Target) -> ProbeResult {
        let timestamp = Utc::now();
        match tokio::time::timeout(PROBE_TIMEOUT, self.probe_inner(target, timestamp)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Probe of {}: {}", target.url, ProbeError::Timeout(PROBE_TIMEOUT));
                let ms = PROBE_TIMEOUT.as_millis() as i64;
                failed_result(target, timestamp, ms, ms)
            }
        }
    }

    async fn probe_inner(&self, target: &Target, timestamp: DateTime<Utc>) -> ProbeResult {
        let url = match Url::parse(&target.url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => url,
            _ => {
                warn!("Target {} has a non-http(s) url: {}", target.target_id, target.url);
                return failed_result(target, timestamp, 0, 0);
            }
        };
        let host = url.host_str().unwrap_or_default().to_string();
        let port = url.port_or_known_default().unwrap_or(80);

        let ips = resolve(&host, port).await;
        let (tcp_ok, tcp_latency_ms, used_ip) = tcp_connect(&host, port, &ips).await;
        let http = self.http_probe(&url, target).await;

        let summary = summary(tcp_ok, tcp_latency_ms, http.ok, http.status, http.latency_ms);
        ProbeResult {
            target_id: target.target_id,
            timestamp_utc: timestamp,
            tcp_ok,
            tcp_latency_ms,
            used_ip,
            http_ok: http.ok,
            http_status_code: http.status,
            http_latency_ms: http.latency_ms,
            final_url: http.final_url,
            login_detected: http.login.detected,
            detected_login_type: http.login.login_type,
            summary,
        }
    }

    async fn http_probe(&self, url: &Url, target: &Target) -> HttpOutcome {
        let started = Instant::now();
        let (response, final_url) = match self.fetch(url).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!("HTTP transport failure for {}: {}", url, e);
                return HttpOutcome {
                    ok: false,
                    status: None,
                    latency_ms: elapsed_ms(started),
                    final_url: None,
                    login: LoginSignal {
                        detected: false,
                        login_type: None,
                    },
                };
            }
        };

        let latency_ms = elapsed_ms(started);
        let status = i64::from(response.status().as_u16());
        let headers = header_blob(response.headers());
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body_snippet = if body::should_sample(content_type.as_deref()) {
            body::sample(response).await
        } else {
            String::new()
        };

        let login = login::classify_with_hint(
            target.login_rule.as_deref(),
            final_url.as_str(),
            &headers,
            &body_snippet,
        );

        let mut ok =
            status >= target.http_expected_status_min && status <= target.http_expected_status_max;
        // An authentication surface answering 401/403 is reachable.
        if !ok && (status == 401 || status == 403) && login.detected {
            ok = true;
        }

        HttpOutcome {
            ok,
            status: Some(status),
            latency_ms,
            final_url: Some(final_url.to_string()),
            login,
        }
    }

    /// GET with the redirect chain followed by hand: up to 12 hops over
    /// 301/302/303/307/308, relative locations joined against the current
    /// URL, and a revisited URL terminating the chain with the response in
    /// hand.
    async fn fetch(&self, original: &Url) -> Result<(reqwest::Response, Url), ProbeError> {
        let mut current = original.clone();
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(current.to_string());

        let mut hops = 0usize;
        loop {
            let response = self
                .client
                .get(current.clone())
                .header(header::ACCEPT, ACCEPT)
                .header(header::ACCEPT_ENCODING, ACCEPT_ENCODING)
                .send()
                .await
                .map_err(|e| ProbeError::HttpTransport(e.to_string()))?;

            let status = response.status().as_u16();
            let is_redirect = matches!(status, 301 | 302 | 303 | 307 | 308);
            if !is_redirect || hops >= MAX_REDIRECTS {
                return Ok((response, current));
            }

            let Some(location) = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
            else {
                return Ok((response, current));
            };
            let Ok(next) = current.join(location) else {
                debug!("Unparseable Location '{}' from {}", location, current);
                return Ok((response, current));
            };
            if !seen.insert(next.to_string()) {
                debug!("Redirect loop at {}, stopping chain", next);
                return Ok((response, current));
            }

            current = next;
            hops += 1;
        }
    }
}

/// Resolve the host to an ordered, deduplicated IP list. Resolution failure
/// is an empty list; the TCP step then falls back to connect-by-hostname.
async fn resolve(host: &str, port: u16) -> Vec<IpAddr> {
    match tokio::net::lookup_host((host, port)).await {
        Ok(addrs) => {
            let mut seen = HashSet::new();
            addrs
                .map(|addr| addr.ip())
                .filter(|ip| seen.insert(*ip))
                .collect()
        }
        Err(e) => {
            debug!("Probe of {}: {}", host, ProbeError::Dns(e.to_string()));
            Vec::new()
        }
    }
}

/// Try each resolved IP in order; the first successful connect wins. With no
/// resolved IPs, connect by hostname and leave `used_ip` empty.
async fn tcp_connect(host: &str, port: u16, ips: &[IpAddr]) -> (bool, i64, Option<String>) {
    if ips.is_empty() {
        let started = Instant::now();
        match TcpStream::connect((host, port)).await {
            Ok(_) => return (true, elapsed_ms(started), None),
            Err(e) => {
                debug!("Probe of {}: {}", host, ProbeError::Tcp(e.to_string()));
                return (false, elapsed_ms(started), None);
            }
        }
    }

    let overall = Instant::now();
    for ip in ips {
        let attempt = Instant::now();
        if TcpStream::connect(SocketAddr::new(*ip, port)).await.is_ok() {
            return (true, elapsed_ms(attempt), Some(ip.to_string()));
        }
    }
    debug!(
        "Probe of {}: {}",
        host,
        ProbeError::Tcp(format!("all {} resolved addresses refused", ips.len()))
    );
    (false, elapsed_ms(overall), Some(ips[0].to_string()))
}

/// `"Key: v1, v2\n"` lines for every response header, multi-valued headers
/// joined.
fn header_blob(headers: &header::HeaderMap) -> String {
    let mut blob = String::new();
    for name in headers.keys() {
        let values: Vec<&str> = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        blob.push_str(name.as_str());
        blob.push_str(": ");
        blob.push_str(&values.join(", "));
        blob.push('\n');
    }
    blob
}

fn elapsed_ms(started: Instant) -> i64 {
    started.elapsed().as_millis() as i64
}

fn failed_result(
    target: &Target,
    timestamp: DateTime<Utc>,
    tcp_latency_ms: i64,
    http_latency_ms: i64,
) -> ProbeResult {
    ProbeResult {
        target_id: target.target_id,
        timestamp_utc: timestamp,
        tcp_ok: false,
        tcp_latency_ms,
        used_ip: None,
        http_ok: false,
        http_status_code: None,
        http_latency_ms,
        final_url: None,
        login_detected: false,
        detected_login_type: None,
        summary: summary(false, tcp_latency_ms, false, None, http_latency_ms),
    }
}
