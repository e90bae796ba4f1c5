//! Body sampling with transport decompression.
//!
//! Probes sample at most 512 KiB of the response body, undo any
//! `Content-Encoding` the server applied (the probe client never
//! auto-decompresses), and decode best-effort UTF-8 for the heuristics.

use std::io::Read;
use tracing::debug;

use crate::constants::probe::BODY_SAMPLE_LIMIT;

/// Whether the response media type is worth sampling: absent, HTML, text,
/// XML or JSON.
pub fn should_sample(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return true;
    };
    let ct = content_type.to_ascii_lowercase();
    ct.contains("html")
        || ct.starts_with("text/")
        || ct.contains("xml")
        || ct.contains("json")
}

/// Read up to the sample limit from the response and return a lossily
/// decoded snippet.
pub async fn sample(response: reqwest::Response) -> String {
    let encoding = response
        .headers()
        .get(reqwest::header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let mut raw: Vec<u8> = Vec::new();
    let mut response = response;
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                raw.extend_from_slice(&chunk);
                if raw.len() >= BODY_SAMPLE_LIMIT {
                    raw.truncate(BODY_SAMPLE_LIMIT);
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Body read stopped early: {}", e);
                break;
            }
        }
    }

    let decoded = decompress(&encoding, raw);
    String::from_utf8_lossy(&decoded).into_owned()
}

/// Undo the transport encoding; a failed decoder yields the raw bytes.
fn decompress(encoding: &str, raw: Vec<u8>) -> Vec<u8> {
    match encoding {
        "gzip" | "x-gzip" => {
            let mut out = Vec::new();
            match flate2::read::GzDecoder::new(raw.as_slice()).read_to_end(&mut out) {
                Ok(_) => out,
                Err(e) => {
                    debug!("gzip decode failed, using raw bytes: {}", e);
                    raw
                }
            }
        }
        "deflate" => {
            // Servers disagree on whether "deflate" means zlib-wrapped or
            // raw; try the wrapped form first.
            let mut out = Vec::new();
            if flate2::read::ZlibDecoder::new(raw.as_slice())
                .read_to_end(&mut out)
                .is_ok()
            {
                return out;
            }
            out.clear();
            match flate2::read::DeflateDecoder::new(raw.as_slice()).read_to_end(&mut out) {
                Ok(_) => out,
                Err(e) => {
                    debug!("deflate decode failed, using raw bytes: {}", e);
                    raw
                }
            }
        }
        "br" => {
            let mut out = Vec::new();
            match brotli::Decompressor::new(raw.as_slice(), 4096).read_to_end(&mut out) {
                Ok(_) => out,
                Err(e) => {
                    debug!("brotli decode failed, using raw bytes: {}", e);
                    raw
                }
            }
        }
        _ => raw,
    }
}
