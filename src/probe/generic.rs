use std::time::Instant;

use reqwest::Client;

use super::classifier::{contains_api_error, is_html, is_json_body, mentions_playlist};
use super::result::{Measurement, ProbeResult};
use super::throughput::{MEASURED, kbps};
use super::{error_chain, read_bounded};
use crate::config::GenericConfig;

/// Probe an HTTP resource that is not a playlist by downloading a bounded
/// sample and timing it.
pub async fn probe_http_stream(client: &Client, url: &str, config: &GenericConfig) -> ProbeResult {
    let start = Instant::now();
    let response = client.get(url).send().await;
    let latency = start.elapsed();

    let mut response = match response {
        Ok(r) => r,
        Err(e) => return ProbeResult::rejected(url, latency, error_chain(&e)),
    };

    let status = response.status().as_u16();
    if !config.accepted_status_codes.contains(&status) {
        return ProbeResult::rejected(url, latency, format!("HTTP {status}"));
    }

    let download_start = Instant::now();
    let (data, read_error) = read_bounded(&mut response, config.buffer_bytes).await;
    let download_time = download_start.elapsed();
    drop(response);

    if let Some(e) = read_error {
        if data.is_empty() {
            return ProbeResult::rejected(url, latency, format!("Read failed: {}", error_chain(&e)));
        }
    }

    if let Some(reason) = reject_sample(&data, config) {
        return ProbeResult::rejected(url, latency, reason);
    }

    ProbeResult::measured(
        url,
        latency,
        Measurement {
            speed: kbps(data.len() as u64, download_time),
            data_size: data.len() as u64,
            download_time,
            detail: MEASURED.to_string(),
        },
    )
}

/// Reason to turn down a downloaded sample, if any.
pub fn reject_sample(data: &[u8], config: &GenericConfig) -> Option<String> {
    let text = String::from_utf8_lossy(data);
    if is_json_body(&text) {
        return Some("JSON error response".to_string());
    }
    if contains_api_error(&text) {
        return Some("API error response (invalid link)".to_string());
    }
    if is_html(&text) && !mentions_playlist(&text) {
        return Some("HTML page instead of stream".to_string());
    }
    if data.len() < config.min_bytes {
        return Some(format!("Too little data downloaded ({} bytes)", data.len()));
    }
    None
}
