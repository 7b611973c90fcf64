use std::time::{Duration, Instant};

use reqwest::Client;

use super::error_chain;
use super::result::ProbeResult;
use super::socket;
use super::target::Target;

/// Cheapest possible existence check for a target.
///
/// The returned result is intermediate: speed and sample fields stay zero, it is
/// only handed to the caller when it is a rejection.
pub async fn check(client: &Client, target: &Target, raw_url: &str, timeout: Duration) -> ProbeResult {
    match target {
        Target::Http(_) => check_http(client, raw_url).await,
        Target::UdpProxy { .. } | Target::Udp { .. } | Target::Rtmp { .. } | Target::Rtsp { .. } => {
            socket::check_reachable(target, raw_url, timeout).await
        }
    }
}

/// HEAD first, then GET. Streaming origins often answer HEAD with an error
/// status while still serving GET, so any GET response counts as reachable.
pub async fn check_http(client: &Client, url: &str) -> ProbeResult {
    let start = Instant::now();
    let head = client.head(url).send().await;

    let head_status = match head {
        Ok(resp) if resp.status().is_success() => {
            return ProbeResult::reachable(url, start.elapsed(), "OK");
        }
        Ok(resp) => Some(resp.status().as_u16()),
        Err(e) => {
            log::debug!("HEAD {url} failed: {}", error_chain(&e));
            None
        }
    };

    match client.get(url).send().await {
        Ok(resp) => ProbeResult::reachable(
            url,
            start.elapsed(),
            format!("HTTP {} (via GET)", resp.status().as_u16()),
        ),
        Err(e) => {
            let reason = match head_status {
                Some(code) => format!("HEAD returned {code}, GET failed: {}", error_chain(&e)),
                None => format!("Both HEAD and GET failed: {}", error_chain(&e)),
            };
            ProbeResult::rejected(url, start.elapsed(), reason)
        }
    }
}
