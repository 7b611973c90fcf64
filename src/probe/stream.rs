use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;

use super::classifier::{self, Rejection, Sniff, Verdict};
use super::result::ProbeResult;
use super::target::Target;
use super::{connectivity, error_chain, fill, generic, read_bounded, segments, socket, throughput};
use crate::config::ProbeConfig;

/// A fetched playlist body.
struct Playlist {
    body: String,
    /// Where the body came from after redirects, segment references resolve against it.
    final_url: String,
    latency: Duration,
}

enum Route {
    Playlist(Playlist),
    Generic,
}

/// Probes a single URL from start to finish.
///
/// Connectivity is checked first. HTTP URLs are then sniffed: playlists go
/// through the classifier and the segment speed test, anything else through
/// the generic download test. UDP, RTMP and RTSP targets get a latency based
/// estimate. Every failure ends in a rejected result, nothing is returned as
/// an error.
#[derive(Clone)]
pub struct StreamProbe {
    client: Client,
    config: Arc<ProbeConfig>,
}

impl StreamProbe {
    pub fn new(client: Client, config: Arc<ProbeConfig>) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub async fn probe(&self, raw_url: &str) -> ProbeResult {
        let target = match Target::parse(raw_url) {
            Ok(target) => target,
            Err(e) => return ProbeResult::rejected(raw_url, Duration::ZERO, error_chain(&e)),
        };
        let timeout = self.config.timeout();

        let reachable = connectivity::check(&self.client, &target, raw_url, timeout).await;
        if !reachable.valid {
            log::debug!("{raw_url}: unreachable: {}", reachable.error);
            return reachable;
        }

        let result = match &target {
            Target::Http(_) => match self.open(raw_url).await {
                Ok(Route::Playlist(playlist)) => self.probe_playlist(raw_url.to_string(), playlist).await,
                Ok(Route::Generic) => {
                    generic::probe_http_stream(&self.client, raw_url, &self.config.generic).await
                }
                Err(rejected) => rejected,
            },
            Target::UdpProxy { .. } | Target::Udp { .. } | Target::Rtmp { .. } | Target::Rtsp { .. } => {
                socket::probe_socket(&target, raw_url, timeout, &self.config.socket).await
            }
        };

        log::debug!(
            "{raw_url}: valid={} speed={:.2}KB/s ({})",
            result.valid,
            result.download_speed,
            result.error
        );
        result
    }

    /// GET the URL and decide from the first bytes whether it is a playlist.
    /// A playlist is read to the end from the same response.
    async fn open(&self, url: &str) -> Result<Route, ProbeResult> {
        let config = &self.config.classifier;
        let start = Instant::now();
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProbeResult::rejected(url, start.elapsed(), error_chain(&e)))?;
        let latency = start.elapsed();

        if !response.status().is_success() {
            return Ok(Route::Generic);
        }
        let final_url = response.url().to_string();

        let mut buf = Vec::new();
        let exhausted = match fill(&mut response, &mut buf, config.sniff_bytes, config.max_playlist_bytes).await {
            Ok(exhausted) => exhausted,
            Err(e) if buf.is_empty() => {
                return Err(ProbeResult::rejected(
                    url,
                    latency,
                    format!("Read failed: {}", error_chain(&e)),
                ));
            }
            Err(_) => true,
        };

        let prefix = &buf[..buf.len().min(config.sniff_bytes)];
        if classifier::sniff(&String::from_utf8_lossy(prefix)) == Sniff::Other {
            return Ok(Route::Generic);
        }

        if !exhausted {
            if let Err(e) = fill(&mut response, &mut buf, config.max_playlist_bytes, config.max_playlist_bytes).await {
                log::debug!("{url}: partial playlist: {}", error_chain(&e));
            }
        }

        Ok(Route::Playlist(Playlist {
            body: String::from_utf8_lossy(&buf).into_owned(),
            final_url,
            latency,
        }))
    }

    /// Fetch a playlist found inside an HTML page.
    async fn fetch_playlist(&self, url: &str) -> Result<Playlist, ProbeResult> {
        let start = Instant::now();
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProbeResult::rejected(url, start.elapsed(), error_chain(&e)))?;
        let latency = start.elapsed();

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeResult::rejected(url, latency, format!("HTTP {}", status.as_u16())));
        }
        let final_url = response.url().to_string();

        let (data, read_error) = read_bounded(&mut response, self.config.classifier.max_playlist_bytes).await;
        if let Some(e) = read_error {
            if data.is_empty() {
                return Err(ProbeResult::rejected(
                    url,
                    latency,
                    format!("Read failed: {}", error_chain(&e)),
                ));
            }
        }

        Ok(Playlist {
            body: String::from_utf8_lossy(&data).into_owned(),
            final_url,
            latency,
        })
    }

    /// Classify the playlist, following embedded links for at most
    /// `max_redirect_hops` HTML pages, and measure it once accepted.
    async fn probe_playlist(&self, mut url: String, mut playlist: Playlist) -> ProbeResult {
        let mut hops = 0;
        loop {
            let classification = classifier::classify(&playlist.body, &url, &self.config.classifier);
            match classification.verdict {
                Verdict::Live => return self.measure(url, playlist).await,
                Verdict::Rejected(reason) => {
                    log::debug!("{url}: rejected by {}: {reason}", classification.rule);
                    return ProbeResult::rejected(url, playlist.latency, reason.to_string());
                }
                Verdict::Embedded(next) if hops < self.config.max_redirect_hops => {
                    hops += 1;
                    log::debug!("{url}: following embedded playlist {next}");
                    playlist = match self.fetch_playlist(&next).await {
                        Ok(p) => p,
                        Err(rejected) => return rejected,
                    };
                    url = next;
                }
                Verdict::Embedded(next) => {
                    log::debug!("{url}: not following {next}, hop limit reached");
                    return ProbeResult::rejected(url, playlist.latency, Rejection::HtmlPage.to_string());
                }
            }
        }
    }

    async fn measure(&self, url: String, playlist: Playlist) -> ProbeResult {
        let config = &self.config.throughput;
        let segment_urls = segments::segment_urls(&playlist.body, &playlist.final_url, config.max_segments);
        let measurement = throughput::measure_segments(&self.client, &segment_urls, config).await;
        ProbeResult::measured(url, playlist.latency, measurement)
    }
}
