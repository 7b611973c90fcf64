//! Segment based download speed measurement.

use std::time::{Duration, Instant};

use reqwest::Client;
use thiserror::Error;

use super::classifier::{contains_error_token, is_json_body};
use super::read_bounded;
use super::result::Measurement;
use crate::config::ThroughputConfig;
use crate::error::ProbeError;

pub const MEASURED: &str = "OK";
pub const ESTIMATED_NO_SEGMENTS: &str = "OK (playlist valid, estimated speed)";
pub const ESTIMATED_SEGMENTS_FAILED: &str = "OK (playlist valid, segment test failed, estimated)";

const ESTIMATED_SAMPLE_BYTES: u64 = 1024 * 1024;
const FALLBACK_SAMPLE_BYTES: u64 = 512 * 1024;

/// Shortest elapsed time used in speed calculations.
const MIN_ELAPSED: Duration = Duration::from_millis(1);

/// Bytes read from one resource and the time it took.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedSample {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl SpeedSample {
    /// Speed in KB/s.
    pub fn kbps(&self) -> f64 {
        kbps(self.bytes, self.elapsed)
    }
}

pub fn kbps(bytes: u64, elapsed: Duration) -> f64 {
    bytes as f64 / elapsed.max(MIN_ELAPSED).as_secs_f64() / 1024.0
}

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("segment too small ({0} bytes)")]
    TooSmall(usize),

    #[error("segment body is an error response")]
    ErrorBody,
}

/// Median of the given speeds, the mean of the two middle values for an even count.
pub fn median(speeds: &[f64]) -> Option<f64> {
    if speeds.is_empty() {
        return None;
    }
    let mut sorted = speeds.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Replace implausibly low speeds, scale down very high ones.
pub fn clamp_speed(speed: f64, config: &ThroughputConfig) -> f64 {
    if speed < config.floor_speed {
        config.floor_replacement
    } else if speed > config.ceiling_speed {
        speed * config.ceiling_factor
    } else {
        speed
    }
}

/// Turn successful segment samples into a measurement. `None` without samples.
pub fn summarize(samples: &[SpeedSample], config: &ThroughputConfig) -> Option<Measurement> {
    let speeds: Vec<f64> = samples.iter().map(SpeedSample::kbps).collect();
    let speed = median(&speeds)?;

    Some(Measurement {
        speed: clamp_speed(speed, config),
        data_size: samples.iter().map(|s| s.bytes).sum(),
        download_time: samples.iter().map(|s| s.elapsed).sum(),
        detail: MEASURED.to_string(),
    })
}

fn estimate(speed: f64, data_size: u64, detail: &str) -> Measurement {
    let download_time = if speed > 0.0 {
        Duration::from_secs_f64(data_size as f64 / 1024.0 / speed)
    } else {
        Duration::ZERO
    };
    Measurement {
        speed,
        data_size,
        download_time,
        detail: detail.to_string(),
    }
}

/// Used when a valid playlist listed no segments that could be resolved.
pub fn estimate_without_segments(config: &ThroughputConfig) -> Measurement {
    estimate(config.estimated_speed, ESTIMATED_SAMPLE_BYTES, ESTIMATED_NO_SEGMENTS)
}

/// Used when segments were listed but none of them could be sampled.
pub fn estimate_after_failures(config: &ThroughputConfig) -> Measurement {
    estimate(config.fallback_speed, FALLBACK_SAMPLE_BYTES, ESTIMATED_SEGMENTS_FAILED)
}

/// Download a bounded prefix of one segment.
pub async fn sample_segment(
    client: &Client,
    url: &str,
    config: &ThroughputConfig,
) -> Result<SpeedSample, SegmentError> {
    let start = Instant::now();
    let mut response = client.get(url).send().await.map_err(ProbeError::from)?;
    if !response.status().is_success() {
        return Err(ProbeError::Status(response.status().as_u16()).into());
    }

    let (data, read_error) = read_bounded(&mut response, config.segment_buffer_bytes).await;
    let elapsed = start.elapsed();

    if let Some(e) = read_error {
        if data.is_empty() {
            return Err(ProbeError::from(e).into());
        }
        log::debug!("Partial read of {url} ({} bytes): {e}", data.len());
    }

    check_segment_body(&data, config)?;

    Ok(SpeedSample {
        bytes: data.len() as u64,
        elapsed,
    })
}

/// Reject sampled bytes that are an error payload or too small to be media.
pub fn check_segment_body(data: &[u8], config: &ThroughputConfig) -> Result<(), SegmentError> {
    let text = String::from_utf8_lossy(data);
    if is_json_body(&text) || contains_error_token(&text) {
        return Err(SegmentError::ErrorBody);
    }
    if data.len() <= config.min_segment_bytes {
        return Err(SegmentError::TooSmall(data.len()));
    }
    Ok(())
}

/// Sample the given segments one after another and derive a speed.
///
/// Sampling stops after `target_successful_segments` successes or once the
/// overall budget is spent. Failing segments are skipped. Without segments or
/// without a single success, a labelled estimate is returned instead.
pub async fn measure_segments(
    client: &Client,
    segment_urls: &[String],
    config: &ThroughputConfig,
) -> Measurement {
    if segment_urls.is_empty() {
        return estimate_without_segments(config);
    }

    let started = Instant::now();
    let mut samples = Vec::new();

    for url in segment_urls {
        if started.elapsed() > config.budget() {
            log::debug!("Segment budget of {:?} spent after {} samples", config.budget(), samples.len());
            break;
        }

        match sample_segment(client, url, config).await {
            Ok(sample) => {
                log::debug!("Segment {url}: {} bytes in {:?}", sample.bytes, sample.elapsed);
                samples.push(sample);
                if samples.len() >= config.target_successful_segments {
                    break;
                }
            }
            Err(e) => log::debug!("Segment {url} skipped: {e}"),
        }
    }

    summarize(&samples, config).unwrap_or_else(|| estimate_after_failures(config))
}
