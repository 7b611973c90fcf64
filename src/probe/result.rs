use std::time::Duration;

use serde::Serialize;

/// Outcome of probing one candidate URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub url: String,
    /// Time from probe start to the first response or connection.
    pub latency: Duration,
    /// Estimated throughput in KB/s. Only meaningful when `valid` is set.
    pub download_speed: f64,
    pub valid: bool,
    /// "OK" or a qualifier on success, the rejection reason otherwise.
    pub error: String,
    /// Bytes sampled during the throughput test.
    pub data_size: u64,
    pub download_time: Duration,
}

/// A throughput figure together with the sample it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub speed: f64,
    pub data_size: u64,
    pub download_time: Duration,
    pub detail: String,
}

impl ProbeResult {
    pub fn rejected(url: impl Into<String>, latency: Duration, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            latency,
            download_speed: 0.0,
            valid: false,
            error: reason.into(),
            data_size: 0,
            download_time: Duration::ZERO,
        }
    }

    /// Intermediate result of a connectivity check that succeeded.
    pub fn reachable(url: impl Into<String>, latency: Duration, detail: impl Into<String>) -> Self {
        Self {
            valid: true,
            ..Self::rejected(url, latency, detail)
        }
    }

    pub fn measured(url: impl Into<String>, latency: Duration, measurement: Measurement) -> Self {
        Self {
            url: url.into(),
            latency,
            download_speed: measurement.speed,
            valid: true,
            error: measurement.detail,
            data_size: measurement.data_size,
            download_time: measurement.download_time,
        }
    }
}
