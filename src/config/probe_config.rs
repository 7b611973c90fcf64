use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Longest accepted timeout for a single network operation.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Top level configuration for a probe batch.
///
/// Every threshold the probes use lives here so that it can be tuned from the
/// YAML file without touching code. All fields have defaults, an empty file is
/// a valid configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Maximum number of probes running at the same time.
    pub concurrency: usize,

    /// Timeout applied to every single network operation, in seconds.
    pub timeout_seconds: f64,

    /// User agent sent with every HTTP request.
    pub user_agent: String,

    /// How many HTML pages with an embedded playlist link are followed.
    pub max_redirect_hops: usize,

    pub classifier: ClassifierConfig,
    pub throughput: ThroughputConfig,
    pub generic: GenericConfig,
    pub socket: SocketConfig,
}

/// Thresholds for the playlist classifier.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Number of bytes inspected when deciding playlist vs. generic stream.
    pub sniff_bytes: usize,

    /// Upper bound on the playlist body that is read.
    pub max_playlist_bytes: usize,

    /// Playlists shorter than this are treated as error pages.
    pub min_playlist_bytes: usize,

    /// Minimum number of `#EXTINF:` entries for a usable playlist.
    pub min_segments: usize,

    /// A closed playlist with more entries than this looks pre-recorded.
    pub max_closed_segments: usize,

    /// An `output` playlist with more `.ts` references than this looks pre-recorded.
    pub max_output_ts_refs: usize,

    /// Keywords marking static, demo or test content (matched lowercase).
    pub static_keywords: Vec<String>,
}

/// Thresholds for segment based speed measurement.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThroughputConfig {
    /// Segments taken from the playlist for sampling.
    pub max_segments: usize,

    /// Sampling stops once this many segments were measured.
    pub target_successful_segments: usize,

    /// Bytes read per segment.
    pub segment_buffer_bytes: usize,

    /// Segments with fewer bytes than this are ignored.
    pub min_segment_bytes: usize,

    /// Wall clock budget for the whole segment test, in seconds.
    pub budget_seconds: u64,

    /// Speed reported when the playlist had no resolvable segments (KB/s).
    pub estimated_speed: f64,

    /// Speed reported when every segment download failed (KB/s).
    pub fallback_speed: f64,

    /// Measured speeds below this are replaced by `floor_replacement` (KB/s).
    pub floor_speed: f64,
    pub floor_replacement: f64,

    /// Measured speeds above this are multiplied by `ceiling_factor` (KB/s).
    pub ceiling_speed: f64,
    pub ceiling_factor: f64,
}

/// Thresholds for plain HTTP streams that are not playlists.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenericConfig {
    pub buffer_bytes: usize,
    pub min_bytes: usize,
    pub accepted_status_codes: Vec<u16>,
}

/// Settings for UDP, RTMP and RTSP targets.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Deadline for the control write, in milliseconds.
    pub write_deadline_ms: u64,

    /// Latency buckets, checked in order: `(upper bound in ms, KB/s, label)`.
    /// Latencies above the last bound get `slowest_speed`.
    pub latency_table: Vec<LatencyBucket>,
    pub slowest_speed: f64,
    pub slowest_label: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LatencyBucket {
    pub below_ms: u64,
    pub speed: f64,
    pub label: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            timeout_seconds: 8.0,
            user_agent: "streambox/1.0".to_string(),
            max_redirect_hops: 1,
            classifier: ClassifierConfig::default(),
            throughput: ThroughputConfig::default(),
            generic: GenericConfig::default(),
            socket: SocketConfig::default(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            sniff_bytes: 1024,
            max_playlist_bytes: 1024 * 1024,
            min_playlist_bytes: 50,
            min_segments: 1,
            max_closed_segments: 20,
            max_output_ts_refs: 10,
            static_keywords: ["nosignal", "test", "sample", "demo"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl Default for ThroughputConfig {
    fn default() -> Self {
        Self {
            max_segments: 5,
            target_successful_segments: 3,
            segment_buffer_bytes: 2 * 1024 * 1024,
            min_segment_bytes: 10 * 1024,
            budget_seconds: 8,
            estimated_speed: 800.0,
            fallback_speed: 200.0,
            floor_speed: 100.0,
            floor_replacement: 150.0,
            ceiling_speed: 5000.0,
            ceiling_factor: 0.8,
        }
    }
}

impl Default for GenericConfig {
    fn default() -> Self {
        Self {
            buffer_bytes: 1024 * 1024,
            min_bytes: 1024,
            accepted_status_codes: vec![200, 206, 301, 302],
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        let bucket = |below_ms, speed, label: &str| LatencyBucket {
            below_ms,
            speed,
            label: label.to_string(),
        };
        Self {
            write_deadline_ms: 2000,
            latency_table: vec![
                bucket(50, 800.0, "Low latency, high quality"),
                bucket(150, 500.0, "Good latency"),
                bucket(300, 300.0, "Medium latency"),
                bucket(500, 150.0, "High latency"),
            ],
            slowest_speed: 80.0,
            slowest_label: "Very high latency".to_string(),
        }
    }
}

impl ProbeConfig {
    /// `timeout_seconds` as a `Duration`, capped at [`MAX_TIMEOUT`].
    /// Values `validate` would reject map to zero.
    pub fn timeout(&self) -> Duration {
        if self.timeout_seconds >= MAX_TIMEOUT.as_secs_f64() {
            return MAX_TIMEOUT;
        }
        Duration::try_from_secs_f64(self.timeout_seconds).unwrap_or(Duration::ZERO)
    }

    /// Reject values that would make a batch hang or divide by zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        let timeout = Duration::try_from_secs_f64(self.timeout_seconds).ok();
        if !timeout.is_some_and(|t| !t.is_zero() && t <= MAX_TIMEOUT) {
            return Err(ConfigError::Invalid {
                field: "timeout_seconds",
                reason: format!(
                    "must be a positive number of seconds, at most {}",
                    MAX_TIMEOUT.as_secs()
                ),
            });
        }
        if self.classifier.sniff_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "classifier.sniff_bytes",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.throughput.target_successful_segments == 0 {
            return Err(ConfigError::Invalid {
                field: "throughput.target_successful_segments",
                reason: "must be at least 1".to_string(),
            });
        }
        let bounds: Vec<u64> = self.socket.latency_table.iter().map(|b| b.below_ms).collect();
        if bounds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::Invalid {
                field: "socket.latency_table",
                reason: "buckets must be sorted by below_ms".to_string(),
            });
        }
        Ok(())
    }
}

impl ThroughputConfig {
    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.budget_seconds)
    }
}

#[cfg(test)]
pub mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProbeConfig::default();
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.max_redirect_hops, 1);
        assert_eq!(config.classifier.min_playlist_bytes, 50);
        assert_eq!(config.classifier.min_segments, 1);
        assert_eq!(config.throughput.target_successful_segments, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
                    concurrency: 4
                    timeout_seconds: 3
                    classifier:
                        min_playlist_bytes: 100
                        min_segments: 2
                    socket:
                        latency_table:
                            - below_ms: 20
                              speed: 1000.0
                              label: LAN
                    "#;

        let config: ProbeConfig = serde_yaml::from_str(yaml).expect("Invalid YAML");
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.timeout(), Duration::from_secs(3));
        assert_eq!(config.classifier.min_playlist_bytes, 100);
        assert_eq!(config.classifier.min_segments, 2);
        // untouched fields fall back to their defaults
        assert_eq!(config.classifier.sniff_bytes, 1024);
        assert_eq!(config.throughput.max_segments, 5);
        assert_eq!(config.socket.latency_table.len(), 1);
        assert_eq!(config.socket.latency_table[0].label, "LAN");
        assert_eq!(config.generic.accepted_status_codes, vec![200, 206, 301, 302]);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = ProbeConfig {
            concurrency: 0,
            ..ProbeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "concurrency", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_unusable_timeouts() {
        for seconds in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e20, 86_401.0] {
            let config = ProbeConfig {
                timeout_seconds: seconds,
                ..ProbeConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid { field: "timeout_seconds", .. })),
                "{seconds} should be rejected"
            );
        }
        let config = ProbeConfig {
            timeout_seconds: 0.25,
            ..ProbeConfig::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_timeout_never_panics() {
        for (seconds, expected) in [
            (1e20, MAX_TIMEOUT),
            (f64::INFINITY, MAX_TIMEOUT),
            (f64::NAN, Duration::ZERO),
            (-3.0, Duration::ZERO),
        ] {
            let config = ProbeConfig {
                timeout_seconds: seconds,
                ..ProbeConfig::default()
            };
            assert_eq!(config.timeout(), expected);
        }
    }

    #[test]
    fn test_validate_rejects_unsorted_latency_table() {
        let mut config = ProbeConfig::default();
        config.socket.latency_table.reverse();
        assert!(config.validate().is_err());
    }
}
