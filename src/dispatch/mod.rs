pub mod pool;

use std::sync::Arc;
use std::time::{Duration, Instant};

pub use pool::TaskPool;

use crate::config::{MAX_TIMEOUT, ProbeConfig, build_http_client};
use crate::error::ConfigError;
use crate::probe::error_chain;
use crate::probe::prelude::*;

/// Probes batches of URLs with one shared HTTP client.
pub struct Dispatcher {
    probe: StreamProbe,
    pool: TaskPool,
}

impl Dispatcher {
    pub fn new(config: ProbeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = build_http_client(config.timeout(), &config.user_agent)?;
        let pool = TaskPool::new(config.concurrency);
        Ok(Self {
            probe: StreamProbe::new(client, Arc::new(config)),
            pool,
        })
    }

    /// One result per URL, in input order.
    pub async fn probe_all(&self, urls: &[String]) -> Vec<ProbeResult> {
        let start = Instant::now();
        log::info!(
            "Probing {} URLs (concurrency {}, timeout {:.1}s)",
            urls.len(),
            self.pool.capacity(),
            self.probe.config().timeout_seconds
        );

        let outcomes = self
            .pool
            .run(urls.iter().cloned(), |url| {
                let probe = self.probe.clone();
                async move { probe.probe(&url).await }
            })
            .await;

        let results: Vec<ProbeResult> = outcomes
            .into_iter()
            .zip(urls)
            .map(|(outcome, url)| {
                outcome.unwrap_or_else(|e| {
                    log::warn!("Probe task for {url} failed: {e}");
                    ProbeResult::rejected(url.as_str(), Duration::ZERO, format!("probe task failed: {e}"))
                })
            })
            .collect();

        log::info!(
            "Probed {} URLs in {:.2}s, {} valid",
            results.len(),
            start.elapsed().as_secs_f64(),
            results.iter().filter(|r| r.valid).count()
        );
        results
    }
}

/// Probe every URL with the default thresholds and the given timeout.
/// Timeouts above [`MAX_TIMEOUT`] are capped.
pub async fn probe_all(urls: &[String], timeout: Duration) -> Vec<ProbeResult> {
    let config = ProbeConfig {
        timeout_seconds: timeout.min(MAX_TIMEOUT).as_secs_f64(),
        ..ProbeConfig::default()
    };
    probe_all_with(urls, &config).await
}

/// Probe every URL with a full configuration.
/// A configuration that cannot be used rejects every URL with the reason.
pub async fn probe_all_with(urls: &[String], config: &ProbeConfig) -> Vec<ProbeResult> {
    match Dispatcher::new(config.clone()) {
        Ok(dispatcher) => dispatcher.probe_all(urls).await,
        Err(e) => {
            let reason = error_chain(&e);
            log::error!("Cannot probe: {reason}");
            urls.iter()
                .map(|url| ProbeResult::rejected(url.as_str(), Duration::ZERO, reason.clone()))
                .collect()
        }
    }
}
