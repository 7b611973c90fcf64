use std::env;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use reqwest::{Client, redirect};

use super::probe_config::ProbeConfig;
use crate::error::ConfigError;

const DEFAULT_CONFIG_FILE: &str = "streambox.yml";

/// Load the probe configuration.
/// Reads the YAML file named by the `CONFIG_FILE` environment variable (default
/// `streambox.yml`). A missing file is not an error, the defaults are used.
pub fn load_config() -> Result<ProbeConfig, ConfigError> {
    let location = env::var("CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    load_config_from(Path::new(&location))
}

pub fn load_config_from(path: &Path) -> Result<ProbeConfig, ConfigError> {
    let config_str = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::warn!("Config file {} not found, using defaults", path.display());
            return Ok(ProbeConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            });
        }
    };

    // serde_yaml treats an empty document as null, which would not deserialize
    let config: ProbeConfig = if config_str.trim().is_empty() {
        ProbeConfig::default()
    } else {
        serde_yaml::from_str(&config_str)?
    };
    config.validate()?;

    log::info!(
        "Loaded {}: concurrency {}, timeout {:.1}s",
        path.display(),
        config.concurrency,
        config.timeout_seconds
    );
    Ok(config)
}

/// Setup the HTTP client shared by every probe of a batch.
/// The timeout is applied to each request as a whole, invalid certificates are
/// accepted since IPTV origins are frequently self-signed, redirects are followed.
pub fn build_http_client(timeout: Duration, user_agent: &str) -> Result<Client, ConfigError> {
    let client = Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .danger_accept_invalid_certs(true)
        .redirect(redirect::Policy::limited(10))
        .user_agent(user_agent)
        .build()?;
    Ok(client)
}
