pub mod app_config;
pub mod probe_config;

pub use app_config::{build_http_client, load_config, load_config_from};
pub use probe_config::{
    ClassifierConfig, GenericConfig, LatencyBucket, MAX_TIMEOUT, ProbeConfig, SocketConfig,
    ThroughputConfig,
};
