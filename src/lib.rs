pub mod config;
pub mod discover;
pub mod dispatch;
pub mod error;
pub mod probe;
pub mod report;

#[cfg(test)]
mod test_support;

pub use config::ProbeConfig;
pub use dispatch::{Dispatcher, probe_all, probe_all_with};
pub use error::{ConfigError, ProbeError};
pub use probe::result::ProbeResult;
