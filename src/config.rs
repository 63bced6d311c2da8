//! Daemon configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

use crate::errors::Error;
use crate::wire::PORT;

type Result<T> = std::result::Result<T, Error>;

/// Tunables of the event loop.
///
/// Durations are written as milliseconds in JSON, and every field may be
/// omitted:
///
/// ```
/// use std::time::Duration;
/// use lightsd_rs::DaemonConfig;
///
/// let json = r#"{"probe_interval": 1000, "stale_timeout": 3000}"#;
/// let config = DaemonConfig::from_json(json).unwrap();
/// assert_eq!(config.probe_interval, Duration::from_secs(1));
/// assert_eq!(config.query_timeout, Duration::from_secs(1));
///
/// assert!(DaemonConfig::from_json(r#"{"stale_timeout": 1000}"#).is_err());
/// ```
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Local address of the daemon socket
    pub bind: SocketAddr,
    /// Where discovery probes are broadcast
    pub broadcast: SocketAddr,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub probe_interval: Duration,
    /// How often stale records are swept
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub sweep_interval: Duration,
    /// Age after which a silent gateway or bulb is forgotten
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub stale_timeout: Duration,
    /// How long a query waits for each bulb's reply
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub query_timeout: Duration,
    /// Number of datagrams kept in the packet history
    pub history_size: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            broadcast: SocketAddr::from((Ipv4Addr::BROADCAST, PORT)),
            probe_interval: Duration::from_secs(2),
            sweep_interval: Duration::from_secs(5),
            stale_timeout: Duration::from_secs(20),
            query_timeout: Duration::from_secs(1),
            history_size: 100,
        }
    }
}

impl DaemonConfig {
    /// Staleness must cover this many probe cycles.
    pub const MIN_PROBES_PER_TIMEOUT: u32 = 3;

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: DaemonConfig = serde_json::from_str(json).map_err(Error::JsonLoad)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.probe_interval.is_zero() {
            return Err(Error::invalid_config("probe_interval must be positive"));
        }
        if self.sweep_interval.is_zero() {
            return Err(Error::invalid_config("sweep_interval must be positive"));
        }
        if self.query_timeout.is_zero() {
            return Err(Error::invalid_config("query_timeout must be positive"));
        }
        if self.stale_timeout < self.probe_interval * Self::MIN_PROBES_PER_TIMEOUT {
            return Err(Error::InvalidConfig(format!(
                "stale_timeout ({:?}) must be at least {} times probe_interval ({:?})",
                self.stale_timeout,
                Self::MIN_PROBES_PER_TIMEOUT,
                self.probe_interval
            )));
        }
        Ok(())
    }
}
