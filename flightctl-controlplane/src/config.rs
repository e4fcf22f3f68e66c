//! Process configuration, grounded in the teacher's `CacheConfig::from_env`
//! pattern: a `Default` impl for local development, overridden field by
//! field from environment variables, with the result logged once at
//! startup.

use std::net::SocketAddr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// How often the scheduler drains the event bus and reconciles the
    /// orgs/fleets it just learned about.
    pub reconcile_interval: Duration,
    /// Fallback full sweep over every org ever seen, in case an event was
    /// missed or a subscriber lagged (§5 "no in-memory caches may outlive
    /// a reconcile without an invalidation hook from the Event Bus").
    pub sweep_interval: Duration,
    /// Capped drain loop for in-flight HTTP requests during shutdown,
    /// mirroring the teacher's `SHUTDOWN_TIMEOUT`.
    pub shutdown_timeout: Duration,
    pub event_bus_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 8080).into(),
            reconcile_interval: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(30),
            event_bus_capacity: 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDR") {
            match addr.parse() {
                Ok(parsed) => config.bind_addr = parsed,
                Err(err) => tracing::warn!(addr, error = %err, "ignoring invalid BIND_ADDR"),
            }
        }

        if let Some(secs) = parse_env_u64("RECONCILE_INTERVAL_SECONDS") {
            config.reconcile_interval = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_env_u64("SWEEP_INTERVAL_SECONDS") {
            config.sweep_interval = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_env_u64("SHUTDOWN_TIMEOUT_SECONDS") {
            config.shutdown_timeout = Duration::from_secs(secs);
        }

        if let Some(capacity) = parse_env_u64("EVENT_BUS_CAPACITY") {
            config.event_bus_capacity = capacity as usize;
        }

        tracing::info!(
            bind_addr = %config.bind_addr,
            reconcile_interval_secs = config.reconcile_interval.as_secs(),
            sweep_interval_secs = config.sweep_interval.as_secs(),
            shutdown_timeout_secs = config.shutdown_timeout.as_secs(),
            event_bus_capacity = config.event_bus_capacity,
            "loaded controlplane configuration"
        );

        config
    }
}

fn parse_env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|raw| raw.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_intervals() {
        let config = Config::default();
        assert!(config.reconcile_interval < config.sweep_interval);
    }
}
