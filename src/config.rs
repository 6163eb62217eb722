//! Configuration management for Floodgate.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{FloodgateError, Result};
use crate::ratelimit::{
    LimiterOptions, DEFAULT_BURST, DEFAULT_CLEANUP_FREQUENCY, DEFAULT_IDENTITY_HEADER,
    DEFAULT_PERIOD, DEFAULT_RECORD_TTL, DEFAULT_RPS,
};

/// Prefix for environment overrides, e.g. `FLOODGATE__LIMITER__BURST=5`.
const ENV_PREFIX: &str = "FLOODGATE";

/// Main configuration for the Floodgate service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FloodgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Gateway listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Limiter configuration as written in a file.
///
/// Numbers are signed so that negative values can be reported and replaced
/// by their defaults instead of failing to parse.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimiterConfig {
    /// Requests replenished per second
    #[serde(default)]
    pub requests_per_second: Option<i64>,

    /// Bucket capacity; equals `requests_per_second` when only that is set
    #[serde(default)]
    pub burst: Option<i64>,

    /// Custom replenishment period for rates below one per second
    #[serde(default)]
    pub period: Option<PeriodConfig>,

    /// Idle time in seconds before an identity is forgotten
    #[serde(default = "default_record_ttl_secs")]
    pub record_ttl_secs: i64,

    /// Seconds between eviction sweeps
    #[serde(default = "default_cleanup_frequency_secs")]
    pub cleanup_frequency_secs: i64,

    /// Identities that are never rate limited
    #[serde(default)]
    pub allowed_identities: Vec<String>,

    /// Identity prefixes that are never rate limited
    #[serde(default)]
    pub allowed_prefixes: Vec<String>,

    /// Request header carrying the client identity
    #[serde(default = "default_identity_header")]
    pub identity_header: String,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_second: None,
            burst: None,
            period: None,
            record_ttl_secs: default_record_ttl_secs(),
            cleanup_frequency_secs: default_cleanup_frequency_secs(),
            allowed_identities: Vec::new(),
            allowed_prefixes: Vec::new(),
            identity_header: default_identity_header(),
        }
    }
}

/// `requests` tokens every `millis` milliseconds. A zero `millis` admits
/// everything.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeriodConfig {
    pub requests: i64,
    pub millis: i64,
}

fn default_record_ttl_secs() -> i64 {
    DEFAULT_RECORD_TTL.as_secs() as i64
}

fn default_cleanup_frequency_secs() -> i64 {
    DEFAULT_CLEANUP_FREQUENCY.as_secs() as i64
}

fn default_identity_header() -> String {
    DEFAULT_IDENTITY_HEADER.to_string()
}

impl FloodgateConfig {
    /// Load configuration from an optional file, overridden by
    /// `FLOODGATE__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Config(format!("Failed to parse configuration: {}", e)))
    }
}

impl LimiterConfig {
    /// Convert into limiter options, replacing invalid values with defaults.
    pub fn to_options(&self) -> LimiterOptions {
        let mut options = LimiterOptions::default();

        options = match (self.requests_per_second, self.burst) {
            (Some(rps), Some(burst)) => options.rps_with_burst(
                non_negative("requests_per_second", rps, DEFAULT_RPS),
                // A negative burst alongside a rate falls back to the default rate
                non_negative("burst", burst, DEFAULT_RPS),
            ),
            (Some(rps), None) => options.rps(non_negative("requests_per_second", rps, DEFAULT_RPS)),
            (None, Some(burst)) => options.burst(non_negative("burst", burst, DEFAULT_BURST)),
            (None, None) => options,
        };

        if let Some(period) = &self.period {
            let requests = non_negative("period.requests", period.requests, 0);
            let millis = if period.millis < 0 {
                warn!(field = "period.millis", value = period.millis, "Negative value, using default");
                DEFAULT_PERIOD
            } else {
                Duration::from_millis(period.millis as u64)
            };
            options = options.period(requests, millis);
        }

        let cleanup_secs = if self.cleanup_frequency_secs <= 0 {
            warn!(
                field = "cleanup_frequency_secs",
                value = self.cleanup_frequency_secs,
                "Non-positive value, using default"
            );
            default_cleanup_frequency_secs()
        } else {
            self.cleanup_frequency_secs
        };
        let ttl_secs = if self.record_ttl_secs < 0 {
            warn!(field = "record_ttl_secs", value = self.record_ttl_secs, "Negative value, using default");
            default_record_ttl_secs()
        } else {
            self.record_ttl_secs
        };

        options
            .cleanup_frequency(Duration::from_secs(cleanup_secs as u64))
            .record_ttl(Duration::from_secs(ttl_secs as u64))
            .allowed_identities(self.allowed_identities.iter().cloned())
            .allowed_prefixes(self.allowed_prefixes.iter().cloned())
            .identity_header(self.identity_header.clone())
    }
}

fn non_negative(field: &'static str, value: i64, default: u32) -> u32 {
    match u32::try_from(value) {
        Ok(v) => v,
        Err(_) => {
            warn!(field = field, value = value, default = default, "Out of range value, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FloodgateConfig::default();
        assert_eq!(config.server.listen_addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());

        let options = config.limiter.to_options();
        assert_eq!(options.requests(), 10);
        assert_eq!(options.burst_size(), 20);
        assert_eq!(options.ttl(), Duration::from_secs(300));
        assert_eq!(options.sweep_interval(), Duration::from_secs(300));
        assert_eq!(options.header(), "x-original-forwarded-for");
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
server:
  listen_addr: "0.0.0.0:9000"
limiter:
  requests_per_second: 5
  burst: 8
  record_ttl_secs: 60
  cleanup_frequency_secs: 30
  allowed_identities: ["1.1.1.1"]
  allowed_prefixes: ["10."]
  identity_header: x-real-ip
"#;
        let config = FloodgateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.listen_addr.port(), 9000);

        let options = config.limiter.to_options();
        assert_eq!(options.requests(), 5);
        assert_eq!(options.burst_size(), 8);
        assert_eq!(options.ttl(), Duration::from_secs(60));
        assert_eq!(options.sweep_interval(), Duration::from_secs(30));
        assert_eq!(options.header(), "x-real-ip");
        assert!(options.allow_list().permits("1.1.1.1"));
        assert!(options.allow_list().permits("10.9.9.9"));
    }

    #[test]
    fn test_rps_only_sets_burst() {
        let config = FloodgateConfig::from_yaml("limiter:\n  requests_per_second: 4\n").unwrap();
        let options = config.limiter.to_options();
        assert_eq!(options.burst_size(), 4);
    }

    #[test]
    fn test_burst_only_keeps_rate() {
        let config = FloodgateConfig::from_yaml("limiter:\n  burst: 3\n").unwrap();
        let options = config.limiter.to_options();
        assert_eq!(options.requests(), 10);
        assert_eq!(options.burst_size(), 3);
    }

    #[test]
    fn test_period_config() {
        let yaml = r#"
limiter:
  burst: 1
  period:
    requests: 1
    millis: 5000
"#;
        let options = FloodgateConfig::from_yaml(yaml).unwrap().limiter.to_options();
        assert!(options.has_custom_period());
        assert!((options.refill_rate() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_negative_values_fall_back_to_defaults() {
        let yaml = r#"
limiter:
  requests_per_second: -1
  burst: -5
  record_ttl_secs: -10
  cleanup_frequency_secs: 0
"#;
        let options = FloodgateConfig::from_yaml(yaml).unwrap().limiter.to_options();
        assert_eq!(options.requests(), DEFAULT_RPS);
        assert_eq!(options.burst_size(), DEFAULT_RPS);
        assert_eq!(options.ttl(), DEFAULT_RECORD_TTL);
        assert_eq!(options.sweep_interval(), DEFAULT_CLEANUP_FREQUENCY);
    }

    #[test]
    fn test_negative_period_values() {
        let yaml = r#"
limiter:
  period:
    requests: -3
    millis: -1
"#;
        let options = FloodgateConfig::from_yaml(yaml).unwrap().limiter.to_options();
        assert_eq!(options.requests(), 0);
        assert_eq!(options.period_length(), DEFAULT_PERIOD);
        assert_eq!(options.refill_rate(), 0.0);
    }

    #[test]
    fn test_negative_burst_alone_uses_default_burst() {
        let config = FloodgateConfig::from_yaml("limiter:\n  burst: -5\n").unwrap();
        let options = config.limiter.to_options();
        assert_eq!(options.requests(), DEFAULT_RPS);
        assert_eq!(options.burst_size(), DEFAULT_BURST);
    }

    #[test]
    fn test_zero_period_millis_is_unlimited() {
        let yaml = r#"
limiter:
  burst: 1
  period:
    requests: 3
    millis: 0
"#;
        let options = FloodgateConfig::from_yaml(yaml).unwrap().limiter.to_options();
        assert_eq!(options.period_length(), Duration::ZERO);
        assert!(options.quota().is_unlimited());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let result = FloodgateConfig::from_yaml("limiter:\n  period_ms: 5000\n");
        assert!(matches!(result, Err(FloodgateError::Config(_))));

        let result = FloodgateConfig::from_yaml("server:\n  port: 9000\n");
        assert!(matches!(result, Err(FloodgateError::Config(_))));

        let yaml = "limiter:\n  period:\n    requests: 1\n    seconds: 5\n";
        assert!(matches!(FloodgateConfig::from_yaml(yaml), Err(FloodgateError::Config(_))));
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let result = FloodgateConfig::from_yaml("limiter: [not, a, map]");
        assert!(matches!(result, Err(FloodgateError::Config(_))));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = FloodgateConfig::load(None).unwrap();
        assert_eq!(config.server.listen_addr, default_listen_addr());
    }
}
