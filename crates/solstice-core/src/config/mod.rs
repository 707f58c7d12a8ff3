//! Application configuration with layered loading.
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: hardcoded in the struct `Default` implementations
//! 2. **Config file**: YAML file, `${VAR}` references expanded from the
//!    process environment before parsing (so provider URLs can carry API keys
//!    without committing them)
//! 3. **Environment variables**: `SOLSTICE__SECTION__FIELD` overrides
//!
//! Configuration is validated at load time; invalid configurations are fatal
//! at startup rather than failing silently under traffic.

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};

use crate::{
    cache::CachePolicy,
    proxy::RetrySettings,
    types::ProviderConfig,
    upstream::{circuit_breaker::BreakerSettings, pool::SelectionStrategy},
};

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on. Must be non-zero.
    pub port: u16,
    /// Per-request read deadline in milliseconds.
    #[serde(default = "default_io_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Per-request write deadline in milliseconds.
    #[serde(default = "default_io_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_io_timeout_ms() -> u64 {
    10_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080, read_timeout_ms: 10_000, write_timeout_ms: 10_000 }
    }
}

/// One upstream provider entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub name: String,
    pub url: String,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub cost_per_request: f64,
}

fn default_priority() -> u32 {
    1
}

/// Health prober settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Interval between probe cycles in milliseconds.
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    /// Per-probe deadline in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
    /// Consecutive failed probes before a provider is written unhealthy.
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
}

fn default_check_interval_ms() -> u64 {
    5_000
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_unhealthy_threshold() -> u32 {
    1
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            timeout_ms: default_probe_timeout_ms(),
            unhealthy_threshold: default_unhealthy_threshold(),
        }
    }
}

/// Routing and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// `least_latency` (default) or `round_robin`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial backoff in milliseconds; doubles per attempt.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_strategy() -> String {
    "least_latency".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Circuit breaker settings, shared by every provider's breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Probe budget while half-open.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// Consecutive failures before the circuit opens.
    #[serde(default = "default_trip_threshold")]
    pub trip_threshold: u32,
    /// Open duration in milliseconds before probing resumes.
    #[serde(default = "default_breaker_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_requests() -> u32 {
    5
}

fn default_trip_threshold() -> u32 {
    5
}

fn default_breaker_timeout_ms() -> u64 {
    60_000
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            trip_threshold: default_trip_threshold(),
            timeout_ms: default_breaker_timeout_ms(),
        }
    }
}

/// Shared state store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateStoreConfig {
    /// Sweep interval for the in-memory backend, in milliseconds.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_sweep_interval_ms() -> u64 {
    1_000
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self { sweep_interval_ms: default_sweep_interval_ms() }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachingConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Method name -> TTL in milliseconds. Methods absent here are never cached.
    #[serde(default)]
    pub methods: HashMap<String, u64>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: `json` or `pretty`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub state_store: StateStoreConfig,
    #[serde(default)]
    pub caching: CachingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            providers: Vec::new(),
            health: HealthConfig::default(),
            routing: RoutingConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            state_store: StateStoreConfig::default(),
            caching: CachingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Expands `${VAR}` and `$VAR` references from the process environment.
///
/// Unset variables expand to the empty string, matching the behavior of the
/// usual shell-style expanders so a missing key fails URL validation loudly
/// instead of smuggling a literal `${KEY}` into a request.
#[must_use]
pub fn expand_env(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('{') => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if closed {
                    out.push_str(&std::env::var(&name).unwrap_or_default());
                } else {
                    // Unterminated reference, keep literally
                    out.push_str("${");
                    out.push_str(&name);
                }
            }
            Some(c) if c.is_ascii_alphabetic() || *c == '_' => {
                let mut name = String::new();
                while let Some(c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || *c == '_' {
                        name.push(*c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(&std::env::var(&name).unwrap_or_default());
            }
            _ => out.push('$'),
        }
    }
    out
}

impl AppConfig {
    /// Loads configuration from a YAML file with env expansion and
    /// `SOLSTICE__`-prefixed environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or
    /// deserialized.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Message(format!("failed to read config file: {e}")))?;
        let expanded = expand_env(&raw);

        Config::builder()
            .add_source(File::from_str(&expanded, FileFormat::Yaml))
            .add_source(Environment::with_prefix("SOLSTICE").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Loads configuration from the path in `SOLSTICE_CONFIG`, defaulting to
    /// `config/config.yaml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if loading or parsing fails.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("SOLSTICE_CONFIG").unwrap_or_else(|_| "config/config.yaml".to_string());
        Self::from_file(path)
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be non-zero".to_string());
        }
        if self.providers.is_empty() {
            return Err("at least one provider must be configured".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if provider.name.is_empty() {
                return Err("provider name is required".to_string());
            }
            if !seen.insert(provider.name.as_str()) {
                return Err(format!("duplicate provider name: {}", provider.name));
            }
            let parsed = url::Url::parse(&provider.url)
                .map_err(|e| format!("provider {}: invalid URL: {e}", provider.name))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(format!(
                    "provider {}: URL must use http or https, got {}",
                    provider.name,
                    parsed.scheme()
                ));
            }
            if provider.cost_per_request < 0.0 {
                return Err(format!(
                    "provider {}: cost_per_request must be non-negative",
                    provider.name
                ));
            }
        }

        if self.routing.max_retries == 0 {
            return Err("routing.max_retries must be at least 1".to_string());
        }
        self.selection_strategy()?;

        if self.health.check_interval_ms == 0 {
            return Err("health.check_interval_ms must be non-zero".to_string());
        }
        if self.circuit_breaker.trip_threshold == 0 {
            return Err("circuit_breaker.trip_threshold must be non-zero".to_string());
        }
        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("logging.format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }

    /// Provider descriptors in configuration order.
    #[must_use]
    pub fn provider_configs(&self) -> Vec<ProviderConfig> {
        self.providers
            .iter()
            .map(|p| ProviderConfig {
                name: Arc::from(p.name.as_str()),
                url: p.url.clone(),
                priority: p.priority,
                cost_per_request: p.cost_per_request,
            })
            .collect()
    }

    /// Parsed routing strategy.
    ///
    /// # Errors
    ///
    /// Returns an error for unrecognized strategy names.
    pub fn selection_strategy(&self) -> Result<SelectionStrategy, String> {
        match self.routing.strategy.as_str() {
            "least_latency" => Ok(SelectionStrategy::LeastLatency),
            "round_robin" => Ok(SelectionStrategy::RoundRobin),
            other => Err(format!("unknown routing strategy: {other}")),
        }
    }

    /// Breaker settings applied to every provider.
    #[must_use]
    pub fn breaker_settings(&self) -> BreakerSettings {
        BreakerSettings {
            trip_threshold: self.circuit_breaker.trip_threshold,
            open_timeout: Duration::from_millis(self.circuit_breaker.timeout_ms),
            max_requests: self.circuit_breaker.max_requests,
        }
    }

    /// Retry settings for the dispatch engine.
    #[must_use]
    pub fn retry_settings(&self) -> RetrySettings {
        RetrySettings {
            max_retries: self.routing.max_retries,
            initial_backoff: Duration::from_millis(self.routing.retry_backoff_ms),
        }
    }

    /// Cache policy for the response cache.
    #[must_use]
    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            enabled: self.caching.enabled,
            method_ttls: self
                .caching
                .methods
                .iter()
                .map(|(method, ttl_ms)| (method.clone(), Duration::from_millis(*ttl_ms)))
                .collect(),
        }
    }

    /// Probe interval as a [`Duration`].
    #[must_use]
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.health.check_interval_ms)
    }

    /// Per-probe deadline as a [`Duration`].
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.health.timeout_ms)
    }

    /// Store sweep interval as a [`Duration`].
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.state_store.sweep_interval_ms)
    }

    /// Request read deadline as a [`Duration`].
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.server.read_timeout_ms)
    }
}
