//! Configuration loading and typed config structures for the Taskpulse core.
//!
//! The loader reads YAML, applies environment overrides for the external
//! service endpoints, then validates. Validation is fail-fast: a config
//! that violates a component invariant (for example
//! `min_connections > max_connections`) is rejected before any component
//! is constructed.

use std::path::Path;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but violates a component invariant.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of the violated invariant.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level core configuration.
///
/// Mirrors the YAML structure; every section has defaults suitable for
/// local development against docker-compose services.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CoreConfig {
    /// Database connection parameters and pool sizing bounds.
    #[serde(default)]
    pub database: DatabaseSection,

    /// Cache level budgets, TTLs, and strategy selection.
    #[serde(default)]
    pub cache: CacheSection,

    /// Queue lease and retry parameters.
    #[serde(default)]
    pub queue: QueueSection,

    /// Fan-out bind address, heartbeat, and backpressure settings.
    #[serde(default)]
    pub fanout: FanoutSection,

    /// Monitor sampling and alert-evaluation settings.
    #[serde(default)]
    pub monitor: MonitorSection,

    /// Benchmark suite defaults.
    #[serde(default)]
    pub benchmark: BenchmarkDefaults,
}

impl CoreConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values for service endpoints:
    /// - `DATABASE_HOST` overrides `database.host`
    /// - `DATABASE_PASSWORD` overrides `database.password`
    /// - `CACHE_URL` overrides `cache.l2_url`
    /// - `BROKER_URL` overrides `queue.broker_url`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a component invariant is violated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a component invariant is violated.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override service endpoints with environment variables when set.
    ///
    /// This lets Docker Compose (or any deployment) point the core at its
    /// services without editing the YAML file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DATABASE_HOST") {
            self.database.host = val;
        }
        if let Ok(val) = std::env::var("DATABASE_PASSWORD") {
            self.database.password = val;
        }
        if let Ok(val) = std::env::var("CACHE_URL") {
            self.cache.l2_url = val;
        }
        if let Ok(val) = std::env::var("BROKER_URL") {
            self.queue.broker_url = val;
        }
    }

    /// Check every structural invariant the components rely on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violated
    /// invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.min_connections == 0 {
            return Err(invalid("database.min_connections must be at least 1"));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(invalid(
                "database.min_connections must not exceed database.max_connections",
            ));
        }
        if self.database.connect_timeout_ms == 0 {
            return Err(invalid("database.connect_timeout_ms must be at least 1"));
        }
        if self.cache.l1_max_entries == 0 {
            return Err(invalid("cache.l1_max_entries must be at least 1"));
        }
        if self.cache.l1_max_bytes == 0 {
            return Err(invalid("cache.l1_max_bytes must be at least 1"));
        }
        if !matches!(self.cache.eviction_policy.as_str(), "lru" | "lfu" | "ttl" | "size") {
            return Err(invalid(
                "cache.eviction_policy must be one of lru, lfu, ttl, size",
            ));
        }
        if !matches!(
            self.cache.write_strategy.as_str(),
            "write_through" | "write_back"
        ) {
            return Err(invalid(
                "cache.write_strategy must be write_through or write_back",
            ));
        }
        if !matches!(
            self.database.tls_mode.as_str(),
            "disable" | "prefer" | "require"
        ) {
            return Err(invalid(
                "database.tls_mode must be one of disable, prefer, require",
            ));
        }
        if self.queue.visibility_timeout_secs == 0 {
            return Err(invalid("queue.visibility_timeout_secs must be at least 1"));
        }
        if self.fanout.session_buffer == 0 {
            return Err(invalid("fanout.session_buffer must be at least 1"));
        }
        if self.fanout.idle_timeout_secs == 0 {
            return Err(invalid("fanout.idle_timeout_secs must be at least 1"));
        }
        if self.monitor.sample_interval_secs == 0 || self.monitor.alert_interval_secs == 0 {
            return Err(invalid("monitor intervals must be at least 1 second"));
        }
        if self.benchmark.concurrency == 0 {
            return Err(invalid("benchmark.concurrency must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.to_owned(),
    }
}

/// Database connection parameters and pool sizing bounds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseSection {
    /// Database server host.
    #[serde(default = "default_db_host")]
    pub host: String,

    /// Database server port.
    #[serde(default = "default_db_port")]
    pub port: u16,

    /// Database name.
    #[serde(default = "default_db_name")]
    pub database: String,

    /// Database user.
    #[serde(default = "default_db_user")]
    pub user: String,

    /// Database password.
    #[serde(default = "default_db_password")]
    pub password: String,

    /// TLS mode: `disable`, `prefer`, or `require`.
    #[serde(default = "default_tls_mode")]
    pub tls_mode: String,

    /// Minimum connections the pool keeps established.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Maximum connections the pool will open.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long an `acquire` may wait for a free connection.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// How long an idle connection is kept before being closed.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Per-query execution deadline.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            database: default_db_name(),
            user: default_db_user(),
            password: default_db_password(),
            tls_mode: default_tls_mode(),
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            connect_timeout_ms: default_connect_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

/// Cache level budgets, TTLs, and strategy selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheSection {
    /// Redis-compatible URL of the shared L2 cache.
    #[serde(default = "default_cache_url")]
    pub l2_url: String,

    /// Maximum number of entries held in L1.
    #[serde(default = "default_l1_max_entries")]
    pub l1_max_entries: usize,

    /// Maximum total payload bytes held in L1.
    #[serde(default = "default_l1_max_bytes")]
    pub l1_max_bytes: usize,

    /// Default entry TTL in seconds when the caller passes none.
    #[serde(default = "default_cache_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Eviction policy: `lru`, `lfu`, `ttl`, or `size`.
    #[serde(default = "default_eviction_policy")]
    pub eviction_policy: String,

    /// Write strategy: `write_through` or `write_back`.
    #[serde(default = "default_write_strategy")]
    pub write_strategy: String,

    /// Depth of the write-back flush queue before puts shed to
    /// write-through.
    #[serde(default = "default_write_back_depth")]
    pub write_back_depth: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            l2_url: default_cache_url(),
            l1_max_entries: default_l1_max_entries(),
            l1_max_bytes: default_l1_max_bytes(),
            default_ttl_secs: default_cache_ttl_secs(),
            eviction_policy: default_eviction_policy(),
            write_strategy: default_write_strategy(),
            write_back_depth: default_write_back_depth(),
        }
    }
}

/// Queue lease and retry parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueSection {
    /// Redis-compatible URL of the durable broker.
    #[serde(default = "default_broker_url")]
    pub broker_url: String,

    /// Lease duration during which a claimed message is hidden from
    /// other consumers.
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,

    /// Retry ceiling after which a message is marked failed or expired.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Key prefix namespacing all broker keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            broker_url: default_broker_url(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
            max_retries: default_max_retries(),
            key_prefix: default_key_prefix(),
        }
    }
}

/// Fan-out bind address, heartbeat, and backpressure settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FanoutSection {
    /// Host address the fan-out HTTP server binds to.
    #[serde(default = "default_fanout_host")]
    pub host: String,

    /// TCP port the fan-out HTTP server listens on.
    #[serde(default = "default_fanout_port")]
    pub port: u16,

    /// Seconds of heartbeat silence after which a session is reaped.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Interval at which the reaper scans for idle sessions.
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,

    /// Bounded outbound buffer size per session; the oldest frame is
    /// dropped when full.
    #[serde(default = "default_session_buffer")]
    pub session_buffer: usize,

    /// Dispatcher sleep when every subscribed topic is drained.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for FanoutSection {
    fn default() -> Self {
        Self {
            host: default_fanout_host(),
            port: default_fanout_port(),
            idle_timeout_secs: default_idle_timeout_secs(),
            reap_interval_secs: default_reap_interval_secs(),
            session_buffer: default_session_buffer(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Monitor sampling and alert-evaluation settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MonitorSection {
    /// Interval between resource samples.
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u64,

    /// Interval between alert evaluations.
    #[serde(default = "default_alert_interval_secs")]
    pub alert_interval_secs: u64,

    /// Samples retained per metric kind.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Alert thresholds.
    #[serde(default)]
    pub thresholds: ThresholdSection,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            sample_interval_secs: default_sample_interval_secs(),
            alert_interval_secs: default_alert_interval_secs(),
            history_limit: default_history_limit(),
            thresholds: ThresholdSection::default(),
        }
    }
}

/// Alert thresholds evaluated against the newest sample per metric kind.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ThresholdSection {
    /// Pool utilization fraction above which an alert is raised.
    #[serde(default = "default_pool_utilization_max")]
    pub pool_utilization_max: f64,

    /// Cache hit ratio below which an alert is raised.
    #[serde(default = "default_cache_hit_ratio_min")]
    pub cache_hit_ratio_min: f64,

    /// Pending queue depth above which an alert is raised.
    #[serde(default = "default_queue_depth_max")]
    pub queue_depth_max: f64,

    /// p99 latency in milliseconds above which an alert is raised.
    #[serde(default = "default_latency_p99_max_ms")]
    pub latency_p99_max_ms: f64,
}

impl Default for ThresholdSection {
    fn default() -> Self {
        Self {
            pool_utilization_max: default_pool_utilization_max(),
            cache_hit_ratio_min: default_cache_hit_ratio_min(),
            queue_depth_max: default_queue_depth_max(),
            latency_p99_max_ms: default_latency_p99_max_ms(),
        }
    }
}

/// Benchmark suite defaults, overridable per run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BenchmarkDefaults {
    /// Measured run duration in seconds.
    #[serde(default = "default_bench_duration_secs")]
    pub duration_secs: u64,

    /// Concurrent workers driving load.
    #[serde(default = "default_bench_concurrency")]
    pub concurrency: usize,

    /// Target operations per second across all workers (0 = unthrottled).
    #[serde(default)]
    pub target_rate: u64,

    /// Warm-up window excluded from the report.
    #[serde(default = "default_bench_warmup_secs")]
    pub warmup_secs: u64,

    /// Cool-down window after the measured run.
    #[serde(default = "default_bench_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Error budget; a run exceeding it is marked failed.
    #[serde(default = "default_bench_max_errors")]
    pub max_errors: u64,
}

impl Default for BenchmarkDefaults {
    fn default() -> Self {
        Self {
            duration_secs: default_bench_duration_secs(),
            concurrency: default_bench_concurrency(),
            target_rate: 0,
            warmup_secs: default_bench_warmup_secs(),
            cooldown_secs: default_bench_cooldown_secs(),
            max_errors: default_bench_max_errors(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_db_host() -> String {
    "localhost".to_owned()
}

const fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "taskpulse".to_owned()
}

fn default_db_user() -> String {
    "taskpulse".to_owned()
}

fn default_db_password() -> String {
    "taskpulse".to_owned()
}

fn default_tls_mode() -> String {
    "prefer".to_owned()
}

const fn default_min_connections() -> u32 {
    2
}

const fn default_max_connections() -> u32 {
    10
}

const fn default_connect_timeout_ms() -> u64 {
    5_000
}

const fn default_idle_timeout_ms() -> u64 {
    300_000
}

const fn default_command_timeout_ms() -> u64 {
    10_000
}

fn default_cache_url() -> String {
    "redis://localhost:6379/0".to_owned()
}

const fn default_l1_max_entries() -> usize {
    10_000
}

const fn default_l1_max_bytes() -> usize {
    64 * 1024 * 1024
}

const fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_eviction_policy() -> String {
    "lru".to_owned()
}

fn default_write_strategy() -> String {
    "write_through".to_owned()
}

const fn default_write_back_depth() -> usize {
    1024
}

fn default_broker_url() -> String {
    "redis://localhost:6379/1".to_owned()
}

const fn default_visibility_timeout_secs() -> u64 {
    30
}

const fn default_max_retries() -> u32 {
    3
}

fn default_key_prefix() -> String {
    "taskpulse".to_owned()
}

fn default_fanout_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_fanout_port() -> u16 {
    8080
}

const fn default_idle_timeout_secs() -> u64 {
    60
}

const fn default_reap_interval_secs() -> u64 {
    10
}

const fn default_session_buffer() -> usize {
    256
}

const fn default_poll_interval_ms() -> u64 {
    100
}

const fn default_sample_interval_secs() -> u64 {
    5
}

const fn default_alert_interval_secs() -> u64 {
    15
}

const fn default_history_limit() -> usize {
    720
}

const fn default_pool_utilization_max() -> f64 {
    0.9
}

const fn default_cache_hit_ratio_min() -> f64 {
    0.5
}

const fn default_queue_depth_max() -> f64 {
    10_000.0
}

const fn default_latency_p99_max_ms() -> f64 {
    500.0
}

const fn default_bench_duration_secs() -> u64 {
    30
}

const fn default_bench_concurrency() -> usize {
    8
}

const fn default_bench_warmup_secs() -> u64 {
    5
}

const fn default_bench_cooldown_secs() -> u64 {
    2
}

const fn default_bench_max_errors() -> u64 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = CoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.database.min_connections, 2);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.queue.visibility_timeout_secs, 30);
        assert_eq!(config.fanout.session_buffer, 256);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
database:
  host: "db.internal"
  port: 5433
  database: "progress"
  user: "svc"
  password: "secret"
  tls_mode: "require"
  min_connections: 4
  max_connections: 16
  connect_timeout_ms: 2000
  idle_timeout_ms: 60000
  command_timeout_ms: 5000

cache:
  l2_url: "redis://cache.internal:6379/0"
  l1_max_entries: 500
  l1_max_bytes: 1048576
  default_ttl_secs: 120
  eviction_policy: "lfu"
  write_strategy: "write_back"
  write_back_depth: 64

queue:
  broker_url: "redis://broker.internal:6379/1"
  visibility_timeout_secs: 15
  max_retries: 5
  key_prefix: "progress"

fanout:
  host: "127.0.0.1"
  port: 9090
  idle_timeout_secs: 30
  reap_interval_secs: 5
  session_buffer: 64
  poll_interval_ms: 50

monitor:
  sample_interval_secs: 2
  alert_interval_secs: 6
  history_limit: 100
  thresholds:
    pool_utilization_max: 0.8
    cache_hit_ratio_min: 0.6
    queue_depth_max: 500
    latency_p99_max_ms: 250

benchmark:
  duration_secs: 10
  concurrency: 4
  target_rate: 200
  warmup_secs: 1
  cooldown_secs: 1
  max_errors: 10
"#;

        let config = CoreConfig::parse(yaml);
        assert!(config.is_ok(), "parse failed: {config:?}");
        let config = config.ok().unwrap_or_default();

        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.min_connections, 4);
        assert_eq!(config.cache.eviction_policy, "lfu");
        assert_eq!(config.cache.write_strategy, "write_back");
        assert_eq!(config.queue.max_retries, 5);
        assert_eq!(config.fanout.port, 9090);
        assert_eq!(config.monitor.history_limit, 100);
        assert_eq!(config.benchmark.max_errors, 10);
    }

    #[test]
    fn parse_minimal_yaml() {
        let yaml = "queue:\n  max_retries: 7\n";
        let config = CoreConfig::parse(yaml);
        assert!(config.is_ok());
        let config = config.ok().unwrap_or_default();

        // Override applies
        assert_eq!(config.queue.max_retries, 7);
        // Everything else uses defaults
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.cache.l1_max_entries, 10_000);
    }

    #[test]
    fn parse_empty_yaml() {
        assert!(CoreConfig::parse("").is_ok());
    }

    #[test]
    fn min_above_max_is_rejected() {
        let yaml = "database:\n  min_connections: 8\n  max_connections: 4\n";
        let result = CoreConfig::parse(yaml);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn zero_min_connections_is_rejected() {
        let yaml = "database:\n  min_connections: 0\n";
        let result = CoreConfig::parse(yaml);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn zero_session_buffer_is_rejected() {
        let yaml = "fanout:\n  session_buffer: 0\n";
        let result = CoreConfig::parse(yaml);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn unknown_eviction_policy_is_rejected() {
        let yaml = "cache:\n  eviction_policy: \"random\"\n";
        let result = CoreConfig::parse(yaml);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn unknown_write_strategy_is_rejected() {
        let yaml = "cache:\n  write_strategy: \"write_around\"\n";
        let result = CoreConfig::parse(yaml);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }
}
