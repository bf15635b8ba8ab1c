//! Pool configuration and TLS material.

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::error::DbError;

/// Default minimum number of connections kept established.
const DEFAULT_MIN_CONNECTIONS: u32 = 2;

/// Default maximum number of connections in the pool.
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Default acquire/connect timeout in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default idle timeout in seconds.
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Default per-query deadline in seconds.
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 10;

/// TLS mode for database connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// Never use TLS.
    Disable,
    /// Use TLS when the server supports it.
    #[default]
    Prefer,
    /// Refuse to connect without TLS.
    Require,
}

impl TlsMode {
    /// Parse a TLS mode from its configuration string.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] for anything other than `disable`,
    /// `prefer`, or `require`.
    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "disable" => Ok(Self::Disable),
            "prefer" => Ok(Self::Prefer),
            "require" => Ok(Self::Require),
            other => Err(DbError::Config(format!("unknown tls_mode: {other}"))),
        }
    }

    const fn ssl_mode(self) -> PgSslMode {
        match self {
            Self::Disable => PgSslMode::Disable,
            Self::Prefer => PgSslMode::Prefer,
            Self::Require => PgSslMode::Require,
        }
    }
}

/// Configuration for one managed connection pool.
///
/// Invariant: `1 <= min_connections <= max_connections`, enforced by
/// [`PoolConfig::validate`] before any connection is opened.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Database server host.
    pub host: String,
    /// Database server port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Database user.
    pub user: String,
    /// Database password.
    pub password: String,
    /// TLS mode.
    pub tls_mode: TlsMode,
    /// Minimum connections the pool keeps established.
    pub min_connections: u32,
    /// Maximum connections the pool will open.
    pub max_connections: u32,
    /// How long `acquire` may wait for a free connection.
    pub connect_timeout: Duration,
    /// How long an idle connection is kept before being closed.
    pub idle_timeout: Duration,
    /// Per-query execution deadline.
    pub command_timeout: Duration,
}

impl PoolConfig {
    /// Create a configuration for `database` on `host` with defaults for
    /// everything else.
    pub fn new(host: &str, database: &str, user: &str, password: &str) -> Self {
        Self {
            host: host.to_owned(),
            port: 5432,
            database: database.to_owned(),
            user: user.to_owned(),
            password: password.to_owned(),
            tls_mode: TlsMode::default(),
            min_connections: DEFAULT_MIN_CONNECTIONS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }

    /// Set the server port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the connection count bounds.
    #[must_use]
    pub const fn with_connections(mut self, min: u32, max: u32) -> Self {
        self.min_connections = min;
        self.max_connections = max;
        self
    }

    /// Set the acquire/connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the per-query deadline.
    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the TLS mode.
    #[must_use]
    pub const fn with_tls_mode(mut self, mode: TlsMode) -> Self {
        self.tls_mode = mode;
        self
    }

    /// Check the sizing invariant.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] when `min_connections` is zero or
    /// exceeds `max_connections`, or when a timeout is zero.
    pub fn validate(&self) -> Result<(), DbError> {
        if self.min_connections == 0 {
            return Err(DbError::Config(
                "min_connections must be at least 1".to_owned(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(DbError::Config(format!(
                "min_connections ({}) must not exceed max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        if self.connect_timeout.is_zero() || self.command_timeout.is_zero() {
            return Err(DbError::Config("timeouts must be non-zero".to_owned()));
        }
        Ok(())
    }

    /// Build the `sqlx` connect options for this configuration.
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
            .ssl_mode(self.tls_mode.ssl_mode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> PoolConfig {
        PoolConfig::new("localhost", "taskpulse", "svc", "secret")
    }

    #[test]
    fn defaults_satisfy_the_invariant() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn zero_min_is_rejected() {
        let config = base().with_connections(0, 5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn min_above_max_is_rejected() {
        let config = base().with_connections(6, 5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn equal_min_and_max_is_allowed() {
        let config = base().with_connections(5, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = base().with_connect_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn tls_mode_parsing() {
        assert_eq!(TlsMode::parse("disable").ok(), Some(TlsMode::Disable));
        assert_eq!(TlsMode::parse("prefer").ok(), Some(TlsMode::Prefer));
        assert_eq!(TlsMode::parse("require").ok(), Some(TlsMode::Require));
        assert!(TlsMode::parse("verify-full").is_err());
    }
}
