//! The managed connection pool: leases, typed query operations, health.
//!
//! Uses [`sqlx`] with runtime query construction (not compile-time
//! checked) so no live database is required at build time. All queries
//! are parameterized through bound arguments to prevent SQL injection.
//!
//! The original design exposed one `execute` call whose behavior
//! switched on mode flags; here each result shape is a distinct typed
//! operation (`exec`, `query_rows`, `query_row`, `query_opt`,
//! `query_scalar`) so the caller's intent is visible in the signature.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, pool::PoolConnection};

use crate::config::PoolConfig;
use crate::error::DbError;
use crate::stats::{PoolStats, StatsRecorder};

/// Fixed acquire deadline used by [`DatabasePool::health_check`].
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// An exclusively-owned lease over one physical connection.
///
/// Owned by exactly one in-flight operation; the connection returns to
/// the pool when the lease drops, on every exit path including early
/// returns and panics in the holder.
pub struct PoolLease {
    conn: PoolConnection<Postgres>,
    acquired_at: Instant,
}

impl PoolLease {
    pub(crate) fn new(conn: PoolConnection<Postgres>) -> Self {
        Self {
            conn,
            acquired_at: Instant::now(),
        }
    }

    /// The leased connection, usable as a `sqlx` executor.
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    /// How long this lease has been held.
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

/// Point-in-time health report for one pool.
///
/// An unhealthy database is reported as data, never as an error: the
/// `healthy` flag is false and `error` carries the detail.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Whether the round-trip probe succeeded within its deadline.
    pub healthy: bool,
    /// Connections currently leased out.
    pub active: u32,
    /// Connections currently idle in the pool.
    pub idle: u32,
    /// Total open connections.
    pub size: u32,
    /// Configured connection ceiling.
    pub max_connections: u32,
    /// `active / max_connections` as a fraction.
    pub utilization: f64,
    /// Probe failure detail when unhealthy.
    pub error: Option<String>,
}

/// A managed `PostgreSQL` connection pool.
///
/// Cloning is cheap and shares the underlying pool and statistics.
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
    acquire_timeout: Duration,
    command_timeout: Duration,
    max_connections: u32,
    recorder: Arc<StatsRecorder>,
}

impl DatabasePool {
    /// Establish the pool against the configured database.
    ///
    /// The minimum connection count is established eagerly by the
    /// initial connect and maintained by the pool; an unreachable
    /// database fails fast here rather than on first use.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the configuration violates the
    /// sizing invariant, or [`DbError::Connectivity`] if no connection
    /// can be established.
    pub async fn initialize(config: &PoolConfig) -> Result<Self, DbError> {
        config.validate()?;

        let recorder = Arc::new(StatsRecorder::default());
        let hook_recorder = Arc::clone(&recorder);

        let pool = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .after_connect(move |_conn, _meta| {
                let recorder = Arc::clone(&hook_recorder);
                Box::pin(async move {
                    recorder.note_connection_created();
                    Ok(())
                })
            })
            .connect_with(config.connect_options())
            .await
            .map_err(|e| DbError::Connectivity(e.to_string()))?;

        tracing::info!(
            host = %config.host,
            database = %config.database,
            min_connections = config.min_connections,
            max_connections = config.max_connections,
            "Connection pool initialized"
        );

        Ok(Self {
            pool,
            acquire_timeout: config.connect_timeout,
            command_timeout: config.command_timeout,
            max_connections: config.max_connections,
            recorder,
        })
    }

    /// Acquire a scoped lease, waiting at most `timeout`.
    ///
    /// Suspends only the calling task. The lease returns its connection
    /// to the pool on drop.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Timeout`] when no connection frees up in time,
    /// [`DbError::Closed`] after [`close`](Self::close), or
    /// [`DbError::Postgres`] for other pool failures.
    pub async fn acquire(&self, timeout: Duration) -> Result<PoolLease, DbError> {
        let millis = duration_millis(timeout);
        match tokio::time::timeout(timeout, self.pool.acquire()).await {
            Ok(Ok(conn)) => {
                self.recorder.note_acquire();
                Ok(PoolLease::new(conn))
            }
            Ok(Err(sqlx::Error::PoolClosed)) => Err(DbError::Closed),
            Ok(Err(sqlx::Error::PoolTimedOut)) | Err(_) => {
                self.recorder.note_acquire_timeout();
                Err(DbError::Timeout {
                    operation: "acquire",
                    millis,
                })
            }
            Ok(Err(e)) => Err(DbError::Postgres(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Typed query operations
    // -----------------------------------------------------------------------

    /// Run a statement and return the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on acquire failure, query failure, or the
    /// command deadline.
    pub async fn exec(&self, sql: &str) -> Result<u64, DbError> {
        self.exec_inner(sql, None).await
    }

    /// Run a statement with bound arguments.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on acquire failure, query failure, or the
    /// command deadline.
    pub async fn exec_with(&self, sql: &str, args: PgArguments) -> Result<u64, DbError> {
        self.exec_inner(sql, Some(args)).await
    }

    async fn exec_inner(&self, sql: &str, args: Option<PgArguments>) -> Result<u64, DbError> {
        let mut lease = self.acquire(self.acquire_timeout).await?;
        let started = Instant::now();
        let fut = async {
            match args {
                Some(a) => sqlx::query_with(sql, a).execute(lease.connection()).await,
                None => sqlx::query(sql).execute(lease.connection()).await,
            }
        };
        let result = tokio::time::timeout(self.command_timeout, fut).await;
        self.finish(started, result).map(|done| done.rows_affected())
    }

    /// Fetch every matching row, decoded into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on acquire failure, query failure, or the
    /// command deadline.
    pub async fn query_rows<T>(&self, sql: &str) -> Result<Vec<T>, DbError>
    where
        T: for<'r> sqlx::FromRow<'r, PgRow> + Send + Unpin,
    {
        self.query_rows_inner(sql, None).await
    }

    /// Fetch every matching row with bound arguments.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on acquire failure, query failure, or the
    /// command deadline.
    pub async fn query_rows_with<T>(&self, sql: &str, args: PgArguments) -> Result<Vec<T>, DbError>
    where
        T: for<'r> sqlx::FromRow<'r, PgRow> + Send + Unpin,
    {
        self.query_rows_inner(sql, Some(args)).await
    }

    async fn query_rows_inner<T>(
        &self,
        sql: &str,
        args: Option<PgArguments>,
    ) -> Result<Vec<T>, DbError>
    where
        T: for<'r> sqlx::FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut lease = self.acquire(self.acquire_timeout).await?;
        let started = Instant::now();
        let fut = async {
            match args {
                Some(a) => {
                    sqlx::query_as_with::<_, T, _>(sql, a)
                        .fetch_all(lease.connection())
                        .await
                }
                None => {
                    sqlx::query_as::<_, T>(sql)
                        .fetch_all(lease.connection())
                        .await
                }
            }
        };
        let result = tokio::time::timeout(self.command_timeout, fut).await;
        self.finish(started, result)
    }

    /// Fetch exactly one row, decoded into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] wrapping `RowNotFound` when no row
    /// matches, and [`DbError`] for the other failure modes.
    pub async fn query_row<T>(&self, sql: &str, args: PgArguments) -> Result<T, DbError>
    where
        T: for<'r> sqlx::FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut lease = self.acquire(self.acquire_timeout).await?;
        let started = Instant::now();
        let fut = sqlx::query_as_with::<_, T, _>(sql, args).fetch_one(lease.connection());
        let result = tokio::time::timeout(self.command_timeout, fut).await;
        self.finish(started, result)
    }

    /// Fetch at most one row, decoded into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on acquire failure, query failure, or the
    /// command deadline.
    pub async fn query_opt<T>(&self, sql: &str, args: PgArguments) -> Result<Option<T>, DbError>
    where
        T: for<'r> sqlx::FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut lease = self.acquire(self.acquire_timeout).await?;
        let started = Instant::now();
        let fut = sqlx::query_as_with::<_, T, _>(sql, args).fetch_optional(lease.connection());
        let result = tokio::time::timeout(self.command_timeout, fut).await;
        self.finish(started, result)
    }

    /// Fetch the first column of the first row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on acquire failure, query failure, or the
    /// command deadline.
    pub async fn query_scalar<T>(&self, sql: &str) -> Result<T, DbError>
    where
        (T,): for<'r> sqlx::FromRow<'r, PgRow>,
        T: Send + Unpin,
    {
        let mut lease = self.acquire(self.acquire_timeout).await?;
        let started = Instant::now();
        let fut = sqlx::query_scalar::<_, T>(sql).fetch_one(lease.connection());
        let result = tokio::time::timeout(self.command_timeout, fut).await;
        self.finish(started, result)
    }

    /// Fetch the first column of the first row with bound arguments.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on acquire failure, query failure, or the
    /// command deadline.
    pub async fn query_scalar_with<T>(&self, sql: &str, args: PgArguments) -> Result<T, DbError>
    where
        (T,): for<'r> sqlx::FromRow<'r, PgRow>,
        T: Send + Unpin,
    {
        let mut lease = self.acquire(self.acquire_timeout).await?;
        let started = Instant::now();
        let fut = sqlx::query_scalar_with::<_, T, _>(sql, args).fetch_one(lease.connection());
        let result = tokio::time::timeout(self.command_timeout, fut).await;
        self.finish(started, result)
    }

    /// Roll one finished operation into the statistics.
    fn finish<T>(
        &self,
        started: Instant,
        result: Result<Result<T, sqlx::Error>, tokio::time::error::Elapsed>,
    ) -> Result<T, DbError> {
        match result {
            Ok(Ok(value)) => {
                self.recorder.note_query(started.elapsed(), false);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.recorder.note_query(started.elapsed(), true);
                Err(DbError::Postgres(e))
            }
            Err(_) => {
                self.recorder.note_query(started.elapsed(), true);
                Err(DbError::Timeout {
                    operation: "query",
                    millis: duration_millis(self.command_timeout),
                })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Health and lifecycle
    // -----------------------------------------------------------------------

    /// Probe the database with a short fixed deadline and a trivial
    /// round-trip query, reporting health plus utilization.
    ///
    /// Never fails: an unreachable database yields `healthy = false`
    /// with the detail in `error`.
    pub async fn health_check(&self) -> HealthReport {
        let probe: Result<i32, DbError> = async {
            let mut lease = self.acquire(HEALTH_CHECK_TIMEOUT).await?;
            let fut = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(lease.connection());
            let started = Instant::now();
            let result = tokio::time::timeout(HEALTH_CHECK_TIMEOUT, fut).await;
            self.finish(started, result)
        }
        .await;

        let size = self.pool.size();
        let idle = u32::try_from(self.pool.num_idle()).unwrap_or(u32::MAX);
        let active = size.saturating_sub(idle);
        let utilization = if self.max_connections == 0 {
            0.0
        } else {
            f64::from(active) / f64::from(self.max_connections)
        };

        match probe {
            Ok(_) => HealthReport {
                healthy: true,
                active,
                idle,
                size,
                max_connections: self.max_connections,
                utilization,
                error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Pool health check failed");
                HealthReport {
                    healthy: false,
                    active,
                    idle,
                    size,
                    max_connections: self.max_connections,
                    utilization,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Snapshot the accumulated statistics plus point-in-time gauges.
    pub fn stats(&self) -> PoolStats {
        let size = self.pool.size();
        let idle = u32::try_from(self.pool.num_idle()).unwrap_or(u32::MAX);
        self.recorder.snapshot(size, idle)
    }

    /// Drain and destroy every connection and reset the statistics.
    ///
    /// Subsequent acquisitions fail with [`DbError::Closed`] until a new
    /// pool is initialized.
    pub async fn close(&self) {
        self.pool.close().await;
        self.recorder.reset();
        tracing::info!("Connection pool closed");
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// The configured connection ceiling.
    pub const fn max_connections(&self) -> u32 {
        self.max_connections
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
