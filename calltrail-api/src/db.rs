//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling using deadpool-postgres, and the
//! [`PgCallStore`] implementation of [`CallStore`] over two tables:
//!
//! - `calls`: one row per external call id (`UNIQUE (external_call_id)`)
//! - `operators`: read-only directory (`UNIQUE (sip_address)`)
//!
//! The schema lives in `sql/schema.sql`.

use crate::constants::{
    DEFAULT_DB_HOST, DEFAULT_DB_NAME, DEFAULT_DB_POOL_SIZE, DEFAULT_DB_PORT, DEFAULT_DB_TIMEOUT_SECS,
    DEFAULT_DB_USER,
};
use crate::error::{ApiError, ApiResult};
use ::async_trait::async_trait;
use calltrail_core::{
    CallId, CallRecord, CallRecordPatch, CallStatus, NewCallRecord, Operator, OperatorId,
    StorageError, Timestamp,
};
use calltrail_storage::{CallStore, StoreResult};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::time::Duration;
use tokio_postgres::{NoTls, Row};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait/create timeout for pooled connections
    pub timeout: Duration,
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("max_size", &self.max_size)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DB_HOST.to_string(),
            port: DEFAULT_DB_PORT,
            dbname: DEFAULT_DB_NAME.to_string(),
            user: DEFAULT_DB_USER.to_string(),
            password: "".to_string(),
            max_size: DEFAULT_DB_POOL_SIZE,
            timeout: Duration::from_secs(DEFAULT_DB_TIMEOUT_SECS),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("CALLTRAIL_DB_HOST").unwrap_or_else(|_| DEFAULT_DB_HOST.to_string()),
            port: std::env::var("CALLTRAIL_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_DB_PORT),
            dbname: std::env::var("CALLTRAIL_DB_NAME").unwrap_or_else(|_| DEFAULT_DB_NAME.to_string()),
            user: std::env::var("CALLTRAIL_DB_USER").unwrap_or_else(|_| DEFAULT_DB_USER.to_string()),
            password: std::env::var("CALLTRAIL_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("CALLTRAIL_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_DB_POOL_SIZE),
            timeout: Duration::from_secs(
                std::env::var("CALLTRAIL_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DB_TIMEOUT_SECS),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        pool_cfg.timeouts.create = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// POSTGRES CALL STORE
// ============================================================================

const CALL_COLUMNS: &str = "id, external_call_id, phone_client, phone_line, direction, \
     created_at, answered_at, ended_at, status, duration_seconds, operator_id, \
     recording_ref, city, source";

const OPERATOR_COLUMNS: &str = "id, name, sip_address, city";

/// [`CallStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgCallStore {
    pool: Pool,
}

impl PgCallStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> StoreResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| StorageError::Unavailable {
            reason: e.to_string(),
        })
    }

    /// Round-trip a trivial query.
    pub async fn health_check(&self) -> StoreResult<()> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(query_error)?;
        Ok(())
    }

    async fn query_call(
        &self,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> StoreResult<Option<CallRecord>> {
        let conn = self.get_conn().await?;
        let row = conn.query_opt(sql, params).await.map_err(query_error)?;
        row.as_ref().map(row_to_call).transpose()
    }

    async fn query_operator(
        &self,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> StoreResult<Option<Operator>> {
        let conn = self.get_conn().await?;
        let row = conn.query_opt(sql, params).await.map_err(query_error)?;
        Ok(row.as_ref().map(row_to_operator))
    }
}

#[async_trait]
impl CallStore for PgCallStore {
    async fn find_by_external_id(&self, external_call_id: &str) -> StoreResult<Option<CallRecord>> {
        let sql = format!("SELECT {} FROM calls WHERE external_call_id = $1", CALL_COLUMNS);
        self.query_call(&sql, &[&external_call_id]).await
    }

    async fn find_by_id(&self, id: CallId) -> StoreResult<Option<CallRecord>> {
        let sql = format!("SELECT {} FROM calls WHERE id = $1", CALL_COLUMNS);
        self.query_call(&sql, &[&id]).await
    }

    async fn find_matching_external_id(&self, fragment: &str) -> StoreResult<Option<CallRecord>> {
        if fragment.is_empty() {
            return Ok(None);
        }
        if let Some(exact) = self.find_by_external_id(fragment).await? {
            return Ok(Some(exact));
        }
        let sql = format!(
            "SELECT {} FROM calls \
             WHERE strpos(external_call_id, $1) > 0 OR strpos($1, external_call_id) > 0 \
             ORDER BY id DESC LIMIT 1",
            CALL_COLUMNS
        );
        self.query_call(&sql, &[&fragment]).await
    }

    async fn create(&self, new: NewCallRecord) -> StoreResult<CallRecord> {
        let sql = format!(
            "INSERT INTO calls (external_call_id, phone_client, phone_line, direction, \
             created_at, answered_at, ended_at, status, duration_seconds, operator_id, city, source) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (external_call_id) DO NOTHING \
             RETURNING {}",
            CALL_COLUMNS
        );
        let direction = new.direction.map(|d| d.as_db_str());
        let status = new.status.as_db_str();
        let duration = new.duration_seconds.max(0);

        self.query_call(
            &sql,
            &[
                &new.external_call_id,
                &new.phone_client,
                &new.phone_line,
                &direction,
                &new.created_at,
                &new.answered_at,
                &new.ended_at,
                &status,
                &duration,
                &new.operator_id,
                &new.city,
                &new.source,
            ],
        )
        .await?
        .ok_or_else(|| StorageError::call_already_exists(&new.external_call_id))
    }

    async fn update(
        &self,
        external_call_id: &str,
        patch: CallRecordPatch,
    ) -> StoreResult<CallRecord> {
        // Positive durations are never replaced by zero.
        let sql = format!(
            "UPDATE calls SET \
               phone_client = COALESCE($2, phone_client), \
               phone_line = COALESCE($3, phone_line), \
               direction = COALESCE($4, direction), \
               created_at = COALESCE($5, created_at), \
               answered_at = COALESCE($6, answered_at), \
               ended_at = COALESCE($7, ended_at), \
               status = COALESCE($8, status), \
               duration_seconds = CASE \
                 WHEN $9::INT IS NULL THEN duration_seconds \
                 WHEN GREATEST($9::INT, 0) > 0 OR duration_seconds = 0 THEN GREATEST($9::INT, 0) \
                 ELSE duration_seconds END, \
               operator_id = COALESCE($10, operator_id), \
               recording_ref = COALESCE($11, recording_ref), \
               city = COALESCE($12, city), \
               source = COALESCE($13, source) \
             WHERE external_call_id = $1 \
             RETURNING {}",
            CALL_COLUMNS
        );
        let direction = patch.direction.map(|d| d.as_db_str());
        let status = patch.status.map(|s| s.as_db_str());

        self.query_call(
            &sql,
            &[
                &external_call_id,
                &patch.phone_client,
                &patch.phone_line,
                &direction,
                &patch.created_at,
                &patch.answered_at,
                &patch.ended_at,
                &status,
                &patch.duration_seconds,
                &patch.operator_id,
                &patch.recording_ref,
                &patch.city,
                &patch.source,
            ],
        )
        .await?
        .ok_or_else(|| StorageError::call_not_found(external_call_id))
    }

    async fn find_operator_by_sip(&self, sip: &str) -> StoreResult<Option<Operator>> {
        let sql = format!("SELECT {} FROM operators WHERE sip_address = $1", OPERATOR_COLUMNS);
        self.query_operator(&sql, &[&sip]).await
    }

    async fn find_operator_by_id(&self, id: OperatorId) -> StoreResult<Option<Operator>> {
        let sql = format!("SELECT {} FROM operators WHERE id = $1", OPERATOR_COLUMNS);
        self.query_operator(&sql, &[&id]).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.health_check().await
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn query_error(e: tokio_postgres::Error) -> StorageError {
    tracing::error!("Database error: {:?}", e);
    StorageError::Query {
        reason: e.to_string(),
    }
}

fn row_to_call(row: &Row) -> StoreResult<CallRecord> {
    let status: String = row.get("status");
    let status = CallStatus::from_db_str(&status).map_err(|e| StorageError::Query {
        reason: e.to_string(),
    })?;
    let direction: Option<String> = row.get("direction");

    Ok(CallRecord {
        id: row.get("id"),
        external_call_id: row.get("external_call_id"),
        phone_client: row.get("phone_client"),
        phone_line: row.get("phone_line"),
        direction: direction.and_then(|d| d.parse().ok()),
        created_at: row.get::<_, Option<Timestamp>>("created_at"),
        answered_at: row.get::<_, Option<Timestamp>>("answered_at"),
        ended_at: row.get::<_, Option<Timestamp>>("ended_at"),
        status,
        duration_seconds: row.get::<_, i32>("duration_seconds").max(0),
        operator_id: row.get("operator_id"),
        recording_ref: row.get("recording_ref"),
        city: row.get("city"),
        source: row.get("source"),
    })
}

fn row_to_operator(row: &Row) -> Operator {
    Operator {
        id: row.get("id"),
        name: row.get("name"),
        sip_address: row.get("sip_address"),
        city: row.get("city"),
    }
}
