// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL store for sensor records and operator settings.
//!
//! One implementation over sqlx's `Any` driver serves SQLite (the skid's
//! local file), PostgreSQL and MySQL. Tables are created on startup if
//! missing:
//!
//! ```sql
//! CREATE TABLE fo_sensor_data (
//!   id             -- auto-increment primary key
//!   timestamp      BIGINT NOT NULL,  -- epoch millis
//!   cstr_ph ... ds_ec                 -- 11 nullable DOUBLE channels
//!   vol_to_ds, com_vol_fs, flux, increase_in_fs  -- nullable DOUBLE
//!   synced         BIGINT NOT NULL DEFAULT 0
//! )
//!
//! CREATE TABLE fo_setting (
//!   id, timestamp,
//!   set_cstr_temp, hyst_tds, set_tds, set_ec, set_feed_level  -- nullable DOUBLE
//! )
//! ```
//!
//! ## sqlx Any driver quirks
//!
//! Booleans and small integers decode to different Rust types per backend, so
//! `synced` is a 0/1 `BIGINT` (SQLite `INTEGER`) read as `i64` everywhere.
//! PostgreSQL wants `$n` placeholders; the others take `?`.

use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use tracing::{debug, info, instrument};

use super::traits::{RecordStore, SettingsStore, StorageError};
use crate::config::StoreConfig;
use crate::derived::DerivedMetrics;
use crate::record::SensorRecord;
use crate::resilience::retry::{retry, RetryConfig};
use crate::settings::ControlSetting;
use crate::telemetry::{Channel, ChannelValues};

static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

/// `mark_synced` binds at most this many ids per statement.
const MARK_CHUNK: usize = 500;

const SETTING_COLUMNS: [&str; 5] = ["set_cstr_temp", "hyst_tds", "set_tds", "set_ec", "set_feed_level"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
    Mysql,
}

impl Dialect {
    pub fn from_url(url: &str) -> Result<Self, StorageError> {
        if url.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else if url.starts_with("postgres:") || url.starts_with("postgresql:") {
            Ok(Self::Postgres)
        } else if url.starts_with("mysql:") || url.starts_with("mariadb:") {
            Ok(Self::Mysql)
        } else {
            Err(StorageError::UnsupportedUrl(redact(url)))
        }
    }

    /// Placeholder for the `n`th bind parameter (1-based).
    fn param(self, n: usize) -> String {
        match self {
            Self::Postgres => format!("${n}"),
            Self::Sqlite | Self::Mysql => "?".to_string(),
        }
    }

    fn params(self, from: usize, count: usize) -> String {
        (from..from + count).map(|n| self.param(n)).collect::<Vec<_>>().join(", ")
    }

    fn id_column(self) -> &'static str {
        match self {
            Self::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
            Self::Postgres => "id BIGSERIAL PRIMARY KEY",
            Self::Mysql => "id BIGINT AUTO_INCREMENT PRIMARY KEY",
        }
    }

    fn int_type(self) -> &'static str {
        match self {
            Self::Sqlite => "INTEGER",
            Self::Postgres | Self::Mysql => "BIGINT",
        }
    }

    fn real_type(self) -> &'static str {
        match self {
            Self::Sqlite => "REAL",
            Self::Postgres => "DOUBLE PRECISION",
            Self::Mysql => "DOUBLE",
        }
    }
}

/// Strip credentials before a URL ends up in an error or a log line.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => format!("{}://***{}", &url[..scheme], &url[at..]),
        _ => url.to_string(),
    }
}

fn backend(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

fn record_columns() -> Vec<&'static str> {
    Channel::ALL
        .iter()
        .map(|c| c.column())
        .chain(DerivedMetrics::COLUMNS)
        .collect()
}

pub struct SqlStore {
    pool: AnyPool,
    dialect: Dialect,
    read_retry: RetryConfig,
}

impl SqlStore {
    /// Connect with startup retry and create the tables if needed.
    #[instrument(skip(config), fields(url = %redact(&config.url)))]
    pub async fn connect(config: &StoreConfig) -> Result<Self, StorageError> {
        install_drivers();
        let dialect = Dialect::from_url(&config.url)?;

        let pool = retry("sql_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
                .idle_timeout(Duration::from_secs(300))
                .connect(&config.url)
                .await
                .map_err(backend)
        })
        .await?;

        let store = Self { pool, dialect, read_retry: RetryConfig::query() };
        if dialect == Dialect::Sqlite {
            store.enable_wal_mode().await?;
        }
        store.init_schema().await?;

        info!(?dialect, "SQL store ready");
        Ok(store)
    }

    #[must_use]
    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Retry policy for read queries. Writes are never retried here: a
    /// failed persist skips its tick and a failed mark leaves the batch for
    /// the next sync.
    #[must_use]
    pub fn with_read_retry(mut self, config: RetryConfig) -> Self {
        self.read_retry = config;
        self
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {e}")))?;
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to set synchronous mode: {e}")))?;
        Ok(())
    }

    fn schema_statements(&self) -> Vec<String> {
        let d = self.dialect;
        let real = d.real_type();
        let int = d.int_type();

        let channel_cols: String = record_columns()
            .iter()
            .map(|c| format!("{c} {real}, "))
            .collect();
        let setting_cols = SETTING_COLUMNS
            .iter()
            .map(|c| format!("{c} {real}"))
            .collect::<Vec<_>>()
            .join(", ");

        let (inline_idx, extra_idx) = match d {
            Dialect::Mysql => (
                ", INDEX idx_fo_sensor_ts (timestamp), INDEX idx_fo_sensor_synced (synced)",
                Vec::new(),
            ),
            Dialect::Sqlite | Dialect::Postgres => (
                "",
                vec![
                    "CREATE INDEX IF NOT EXISTS idx_fo_sensor_ts ON fo_sensor_data (timestamp)".to_string(),
                    "CREATE INDEX IF NOT EXISTS idx_fo_sensor_synced ON fo_sensor_data (synced)".to_string(),
                ],
            ),
        };

        let mut statements = vec![
            format!(
                "CREATE TABLE IF NOT EXISTS fo_sensor_data ({}, timestamp {int} NOT NULL, {channel_cols}synced {int} NOT NULL DEFAULT 0{inline_idx})",
                d.id_column()
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS fo_setting ({}, timestamp {int} NOT NULL, {setting_cols})",
                d.id_column()
            ),
        ];
        statements.extend(extra_idx);
        statements
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        for sql in self.schema_statements() {
            retry("sql_init_schema", &RetryConfig::startup(), || async {
                sqlx::query(&sql).execute(&self.pool).await.map_err(backend)
            })
            .await?;
        }
        Ok(())
    }

    fn select_records(&self) -> String {
        format!("SELECT id, timestamp, {}, synced FROM fo_sensor_data", record_columns().join(", "))
    }

    fn record_from_row(row: &AnyRow) -> Result<SensorRecord, StorageError> {
        let id: i64 = row.try_get("id").map_err(backend)?;
        let corrupt = |e: sqlx::Error| StorageError::Corrupt { id, reason: e.to_string() };

        let timestamp: i64 = row.try_get("timestamp").map_err(corrupt)?;
        let mut values = ChannelValues::new();
        for channel in Channel::ALL {
            let v: Option<f64> = row.try_get(channel.column()).map_err(corrupt)?;
            values.set(channel, v);
        }
        let mut derived = [None; 4];
        for (slot, column) in derived.iter_mut().zip(DerivedMetrics::COLUMNS) {
            *slot = row.try_get::<Option<f64>, _>(column).map_err(corrupt)?;
        }
        let synced: i64 = row.try_get("synced").map_err(corrupt)?;

        Ok(SensorRecord {
            id: Some(id),
            timestamp,
            values,
            derived: DerivedMetrics::from_array(derived),
            synced: synced != 0,
        })
    }

    async fn fetch_records(&self, sql: &str, binds: &[i64]) -> Result<Vec<SensorRecord>, StorageError> {
        let rows = retry("sql_read_records", &self.read_retry, || async {
            let mut query = sqlx::query(sql);
            for b in binds {
                query = query.bind(*b);
            }
            query.fetch_all(&self.pool).await
        })
        .await
        .map_err(backend)?;
        rows.iter().map(Self::record_from_row).collect()
    }
}

#[async_trait]
impl RecordStore for SqlStore {
    async fn insert(&self, record: &SensorRecord) -> Result<(), StorageError> {
        let columns = record_columns();
        let sql = format!(
            "INSERT INTO fo_sensor_data (timestamp, {}, synced) VALUES ({})",
            columns.join(", "),
            self.dialect.params(1, columns.len() + 2)
        );

        let mut query = sqlx::query(&sql).bind(record.timestamp);
        for (_, v) in record.values.iter() {
            query = query.bind(v);
        }
        for v in record.derived.as_array() {
            query = query.bind(v);
        }
        query = query.bind(i64::from(record.synced));

        query.execute(&self.pool).await.map_err(backend)?;
        debug!(timestamp = record.timestamp, "Inserted sensor record");
        Ok(())
    }

    async fn latest_at_or_before(&self, at: i64) -> Result<Option<SensorRecord>, StorageError> {
        let sql = format!(
            "{} WHERE timestamp <= {} ORDER BY timestamp DESC, id DESC LIMIT 1",
            self.select_records(),
            self.dialect.param(1)
        );
        Ok(self.fetch_records(&sql, &[at]).await?.into_iter().next())
    }

    async fn range(&self, from: i64, to: i64) -> Result<Vec<SensorRecord>, StorageError> {
        let sql = format!(
            "{} WHERE timestamp >= {} AND timestamp <= {} ORDER BY timestamp ASC, id ASC",
            self.select_records(),
            self.dialect.param(1),
            self.dialect.param(2)
        );
        self.fetch_records(&sql, &[from, to]).await
    }

    async fn unsynced(&self) -> Result<Vec<SensorRecord>, StorageError> {
        let sql = format!("{} WHERE synced = 0 ORDER BY id ASC", self.select_records());
        self.fetch_records(&sql, &[]).await
    }

    async fn mark_synced(&self, ids: &[i64]) -> Result<u64, StorageError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(backend)?;
        let mut changed = 0;
        for chunk in ids.chunks(MARK_CHUNK) {
            let sql = format!(
                "UPDATE fo_sensor_data SET synced = 1 WHERE synced = 0 AND id IN ({})",
                self.dialect.params(1, chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(*id);
            }
            changed += query.execute(&mut *tx).await.map_err(backend)?.rows_affected();
        }
        tx.commit().await.map_err(backend)?;

        debug!(requested = ids.len(), changed, "Marked records synced");
        Ok(changed)
    }

    async fn count(&self) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM fo_sensor_data")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        let n: i64 = row.try_get("n").map_err(backend)?;
        Ok(n.max(0) as u64)
    }
}

#[async_trait]
impl SettingsStore for SqlStore {
    async fn latest_setting(&self) -> Result<Option<ControlSetting>, StorageError> {
        let sql = format!("SELECT {} FROM fo_setting ORDER BY id DESC LIMIT 1", SETTING_COLUMNS.join(", "));
        let row = retry("sql_read_setting", &self.read_retry, || sqlx::query(&sql).fetch_optional(&self.pool))
            .await
            .map_err(backend)?;

        row.map(|row| {
            let get = |c: &str| row.try_get::<Option<f64>, _>(c).map_err(backend);
            Ok(ControlSetting {
                set_cstr_temp: get("set_cstr_temp")?,
                hyst_tds: get("hyst_tds")?,
                set_tds: get("set_tds")?,
                set_ec: get("set_ec")?,
                set_feed_level: get("set_feed_level")?,
            })
        })
        .transpose()
    }

    async fn save_setting(&self, setting: &ControlSetting) -> Result<(), StorageError> {
        let sql = format!(
            "INSERT INTO fo_setting (timestamp, {}) VALUES ({})",
            SETTING_COLUMNS.join(", "),
            self.dialect.params(1, SETTING_COLUMNS.len() + 1)
        );
        sqlx::query(&sql)
            .bind(crate::now_millis())
            .bind(setting.set_cstr_temp)
            .bind(setting.hyst_tds)
            .bind(setting.set_tds)
            .bind(setting.set_ec)
            .bind(setting.set_feed_level)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        info!(?setting, "Saved control settings");
        Ok(())
    }
}
