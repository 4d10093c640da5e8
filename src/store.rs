//! Ticket sources and the replace-in-full feature table sink.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use thiserror::Error;
use tracing::{debug, info};

use crate::features::DerivedFeatureRecord;
use crate::schema::{rolling_column_name, FeatureSchema};
use crate::ticket::RawTicket;

pub const TICKETS_TABLE: &str = "fact_requests";
pub const FEATURES_TABLE: &str = "fact_requests_features";
pub const SCHEMA_META_TABLE: &str = "feature_schema_meta";

const ID_HEADERS: [&str; 2] = ["id", "service_request_id"];
const CATEGORY_HEADERS: [&str; 2] = ["request_type", "category"];
const STATUS_HEADERS: [&str; 1] = ["status"];
const CREATED_HEADERS: [&str; 2] = ["created", "created_date"];
const CLOSED_HEADERS: [&str; 2] = ["closed", "closed_date"];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("input has no {column} column")]
    MissingColumn { column: &'static str },
    #[error("feature column {0} has no value mapping")]
    UnmappedColumn(String),
}

/// Supplies the raw rows of one batch.
pub trait TicketSource {
    fn load_raw_tickets(&self) -> Result<Vec<RawTicket>, StoreError>;
}

/// Publishes a complete feature table, replacing whatever was there.
pub trait FeatureSink {
    fn replace_features(
        &mut self,
        schema: &FeatureSchema,
        records: &[DerivedFeatureRecord],
    ) -> Result<usize, StoreError>;
}

#[derive(Debug, Clone)]
pub struct CsvTicketSource {
    path: PathBuf,
}

impl CsvTicketSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TicketSource for CsvTicketSource {
    fn load_raw_tickets(&self) -> Result<Vec<RawTicket>, StoreError> {
        let file = File::open(&self.path)?;
        let rows = read_raw_tickets_csv(file)?;
        info!(
            component = "store",
            event = "store.tickets.loaded",
            source = "csv",
            path = %self.path.display(),
            rows = rows.len()
        );
        Ok(rows)
    }
}

pub fn read_raw_tickets_csv(input: impl Read) -> Result<Vec<RawTicket>, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let headers = reader.headers()?.clone();
    let id_idx = header_index(&headers, &ID_HEADERS).ok_or(StoreError::MissingColumn {
        column: "id",
    })?;
    let created_idx = header_index(&headers, &CREATED_HEADERS).ok_or(StoreError::MissingColumn {
        column: "created",
    })?;
    let category_idx = header_index(&headers, &CATEGORY_HEADERS);
    let status_idx = header_index(&headers, &STATUS_HEADERS);
    let closed_idx = header_index(&headers, &CLOSED_HEADERS);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(RawTicket {
            id: record.get(id_idx).unwrap_or_default().to_string(),
            category: optional_field(&record, category_idx),
            status: optional_field(&record, status_idx),
            created_at: optional_field(&record, Some(created_idx)),
            closed_at: optional_field(&record, closed_idx),
        });
    }

    Ok(rows)
}

fn header_index(headers: &StringRecord, aliases: &[&str]) -> Option<usize> {
    headers.iter().position(|header| {
        let header = header.trim();
        aliases.iter().any(|alias| header.eq_ignore_ascii_case(alias))
    })
}

fn optional_field(record: &StringRecord, idx: Option<usize>) -> Option<String> {
    let raw = record.get(idx?)?.trim();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

/// SQLite-backed ticket table and feature table.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Replaces the ticket table with `rows`.
    pub fn replace_raw_tickets(&mut self, rows: &[RawTicket]) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "
            DROP TABLE IF EXISTS {TICKETS_TABLE};
            CREATE TABLE {TICKETS_TABLE} (
                id TEXT,
                request_type TEXT,
                status TEXT,
                created TEXT,
                closed TEXT
            );
            "
        ))?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {TICKETS_TABLE} (id, request_type, status, created, closed)
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            ))?;
            for row in rows {
                stmt.execute(params![
                    row.id,
                    row.category,
                    row.status,
                    row.created_at,
                    row.closed_at
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// Version and fingerprint of the last published feature table.
    pub fn read_schema_meta(&self) -> Result<Option<(u32, String)>, StoreError> {
        let exists: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![SCHEMA_META_TABLE],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(None);
        }

        let meta = self
            .conn
            .query_row(
                &format!("SELECT version, fingerprint FROM {SCHEMA_META_TABLE} LIMIT 1"),
                [],
                |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(meta)
    }

    pub fn feature_row_count(&self) -> Result<u64, StoreError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {FEATURES_TABLE}"),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl TicketSource for SqliteStore {
    fn load_raw_tickets(&self) -> Result<Vec<RawTicket>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, request_type, status, created, closed FROM {TICKETS_TABLE} ORDER BY rowid"
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RawTicket {
                    id: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    category: row.get(1)?,
                    status: row.get(2)?,
                    created_at: row.get(3)?,
                    closed_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            component = "store",
            event = "store.tickets.loaded",
            source = "sqlite",
            rows = rows.len()
        );
        Ok(rows)
    }
}

impl FeatureSink for SqliteStore {
    fn replace_features(
        &mut self,
        schema: &FeatureSchema,
        records: &[DerivedFeatureRecord],
    ) -> Result<usize, StoreError> {
        let column_defs = schema
            .columns
            .iter()
            .map(|column| format!("{} {}", column.name, column.dtype.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");
        let column_names = schema
            .columns
            .iter()
            .map(|column| column.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=schema.columns.len())
            .map(|idx| format!("?{idx}"))
            .collect::<Vec<_>>()
            .join(", ");

        // Dropping the transaction without commit rolls everything back, so
        // readers see either the previous table or the complete new one.
        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "
            DROP TABLE IF EXISTS {FEATURES_TABLE};
            CREATE TABLE {FEATURES_TABLE} ({column_defs});
            DROP TABLE IF EXISTS {SCHEMA_META_TABLE};
            CREATE TABLE {SCHEMA_META_TABLE} (version INTEGER NOT NULL, fingerprint TEXT NOT NULL);
            "
        ))?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {FEATURES_TABLE} ({column_names}) VALUES ({placeholders})"
            ))?;
            for record in records {
                let values = schema
                    .columns
                    .iter()
                    .map(|column| column_value(record, &column.name))
                    .collect::<Result<Vec<_>, _>>()?;
                stmt.execute(params_from_iter(values))?;
            }
            debug!(
                component = "store",
                event = "store.features.inserted",
                rows = records.len()
            );
        }
        tx.execute(
            &format!("INSERT INTO {SCHEMA_META_TABLE} (version, fingerprint) VALUES (?1, ?2)"),
            params![schema.version, schema.fingerprint],
        )?;
        tx.commit()?;

        info!(
            component = "store",
            event = "store.features.replaced",
            table = FEATURES_TABLE,
            rows = records.len(),
            fingerprint = %schema.fingerprint
        );
        Ok(records.len())
    }
}

fn column_value(record: &DerivedFeatureRecord, column: &str) -> Result<Value, StoreError> {
    let value = match column {
        "id" => Value::Text(record.id.clone()),
        "category" => Value::Text(record.category.clone()),
        "status" => Value::Text(record.status.clone()),
        "created_ts_ms_utc" => Value::Integer(record.created_ts_ms_utc),
        "closed_ts_ms_utc" => record.closed_ts_ms_utc.map_or(Value::Null, Value::Integer),
        "hour_of_day" => Value::Integer(i64::from(record.calendar.hour_of_day)),
        "day_of_week" => Value::Integer(i64::from(record.calendar.day_of_week)),
        "month" => Value::Integer(i64::from(record.calendar.month)),
        "is_weekend" => Value::Integer(i64::from(record.calendar.is_weekend)),
        "is_business_hours" => Value::Integer(i64::from(record.calendar.is_business_hours)),
        "backlog_at_creation" => Value::Integer(i64::from(record.backlog_at_creation)),
        "backlog_by_type" => Value::Integer(i64::from(record.backlog_by_type)),
        "avg_response_time_by_type" => Value::Real(record.avg_response_time_by_type),
        "backlog_ratio" => Value::Real(record.backlog_ratio),
        other if other.starts_with("volume_ratio_") => Value::Real(record.volume_ratio),
        other => {
            let volume = record
                .rolling_volumes
                .iter()
                .find(|volume| rolling_column_name(volume.window_days) == other)
                .ok_or_else(|| StoreError::UnmappedColumn(other.to_string()))?;
            Value::Integer(i64::from(volume.count))
        }
    };
    Ok(value)
}
