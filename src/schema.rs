//! Ordered, fingerprinted column layout of the derived feature table.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::FeatureEngineConfig;
use crate::features::FeatureError;

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureDType {
    Text,
    Integer,
    Real,
}

impl FeatureDType {
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub dtype: FeatureDType,
    /// Computed from the whole batch rather than as of ticket creation.
    pub look_ahead: bool,
}

impl FeatureColumn {
    fn new(name: impl Into<String>, dtype: FeatureDType) -> Self {
        Self {
            name: name.into(),
            dtype,
            look_ahead: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<FeatureColumn>,
}

impl FeatureSchema {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }
}

pub fn rolling_column_name(window_days: u32) -> String {
    format!("rolling_{window_days}d_volume")
}

pub fn volume_ratio_column_name(short_days: u32, long_days: u32) -> String {
    format!("volume_ratio_{short_days}d_{long_days}d")
}

pub fn build_feature_schema(cfg: &FeatureEngineConfig) -> FeatureSchema {
    let mut columns = vec![
        FeatureColumn::new("id", FeatureDType::Text),
        FeatureColumn::new("category", FeatureDType::Text),
        FeatureColumn::new("status", FeatureDType::Text),
        FeatureColumn::new("created_ts_ms_utc", FeatureDType::Integer),
        FeatureColumn::new("closed_ts_ms_utc", FeatureDType::Integer),
        FeatureColumn::new("hour_of_day", FeatureDType::Integer),
        FeatureColumn::new("day_of_week", FeatureDType::Integer),
        FeatureColumn::new("month", FeatureDType::Integer),
        FeatureColumn::new("is_weekend", FeatureDType::Integer),
        FeatureColumn::new("is_business_hours", FeatureDType::Integer),
    ];

    for window in &cfg.window_days {
        columns.push(FeatureColumn::new(
            rolling_column_name(*window),
            FeatureDType::Integer,
        ));
    }

    columns.push(FeatureColumn::new(
        "backlog_at_creation",
        FeatureDType::Integer,
    ));
    columns.push(FeatureColumn::new("backlog_by_type", FeatureDType::Integer));
    columns.push(FeatureColumn {
        look_ahead: true,
        ..FeatureColumn::new("avg_response_time_by_type", FeatureDType::Real)
    });
    columns.push(FeatureColumn::new("backlog_ratio", FeatureDType::Real));
    let (short, long) = cfg.ratio_windows;
    columns.push(FeatureColumn::new(
        volume_ratio_column_name(short, long),
        FeatureDType::Real,
    ));

    let fingerprint = schema_fingerprint(cfg, &columns);

    info!(
        component = "features",
        event = "features.schema.built",
        version = cfg.schema_version,
        windows = ?cfg.window_days,
        column_count = columns.len(),
        fingerprint = fingerprint
    );

    FeatureSchema {
        version: cfg.schema_version,
        fingerprint,
        columns,
    }
}

pub fn assert_schema_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &FeatureSchema,
) -> Result<(), FeatureError> {
    if expected_version != actual.version {
        return Err(FeatureError::SchemaVersionMismatch {
            expected: expected_version,
            actual: actual.version,
        });
    }

    if expected_fingerprint != actual.fingerprint {
        return Err(FeatureError::SchemaFingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }

    Ok(())
}

fn schema_fingerprint(cfg: &FeatureEngineConfig, columns: &[FeatureColumn]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{};", cfg.schema_version));
    hasher.update(format!("calendar_tz:{};", cfg.calendar_tz.name()));
    hasher.update(format!(
        "business_hours:{}-{};",
        cfg.business_hours.start(),
        cfg.business_hours.end()
    ));
    hasher.update("windows:");
    for window in &cfg.window_days {
        hasher.update(format!("{window},"));
    }
    hasher.update(";columns:");
    for column in columns {
        hasher.update(column.name.as_bytes());
        hasher.update(format!(":{};", column.dtype.sql_type()));
    }
    hex::encode(hasher.finalize())
}
