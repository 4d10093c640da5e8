//! Point-in-time feature composition for a closed batch of tickets.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::backlog::{category_backlog, global_backlog};
use crate::config::FeatureEngineConfig;
use crate::interval_index::IntervalIndex;
use crate::response_stats::{ResponseStats, ResponseTimeSource};
use crate::rolling::{rolling_volumes, RollingVolumes};
use crate::schema::{build_feature_schema, FeatureSchema};
use crate::ticket::{prepare_batch, DataQualityWarning, RawTicket, RejectedRow, Ticket};

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("invalid feature engine config: {0}")]
    InvalidConfig(String),
    #[error("timestamp {ts_ms_utc} of ticket {id} is outside the supported calendar range")]
    InvalidTimestamp { id: String, ts_ms_utc: i64 },
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    SchemaFingerprintMismatch { expected: String, actual: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarFields {
    pub hour_of_day: u32,
    /// 0 = Monday, 6 = Sunday.
    pub day_of_week: u32,
    pub month: u32,
    pub is_weekend: bool,
    pub is_business_hours: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingVolume {
    pub window_days: u32,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedFeatureRecord {
    pub id: String,
    pub category: String,
    pub status: String,
    pub created_ts_ms_utc: i64,
    pub closed_ts_ms_utc: Option<i64>,
    pub calendar: CalendarFields,
    pub rolling_volumes: Vec<RollingVolume>,
    pub backlog_at_creation: u32,
    pub backlog_by_type: u32,
    pub avg_response_time_by_type: f64,
    pub response_time_source: ResponseTimeSource,
    pub backlog_ratio: f64,
    pub volume_ratio: f64,
}

impl DerivedFeatureRecord {
    pub fn rolling_volume(&self, window_days: u32) -> Option<u32> {
        self.rolling_volumes
            .iter()
            .find(|volume| volume.window_days == window_days)
            .map(|volume| volume.count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBatchReport {
    pub input_rows: u64,
    pub output_records: u64,
    pub categories: u64,
    pub rejected_rows: Vec<RejectedRow>,
    pub warnings: Vec<DataQualityWarning>,
    pub closed_tickets: u64,
    pub excluded_from_stats: u64,
    pub response_fallback_hours: f64,
    pub response_fallback_source: ResponseTimeSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBatch {
    pub schema: FeatureSchema,
    /// Ordered by ticket id.
    pub records: Vec<DerivedFeatureRecord>,
    pub response_stats: ResponseStats,
    pub report: FeatureBatchReport,
}

/// Intake plus feature computation. Rejected rows and data-quality warnings
/// from intake are carried into the batch report.
pub fn run_batch(
    raw: Vec<RawTicket>,
    cfg: &FeatureEngineConfig,
) -> Result<FeatureBatch, FeatureError> {
    cfg.validate()?;

    let input_rows = raw.len() as u64;
    let prepared = prepare_batch(raw);
    let mut batch = compute_features(&prepared.tickets, cfg)?;

    batch.report.input_rows = input_rows;
    batch.report.rejected_rows = prepared.rejected;
    batch.report.warnings = prepared.warnings;

    if !batch.report.rejected_rows.is_empty() {
        warn!(
            component = "features",
            event = "features.intake.summary",
            rejected_rows = batch.report.rejected_rows.len(),
            warnings = batch.report.warnings.len()
        );
    }

    Ok(batch)
}

/// Computes one record per ticket. The batch is treated as complete and
/// immutable; nothing is retained between calls.
pub fn compute_features(
    tickets: &[Ticket],
    cfg: &FeatureEngineConfig,
) -> Result<FeatureBatch, FeatureError> {
    cfg.validate()?;

    info!(
        component = "features",
        event = "features.batch.start",
        tickets = tickets.len(),
        windows = ?cfg.window_days,
        calendar_tz = cfg.calendar_tz.name()
    );

    let schema = build_feature_schema(cfg);
    let index = IntervalIndex::build(tickets);

    let mut volumes: RollingVolumes = Vec::new();
    let mut global: Vec<u32> = Vec::new();
    let mut by_type: Vec<u32> = Vec::new();
    let mut stats: Option<ResponseStats> = None;

    rayon::scope(|s| {
        s.spawn(|_| volumes = rolling_volumes(&index, &cfg.window_days));
        s.spawn(|_| global = global_backlog(&index));
        s.spawn(|_| by_type = category_backlog(&index));
        s.spawn(|_| stats = Some(ResponseStats::compute(tickets, cfg.sla_hours)));
    });
    let stats = stats.unwrap_or_else(|| ResponseStats::compute(tickets, cfg.sla_hours));

    info!(
        component = "features",
        event = "features.stats.look_ahead",
        categories_with_history = stats.by_category.len(),
        fallback_hours = stats.fallback_hours,
        fallback_source = ?stats.fallback_source
    );

    let (short, long) = cfg.ratio_windows;
    let short_idx = window_position(cfg, short)?;
    let long_idx = window_position(cfg, long)?;

    let mut records = Vec::with_capacity(tickets.len());
    for (pos, ticket) in tickets.iter().enumerate() {
        let counts = &volumes[pos];
        let backlog_at_creation = global[pos];
        let backlog_by_type = by_type[pos];
        let (avg_response_time_by_type, response_time_source) =
            stats.for_category(&ticket.category);

        records.push(DerivedFeatureRecord {
            id: ticket.id.clone(),
            category: ticket.category.clone(),
            status: ticket.status.clone(),
            created_ts_ms_utc: ticket.created_ts_ms_utc,
            closed_ts_ms_utc: ticket.closed_ts_ms_utc,
            calendar: calendar_fields(ticket, cfg)?,
            rolling_volumes: cfg
                .window_days
                .iter()
                .zip(counts)
                .map(|(window_days, count)| RollingVolume {
                    window_days: *window_days,
                    count: *count,
                })
                .collect(),
            backlog_at_creation,
            backlog_by_type,
            avg_response_time_by_type,
            response_time_source,
            backlog_ratio: offset_ratio(backlog_by_type, backlog_at_creation),
            volume_ratio: offset_ratio(counts[short_idx], counts[long_idx]),
        });
    }
    records.sort_by(|a, b| a.id.cmp(&b.id));

    let report = FeatureBatchReport {
        input_rows: tickets.len() as u64,
        output_records: records.len() as u64,
        categories: index.category_count() as u64,
        rejected_rows: Vec::new(),
        warnings: Vec::new(),
        closed_tickets: stats.closed_tickets as u64,
        excluded_from_stats: stats.excluded_malformed as u64,
        response_fallback_hours: stats.fallback_hours,
        response_fallback_source: stats.fallback_source,
    };

    if report.excluded_from_stats > 0 {
        warn!(
            component = "features",
            event = "features.stats.malformed_excluded",
            excluded = report.excluded_from_stats
        );
    }

    info!(
        component = "features",
        event = "features.batch.finish",
        output_records = report.output_records,
        categories = report.categories,
        closed_tickets = report.closed_tickets
    );

    Ok(FeatureBatch {
        schema,
        records,
        response_stats: stats,
        report,
    })
}

pub fn calendar_fields(
    ticket: &Ticket,
    cfg: &FeatureEngineConfig,
) -> Result<CalendarFields, FeatureError> {
    let utc: DateTime<Utc> = Utc
        .timestamp_millis_opt(ticket.created_ts_ms_utc)
        .single()
        .ok_or_else(|| FeatureError::InvalidTimestamp {
            id: ticket.id.clone(),
            ts_ms_utc: ticket.created_ts_ms_utc,
        })?;
    let local = utc.with_timezone(&cfg.calendar_tz);
    let hour_of_day = local.hour();
    let day_of_week = local.weekday().num_days_from_monday();

    Ok(CalendarFields {
        hour_of_day,
        day_of_week,
        month: local.month(),
        is_weekend: day_of_week >= 5,
        is_business_hours: cfg.business_hours.contains(&hour_of_day),
    })
}

/// `numerator / (denominator + 1)`; never divides by zero.
pub fn offset_ratio(numerator: u32, denominator: u32) -> f64 {
    f64::from(numerator) / (f64::from(denominator) + 1.0)
}

fn window_position(cfg: &FeatureEngineConfig, window_days: u32) -> Result<usize, FeatureError> {
    cfg.window_days
        .iter()
        .position(|w| *w == window_days)
        .ok_or_else(|| {
            FeatureError::InvalidConfig(format!("ratio window {window_days}d is not configured"))
        })
}
