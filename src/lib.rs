//! CivicOps core crate.
//!
//! Current implemented scope:
//! - ticket intake: parsing, normalization and row rejection
//! - point-in-time feature engine: rolling volume, backlog, response statistics
//! - replace-in-full feature publication to SQLite, CSV ticket input
//! - single-ticket breach-risk scoring over HTTP

mod backlog;
mod config;
mod features;
mod interval_index;
mod observability;
mod response_stats;
mod rolling;
mod schema;
mod scoring;
mod store;
mod ticket;

pub use backlog::{category_backlog, global_backlog, sweep};
pub use config::{engine_config_from_env, FeatureEngineConfig, DEFAULT_SLA_HOURS};
pub use features::{
    calendar_fields, compute_features, offset_ratio, run_batch, CalendarFields,
    DerivedFeatureRecord, FeatureBatch, FeatureBatchReport, FeatureError, RollingVolume,
};
pub use interval_index::{CategoryPartition, Endpoint, EndpointKind, IntervalIndex};
pub use observability::{
    init_logging, log_app_bind, log_app_start, log_engine_config, logging_config_from_env,
    LogFormat, LoggingConfig, LoggingInitError,
};
pub use response_stats::{ResponseStats, ResponseTimeSource};
pub use rolling::{rolling_volumes, window_counts, RollingVolumes};
pub use schema::{
    assert_schema_compatible, build_feature_schema, rolling_column_name,
    volume_ratio_column_name, FeatureColumn, FeatureDType, FeatureSchema,
    FEATURE_SCHEMA_VERSION,
};
pub use scoring::{
    score_ticket, scoring_router, BreachRiskScorer, InMemoryScoringContext, RiskLevel,
    RuleBasedScorer, ScoringContext, ScoringContextSource, ScoringFeatures, ScoringRequest,
    TicketScore, HIGH_RISK_THRESHOLD, MEDIUM_RISK_THRESHOLD, SERVICE_NAME,
};
pub use store::{
    read_raw_tickets_csv, CsvTicketSource, FeatureSink, SqliteStore, StoreError, TicketSource,
    FEATURES_TABLE, SCHEMA_META_TABLE, TICKETS_TABLE,
};
pub use ticket::{
    normalize_category, normalize_status, parse_timestamp_ms, prepare_batch, DataQualityIssue,
    DataQualityWarning, PreparedBatch, RawTicket, RejectReason, RejectedRow, Ticket,
    UNKNOWN_LABEL,
};
