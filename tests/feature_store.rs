use std::fs;

use civicops::{
    run_batch, CsvTicketSource, FeatureColumn, FeatureDType, FeatureEngineConfig, FeatureSink,
    SqliteStore, StoreError, TicketSource, FEATURES_TABLE, FEATURE_SCHEMA_VERSION,
};
use tempfile::tempdir;

const TICKETS_CSV: &str = "\
service_request_id,request_type,status,created_date,closed_date
r1,potholes,Closed,2025-01-01T08:00:00.000,2025-01-02T08:00:00.000
r2,Potholes,Open,2025-01-01T10:00:00.000,
r3,noise,Closed,2025-01-04 12:30:00,2025-01-04 14:30:00
r4,Noise,Open,,
r5,,Open,2025-01-05T09:00:00Z,
";

#[test]
fn csv_batch_is_published_with_schema_meta() {
    let dir = tempdir().expect("tempdir");
    let csv_path = dir.path().join("tickets.csv");
    fs::write(&csv_path, TICKETS_CSV).expect("write csv");

    let mut store = SqliteStore::open(&dir.path().join("civicops.sqlite")).expect("store");
    let rows = CsvTicketSource::new(&csv_path)
        .load_raw_tickets()
        .expect("csv rows");
    assert_eq!(rows.len(), 5);
    store.replace_raw_tickets(&rows).expect("ticket table");

    let batch = run_batch(
        store.load_raw_tickets().expect("reload"),
        &FeatureEngineConfig::default(),
    )
    .expect("batch");
    assert_eq!(batch.report.rejected_rows.len(), 1);

    let written = store
        .replace_features(&batch.schema, &batch.records)
        .expect("publish");
    assert_eq!(written, 4);
    assert_eq!(store.feature_row_count().expect("count"), 4);
    assert_eq!(
        store.read_schema_meta().expect("meta"),
        Some((FEATURE_SCHEMA_VERSION, batch.schema.fingerprint.clone()))
    );

    let (category, backlog, avg): (String, i64, f64) = store
        .connection()
        .query_row(
            &format!(
                "SELECT category, backlog_at_creation, avg_response_time_by_type \
                 FROM {FEATURES_TABLE} WHERE id = 'r2'"
            ),
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .expect("r2 row");
    assert_eq!(category, "Potholes");
    assert_eq!(backlog, 1);
    assert_eq!(avg, 24.0);

    let unknown: String = store
        .connection()
        .query_row(
            &format!("SELECT category FROM {FEATURES_TABLE} WHERE id = 'r5'"),
            [],
            |row| row.get(0),
        )
        .expect("r5 row");
    assert_eq!(unknown, "Unknown");
}

#[test]
fn republishing_replaces_previous_table_in_full() {
    let mut store = SqliteStore::open_in_memory().expect("store");
    let rows = civicops::read_raw_tickets_csv(TICKETS_CSV.as_bytes()).expect("csv");

    let first = run_batch(rows.clone(), &FeatureEngineConfig::default()).expect("first");
    store
        .replace_features(&first.schema, &first.records)
        .expect("first publish");

    let wider_cfg = FeatureEngineConfig {
        window_days: vec![3, 7, 14, 30],
        ..FeatureEngineConfig::default()
    };
    let second = run_batch(rows[..2].to_vec(), &wider_cfg).expect("second");
    store
        .replace_features(&second.schema, &second.records)
        .expect("second publish");

    assert_eq!(store.feature_row_count().expect("count"), 2);
    assert_eq!(
        store.read_schema_meta().expect("meta").map(|(_, fp)| fp),
        Some(second.schema.fingerprint.clone())
    );
    assert_ne!(first.schema.fingerprint, second.schema.fingerprint);

    let has_30d: i64 = store
        .connection()
        .query_row(
            &format!("SELECT COUNT(*) FROM pragma_table_info('{FEATURES_TABLE}') WHERE name = 'rolling_30d_volume'"),
            [],
            |row| row.get(0),
        )
        .expect("pragma");
    assert_eq!(has_30d, 1);
}

#[test]
fn failed_publish_leaves_previous_table_intact() {
    let mut store = SqliteStore::open_in_memory().expect("store");
    let rows = civicops::read_raw_tickets_csv(TICKETS_CSV.as_bytes()).expect("csv");
    let batch = run_batch(rows, &FeatureEngineConfig::default()).expect("batch");
    store
        .replace_features(&batch.schema, &batch.records)
        .expect("publish");

    let mut broken = batch.schema.clone();
    broken.columns.push(FeatureColumn {
        name: "not_a_feature".to_string(),
        dtype: FeatureDType::Integer,
        look_ahead: false,
    });
    broken.fingerprint = "broken".to_string();

    let err = store
        .replace_features(&broken, &batch.records)
        .expect_err("unmapped column must abort the publish");
    assert!(matches!(err, StoreError::UnmappedColumn(ref name) if name == "not_a_feature"));

    assert_eq!(store.feature_row_count().expect("count"), 4);
    assert_eq!(
        store.read_schema_meta().expect("meta"),
        Some((FEATURE_SCHEMA_VERSION, batch.schema.fingerprint.clone()))
    );
}

#[test]
fn missing_csv_file_surfaces_io_error() {
    let dir = tempdir().expect("tempdir");
    let err = CsvTicketSource::new(dir.path().join("absent.csv"))
        .load_raw_tickets()
        .expect_err("file does not exist");
    assert!(matches!(err, StoreError::Io(_)));
}
