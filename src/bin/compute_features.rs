use std::path::PathBuf;

use civicops::{
    engine_config_from_env, init_logging, log_app_start, log_engine_config,
    logging_config_from_env, run_batch, CsvTicketSource, FeatureSink, SqliteStore,
    TicketSource, FEATURES_TABLE,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start("compute_features", &logging_cfg);

    let engine_cfg = engine_config_from_env();
    log_engine_config("compute_features", &engine_cfg);

    let store_path = std::env::var("CIVICOPS_STORE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/civicops.sqlite"));
    if let Some(parent) = store_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut store = SqliteStore::open(&store_path)?;

    // A CSV input refreshes the ticket table before the run.
    if let Ok(csv_path) = std::env::var("CIVICOPS_INPUT_CSV") {
        let rows = CsvTicketSource::new(csv_path).load_raw_tickets()?;
        store.replace_raw_tickets(&rows)?;
    }

    let raw = store.load_raw_tickets()?;
    let batch = run_batch(raw, &engine_cfg)?;
    let written = store.replace_features(&batch.schema, &batch.records)?;

    println!(
        "Saved features to {} | store={} rows={} rejected={} warnings={} categories={} fingerprint={}",
        FEATURES_TABLE,
        store_path.display(),
        written,
        batch.report.rejected_rows.len(),
        batch.report.warnings.len(),
        batch.report.categories,
        batch.schema.fingerprint
    );

    Ok(())
}
