use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use civicops::{
    engine_config_from_env, init_logging, log_app_bind, log_app_start, logging_config_from_env,
    run_batch, scoring_router, InMemoryScoringContext, RuleBasedScorer, ScoringContext,
    SqliteStore, TicketSource,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start("score_server", &logging_cfg);

    let addr: SocketAddr = std::env::var("CIVICOPS_API_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8000".to_string())
        .parse()?;

    let context = Arc::new(InMemoryScoringContext::new(context_from_env()?));
    let app = scoring_router(Arc::new(RuleBasedScorer), context);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Historical lookups come from the ticket store when one is configured.
fn context_from_env() -> Result<ScoringContext, Box<dyn std::error::Error>> {
    let Ok(raw_path) = std::env::var("CIVICOPS_STORE_PATH") else {
        return Ok(ScoringContext::default());
    };

    let store = SqliteStore::open(&PathBuf::from(raw_path))?;
    let batch = run_batch(store.load_raw_tickets()?, &engine_config_from_env())?;
    Ok(ScoringContext::from_batch(&batch))
}
