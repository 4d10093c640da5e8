//! Single-ticket breach-risk scoring primitives and HTTP routes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::config::DEFAULT_SLA_HOURS;
use crate::features::FeatureBatch;
use crate::response_stats::ResponseTimeSource;
use crate::ticket::{normalize_category, normalize_status, UNKNOWN_LABEL};

pub const SERVICE_NAME: &str = "CivicOps-311 SLA Risk API";
pub const HIGH_RISK_THRESHOLD: f64 = 0.7;
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_probability(probability: f64) -> Self {
        if probability >= HIGH_RISK_THRESHOLD {
            RiskLevel::High
        } else if probability >= MEDIUM_RISK_THRESHOLD {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRequest {
    pub request_type: String,
    pub status: String,
    pub rolling_7d_volume: u32,
    pub backlog_at_creation: u32,
}

/// What the classifier sees after unknown values have been resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringFeatures {
    pub category: String,
    pub category_known: bool,
    pub status: String,
    pub rolling_7d_volume: u32,
    pub backlog_at_creation: u32,
    pub avg_response_time_by_type: f64,
    pub response_time_source: ResponseTimeSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketScore {
    pub ticket_id: String,
    pub sla_breach_probability: f64,
    pub risk_level: RiskLevel,
    pub top_factors: Vec<String>,
}

/// Opaque breach classifier.
pub trait BreachRiskScorer: Send + Sync + 'static {
    fn probability(&self, features: &ScoringFeatures) -> f64;
}

/// Backlog and volume step rules, capped below certainty.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedScorer;

impl BreachRiskScorer for RuleBasedScorer {
    fn probability(&self, features: &ScoringFeatures) -> f64 {
        let mut probability: f64 = 0.3;

        if features.backlog_at_creation > 100 {
            probability += 0.3;
        } else if features.backlog_at_creation > 50 {
            probability += 0.2;
        }

        if features.rolling_7d_volume > 10 {
            probability += 0.2;
        } else if features.rolling_7d_volume > 5 {
            probability += 0.1;
        }

        probability.min(0.95)
    }
}

/// Batch-derived lookups used to resolve a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringContext {
    pub avg_response_by_category: BTreeMap<String, f64>,
    pub fallback_response_hours: f64,
    pub fallback_source: ResponseTimeSource,
    pub known_statuses: BTreeSet<String>,
}

impl Default for ScoringContext {
    fn default() -> Self {
        Self {
            avg_response_by_category: BTreeMap::new(),
            fallback_response_hours: DEFAULT_SLA_HOURS,
            fallback_source: ResponseTimeSource::SlaDefault,
            known_statuses: BTreeSet::new(),
        }
    }
}

impl ScoringContext {
    pub fn from_batch(batch: &FeatureBatch) -> Self {
        Self {
            avg_response_by_category: batch.response_stats.by_category.clone(),
            fallback_response_hours: batch.response_stats.fallback_hours,
            fallback_source: batch.response_stats.fallback_source,
            known_statuses: batch
                .records
                .iter()
                .map(|record| record.status.clone())
                .collect(),
        }
    }

    pub fn resolve(&self, request: &ScoringRequest) -> ScoringFeatures {
        let category = normalize_category(Some(&request.request_type));
        let status = normalize_status(Some(&request.status));
        let status = if self.known_statuses.contains(&status) {
            status
        } else {
            UNKNOWN_LABEL.to_string()
        };

        let (category_known, avg_response_time_by_type, response_time_source) =
            match self.avg_response_by_category.get(&category) {
                Some(hours) => (true, *hours, ResponseTimeSource::Category),
                None => (false, self.fallback_response_hours, self.fallback_source),
            };

        ScoringFeatures {
            category,
            category_known,
            status,
            rolling_7d_volume: request.rolling_7d_volume,
            backlog_at_creation: request.backlog_at_creation,
            avg_response_time_by_type,
            response_time_source,
        }
    }
}

pub trait ScoringContextSource: Send + Sync + 'static {
    fn context(&self) -> ScoringContext;
}

#[derive(Clone, Default)]
pub struct InMemoryScoringContext {
    inner: Arc<RwLock<ScoringContext>>,
}

impl InMemoryScoringContext {
    pub fn new(context: ScoringContext) -> Self {
        Self {
            inner: Arc::new(RwLock::new(context)),
        }
    }

    pub fn replace_context(&self, context: ScoringContext) {
        let mut guard = self
            .inner
            .write()
            .expect("scoring context lock should not be poisoned");
        *guard = context;
    }
}

impl ScoringContextSource for InMemoryScoringContext {
    fn context(&self) -> ScoringContext {
        self.inner
            .read()
            .expect("scoring context lock should not be poisoned")
            .clone()
    }
}

pub fn score_ticket(
    request: &ScoringRequest,
    scorer: &dyn BreachRiskScorer,
    context: &ScoringContext,
    now: DateTime<Utc>,
) -> TicketScore {
    let features = context.resolve(request);
    let probability = clamp_probability(scorer.probability(&features));
    let rounded = (probability * 1_000.0).round() / 1_000.0;

    let response_note = match features.response_time_source {
        ResponseTimeSource::Category => "",
        ResponseTimeSource::BatchMean => " (batch fallback)",
        ResponseTimeSource::SlaDefault => " (SLA default)",
    };

    TicketScore {
        ticket_id: format!("TICKET_{}", now.format("%Y%m%d_%H%M%S")),
        sla_breach_probability: rounded,
        risk_level: RiskLevel::from_probability(probability),
        top_factors: vec![
            format!("Backlog: {} tickets", features.backlog_at_creation),
            format!("Rolling volume: {} tickets", features.rolling_7d_volume),
            format!("Request type: {}", features.category),
            format!(
                "Avg response for type: {:.1} hours{response_note}",
                features.avg_response_time_by_type
            ),
        ],
    }
}

fn clamp_probability(raw: f64) -> f64 {
    if raw.is_finite() {
        raw.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn scoring_router(
    scorer: Arc<dyn BreachRiskScorer>,
    context: Arc<dyn ScoringContextSource>,
) -> Router {
    Router::new()
        .route("/", get(get_welcome))
        .route("/welcome", get(get_welcome))
        .route("/apicheck", get(get_apicheck))
        .route("/score_ticket", post(post_score_ticket))
        .with_state(ScoringAppState { scorer, context })
}

#[derive(Clone)]
struct ScoringAppState {
    scorer: Arc<dyn BreachRiskScorer>,
    context: Arc<dyn ScoringContextSource>,
}

async fn get_welcome() -> impl IntoResponse {
    Json(json!({
        "message": "CivicOps 311 SLA Risk API",
        "status": "running",
    }))
}

async fn get_apicheck(State(state): State<ScoringAppState>) -> impl IntoResponse {
    let context = state.context.context();
    Json(json!({
        "status": "working",
        "model_loaded": true,
        "service": SERVICE_NAME,
        "known_categories": context.avg_response_by_category.len(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn post_score_ticket(
    State(state): State<ScoringAppState>,
    Json(request): Json<ScoringRequest>,
) -> impl IntoResponse {
    let context = state.context.context();
    let score = score_ticket(&request, state.scorer.as_ref(), &context, Utc::now());

    info!(
        component = "scoring",
        event = "http.score.request",
        request_type = %request.request_type,
        probability = score.sla_breach_probability,
        risk_level = ?score.risk_level
    );

    Json(score)
}
