//! Ticket intake: raw upstream rows into validated, normalized tickets.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const UNKNOWN_LABEL: &str = "Unknown";

const NAIVE_TS_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// A cleaned upstream row before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTicket {
    pub id: String,
    pub category: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<String>,
    pub closed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub category: String,
    pub status: String,
    pub created_ts_ms_utc: i64,
    pub closed_ts_ms_utc: Option<i64>,
}

impl Ticket {
    pub fn new(
        id: impl Into<String>,
        category: impl Into<String>,
        created_ts_ms_utc: i64,
        closed_ts_ms_utc: Option<i64>,
    ) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            status: UNKNOWN_LABEL.to_string(),
            created_ts_ms_utc,
            closed_ts_ms_utc,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    /// True when the ticket closed strictly before it was created.
    pub fn is_malformed(&self) -> bool {
        matches!(self.closed_ts_ms_utc, Some(closed) if closed < self.created_ts_ms_utc)
    }

    /// Closed duration in hours, `None` for open or malformed tickets.
    pub fn response_hours(&self) -> Option<f64> {
        let closed = self.closed_ts_ms_utc?;
        if closed < self.created_ts_ms_utc {
            return None;
        }
        Some((closed - self.created_ts_ms_utc) as f64 / 3_600_000.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    MissingCreatedAt,
    UnparseableCreatedAt,
    DuplicateId,
    MissingId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRow {
    pub id: String,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataQualityIssue {
    ClosedBeforeCreated,
    UnparseableClosedAt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQualityWarning {
    pub id: String,
    pub issue: DataQualityIssue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedBatch {
    pub tickets: Vec<Ticket>,
    pub rejected: Vec<RejectedRow>,
    pub warnings: Vec<DataQualityWarning>,
}

pub fn prepare_batch(raw: Vec<RawTicket>) -> PreparedBatch {
    let mut seen = HashSet::with_capacity(raw.len());
    let mut batch = PreparedBatch {
        tickets: Vec::with_capacity(raw.len()),
        ..PreparedBatch::default()
    };

    for row in raw {
        let id = row.id.trim().to_string();
        if id.is_empty() {
            reject(&mut batch, id, RejectReason::MissingId);
            continue;
        }

        let created_ts_ms_utc = match row.created_at.as_deref().map(str::trim) {
            None | Some("") => {
                reject(&mut batch, id, RejectReason::MissingCreatedAt);
                continue;
            }
            Some(raw_ts) => match parse_timestamp_ms(raw_ts) {
                Some(ts) => ts,
                None => {
                    reject(&mut batch, id, RejectReason::UnparseableCreatedAt);
                    continue;
                }
            },
        };

        if seen.contains(&id) {
            reject(&mut batch, id, RejectReason::DuplicateId);
            continue;
        }

        let closed_ts_ms_utc = match row.closed_at.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw_ts) => {
                let parsed = parse_timestamp_ms(raw_ts);
                if parsed.is_none() {
                    flag(&mut batch, &id, DataQualityIssue::UnparseableClosedAt);
                }
                parsed
            }
        };

        let ticket = Ticket {
            id: id.clone(),
            category: normalize_category(row.category.as_deref()),
            status: normalize_status(row.status.as_deref()),
            created_ts_ms_utc,
            closed_ts_ms_utc,
        };
        if ticket.is_malformed() {
            flag(&mut batch, &id, DataQualityIssue::ClosedBeforeCreated);
        }

        seen.insert(id);
        batch.tickets.push(ticket);
    }

    batch
}

/// Trims and title-cases each word; empty input maps to `Unknown`.
pub fn normalize_category(raw: Option<&str>) -> String {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return UNKNOWN_LABEL.to_string();
    }

    trimmed
        .split_whitespace()
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn normalize_status(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        None | Some("") => UNKNOWN_LABEL.to_string(),
        Some(status) => status.to_string(),
    }
}

/// Parses RFC 3339, naive date-times (read as UTC) or bare dates.
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    for format in NAIVE_TS_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}

fn title_case_word(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut at_word_start = true;
    for ch in word.chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

fn reject(batch: &mut PreparedBatch, id: String, reason: RejectReason) {
    warn!(
        component = "features",
        event = "features.intake.rejected",
        ticket_id = %id,
        reason = ?reason
    );
    batch.rejected.push(RejectedRow { id, reason });
}

fn flag(batch: &mut PreparedBatch, id: &str, issue: DataQualityIssue) {
    let event = match issue {
        DataQualityIssue::ClosedBeforeCreated => "features.intake.malformed_interval",
        DataQualityIssue::UnparseableClosedAt => "features.intake.unparseable_closed_at",
    };
    warn!(component = "features", event, ticket_id = %id);
    batch.warnings.push(DataQualityWarning {
        id: id.to_string(),
        issue,
    });
}
