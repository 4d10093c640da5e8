//! Per-category mean response time over the whole batch.
//!
//! These averages use closures that may happen after a ticket was opened, so
//! they leak future information into earlier tickets' features.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ticket::Ticket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseTimeSource {
    Category,
    BatchMean,
    SlaDefault,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseStats {
    pub by_category: BTreeMap<String, f64>,
    /// Used for categories without closed history.
    pub fallback_hours: f64,
    pub fallback_source: ResponseTimeSource,
    pub closed_tickets: usize,
    pub excluded_malformed: usize,
}

impl ResponseStats {
    pub fn compute(tickets: &[Ticket], sla_hours: f64) -> Self {
        let mut durations: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        let mut ticket_counts: BTreeMap<&str, u64> = BTreeMap::new();
        let mut closed_tickets = 0;
        let mut excluded_malformed = 0;

        for ticket in tickets {
            *ticket_counts.entry(ticket.category.as_str()).or_insert(0) += 1;
            if ticket.is_malformed() {
                excluded_malformed += 1;
                continue;
            }
            if let Some(hours) = ticket.response_hours() {
                durations
                    .entry(ticket.category.as_str())
                    .or_default()
                    .push(hours);
                closed_tickets += 1;
            }
        }

        // Sums run over sorted values so input order never changes the bits.
        let by_category: BTreeMap<String, f64> = durations
            .into_iter()
            .map(|(category, mut hours)| {
                hours.sort_by(f64::total_cmp);
                let mean = hours.iter().sum::<f64>() / hours.len() as f64;
                (category.to_string(), mean)
            })
            .collect();

        // Ticket-weighted mean of the category means, over tickets whose
        // category has closed history.
        let (weighted_sum, weighted_count) = by_category
            .iter()
            .map(|(category, mean)| {
                let count = ticket_counts
                    .get(category.as_str())
                    .copied()
                    .unwrap_or_default();
                (mean * count as f64, count)
            })
            .fold((0.0, 0_u64), |(sum, total), (part, count)| {
                (sum + part, total + count)
            });

        let (fallback_hours, fallback_source) = if weighted_count > 0 {
            (
                weighted_sum / weighted_count as f64,
                ResponseTimeSource::BatchMean,
            )
        } else {
            (sla_hours, ResponseTimeSource::SlaDefault)
        };

        Self {
            by_category,
            fallback_hours,
            fallback_source,
            closed_tickets,
            excluded_malformed,
        }
    }

    pub fn for_category(&self, category: &str) -> (f64, ResponseTimeSource) {
        match self.by_category.get(category) {
            Some(hours) => (*hours, ResponseTimeSource::Category),
            None => (self.fallback_hours, self.fallback_source),
        }
    }
}
