//! Sorted orderings over a ticket batch for sweep-line and two-pointer passes.
//!
//! Tickets are referenced by their position in the batch slice, so the index
//! never copies or mutates ticket data.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::ticket::Ticket;

/// Close sorts before Start at an identical instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EndpointKind {
    Close,
    Start,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub ts_ms_utc: i64,
    pub kind: EndpointKind,
    pub ticket: usize,
    /// Whether this ticket ever holds an open interval. Tickets closed at or
    /// before their creation instant can never be backlog for anyone.
    pub opens_interval: bool,
}

#[derive(Debug, Clone)]
pub struct CategoryPartition<'a> {
    pub category: &'a str,
    /// Ticket positions sorted by `(created_ts_ms_utc, id)`.
    pub by_created: Vec<usize>,
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone)]
pub struct IntervalIndex<'a> {
    tickets: &'a [Ticket],
    global_endpoints: Vec<Endpoint>,
    partitions: BTreeMap<&'a str, CategoryPartition<'a>>,
}

impl<'a> IntervalIndex<'a> {
    pub fn build(tickets: &'a [Ticket]) -> Self {
        let mut order: Vec<usize> = (0..tickets.len()).collect();
        order.sort_by(|a, b| created_order(&tickets[*a], &tickets[*b]));

        let mut partitions: BTreeMap<&'a str, CategoryPartition<'a>> = BTreeMap::new();
        for &pos in &order {
            let category = tickets[pos].category.as_str();
            partitions
                .entry(category)
                .or_insert_with(|| CategoryPartition {
                    category,
                    by_created: Vec::new(),
                    endpoints: Vec::new(),
                })
                .by_created
                .push(pos);
        }

        for partition in partitions.values_mut() {
            partition.endpoints = endpoints_for(tickets, &partition.by_created);
        }
        let global_endpoints = endpoints_for(tickets, &order);

        Self {
            tickets,
            global_endpoints,
            partitions,
        }
    }

    pub fn tickets(&self) -> &'a [Ticket] {
        self.tickets
    }

    pub fn global_endpoints(&self) -> &[Endpoint] {
        &self.global_endpoints
    }

    pub fn partitions(&self) -> impl Iterator<Item = &CategoryPartition<'a>> {
        self.partitions.values()
    }

    pub fn partition(&self, category: &str) -> Option<&CategoryPartition<'a>> {
        self.partitions.get(category)
    }

    pub fn category_count(&self) -> usize {
        self.partitions.len()
    }
}

fn created_order(a: &Ticket, b: &Ticket) -> Ordering {
    a.created_ts_ms_utc
        .cmp(&b.created_ts_ms_utc)
        .then_with(|| a.id.cmp(&b.id))
}

fn endpoints_for(tickets: &[Ticket], sorted_positions: &[usize]) -> Vec<Endpoint> {
    let mut endpoints = Vec::with_capacity(sorted_positions.len() * 2);
    for &pos in sorted_positions {
        let ticket = &tickets[pos];
        let closes_later = ticket
            .closed_ts_ms_utc
            .map(|closed| closed > ticket.created_ts_ms_utc);
        let opens_interval = closes_later.unwrap_or(true);

        endpoints.push(Endpoint {
            ts_ms_utc: ticket.created_ts_ms_utc,
            kind: EndpointKind::Start,
            ticket: pos,
            opens_interval,
        });
        if let (Some(true), Some(closed)) = (closes_later, ticket.closed_ts_ms_utc) {
            endpoints.push(Endpoint {
                ts_ms_utc: closed,
                kind: EndpointKind::Close,
                ticket: pos,
                opens_interval,
            });
        }
    }

    endpoints.sort_by(|a, b| {
        a.ts_ms_utc
            .cmp(&b.ts_ms_utc)
            .then(a.kind.cmp(&b.kind))
            .then_with(|| created_order(&tickets[a.ticket], &tickets[b.ticket]))
    });
    endpoints
}
