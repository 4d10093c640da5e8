//! Open-ticket counts at each ticket's creation instant via a sweep line.

use rayon::prelude::*;

use crate::interval_index::{Endpoint, EndpointKind, IntervalIndex};

/// Backlog across every category, indexed by ticket position.
pub fn global_backlog(index: &IntervalIndex<'_>) -> Vec<u32> {
    let mut backlog = vec![0; index.tickets().len()];
    for (pos, open) in sweep(index.global_endpoints()) {
        backlog[pos] = open;
    }
    backlog
}

/// Backlog restricted to each ticket's own category, indexed by ticket position.
pub fn category_backlog(index: &IntervalIndex<'_>) -> Vec<u32> {
    let partitions: Vec<_> = index.partitions().collect();
    let swept: Vec<Vec<(usize, u32)>> = partitions
        .par_iter()
        .map(|partition| sweep(&partition.endpoints))
        .collect();

    let mut backlog = vec![0; index.tickets().len()];
    for (pos, open) in swept.into_iter().flatten() {
        backlog[pos] = open;
    }
    backlog
}

/// Walks time-ordered endpoints one instant at a time. Within an instant,
/// closes apply first, then every start reads the open count, then the
/// starts that hold an interval are added. Tickets created at the same
/// instant therefore never count each other.
pub fn sweep(endpoints: &[Endpoint]) -> Vec<(usize, u32)> {
    let mut out = Vec::with_capacity(endpoints.len());
    let mut open: u32 = 0;
    let mut group_start = 0;

    while group_start < endpoints.len() {
        let ts_ms_utc = endpoints[group_start].ts_ms_utc;
        let group_end = endpoints[group_start..]
            .iter()
            .position(|endpoint| endpoint.ts_ms_utc != ts_ms_utc)
            .map_or(endpoints.len(), |offset| group_start + offset);
        let group = &endpoints[group_start..group_end];

        let closing = group
            .iter()
            .filter(|endpoint| endpoint.kind == EndpointKind::Close)
            .count() as u32;
        open -= closing;

        let mut opening = 0;
        for endpoint in group.iter().filter(|e| e.kind == EndpointKind::Start) {
            out.push((endpoint.ticket, open));
            if endpoint.opens_interval {
                opening += 1;
            }
        }
        open += opening;

        group_start = group_end;
    }

    out
}
