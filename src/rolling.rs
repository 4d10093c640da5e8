//! Same-category trailing-window volume via two-pointer passes.

use rayon::prelude::*;

use crate::config::FeatureEngineConfig;
use crate::interval_index::{CategoryPartition, IntervalIndex};

/// `counts[ticket][k]` is the volume for the k-th configured window.
pub type RollingVolumes = Vec<Vec<u32>>;

pub fn rolling_volumes(index: &IntervalIndex<'_>, window_days: &[u32]) -> RollingVolumes {
    let tickets = index.tickets();
    let partitions: Vec<&CategoryPartition<'_>> = index.partitions().collect();

    let per_partition: Vec<Vec<(usize, Vec<u32>)>> = partitions
        .par_iter()
        .map(|partition| {
            let created: Vec<i64> = partition
                .by_created
                .iter()
                .map(|pos| tickets[*pos].created_ts_ms_utc)
                .collect();
            let per_window: Vec<Vec<u32>> = window_days
                .iter()
                .map(|days| window_counts(&created, FeatureEngineConfig::window_ms(*days)))
                .collect();

            partition
                .by_created
                .iter()
                .enumerate()
                .map(|(rank, pos)| {
                    let counts = per_window.iter().map(|counts| counts[rank]).collect();
                    (*pos, counts)
                })
                .collect()
        })
        .collect();

    let mut volumes = vec![Vec::new(); tickets.len()];
    for (pos, counts) in per_partition.into_iter().flatten() {
        volumes[pos] = counts;
    }
    volumes
}

/// Counts, for each entry of an ascending `created` slice, the entries in
/// `(created[i] - window_ms, created[i]]`.
pub fn window_counts(created: &[i64], window_ms: i64) -> Vec<u32> {
    let mut counts = Vec::with_capacity(created.len());
    let mut trail = 0;
    let mut lead = 0;

    for &current in created {
        let window_start = current.saturating_sub(window_ms);
        while lead < created.len() && created[lead] <= current {
            lead += 1;
        }
        while trail < lead && created[trail] <= window_start {
            trail += 1;
        }
        counts.push((lead - trail) as u32);
    }

    counts
}
