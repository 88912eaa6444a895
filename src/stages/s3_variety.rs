//! STAGE 3: VARIETY PARTITIONING
//!
//! Splits each raw cluster into rice-variety-homogeneous buckets. Within a raw
//! cluster, buckets are ordered by member count (descending) then variety id
//! (ascending); this order drives group numbering downstream.

use rustc_hash::FxHashMap;

use crate::stages::{CandidatePlot, RawCluster};
use crate::types::VarietyId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarietyBucket {
    pub raw_cluster: usize,
    pub variety_id: VarietyId,
    /// Plot indices, ascending
    pub members: Vec<usize>,
}

pub fn partition_by_variety(raw_clusters: &[RawCluster], plots: &[CandidatePlot]) -> Vec<VarietyBucket> {
    let mut buckets = Vec::new();

    for (raw_idx, cluster) in raw_clusters.iter().enumerate() {
        let mut by_variety: FxHashMap<VarietyId, Vec<usize>> = FxHashMap::default();
        for &i in &cluster.members {
            by_variety.entry(plots[i].variety_id).or_default().push(i);
        }

        let mut local: Vec<VarietyBucket> = by_variety
            .into_iter()
            .map(|(variety_id, mut members)| {
                members.sort_unstable();
                VarietyBucket {
                    raw_cluster: raw_idx,
                    variety_id,
                    members,
                }
            })
            .collect();

        local.sort_by(|a, b| {
            b.members
                .len()
                .cmp(&a.members.len())
                .then_with(|| a.variety_id.cmp(&b.variety_id))
        });
        buckets.extend(local);
    }

    buckets
}
