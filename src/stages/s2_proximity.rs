//! STAGE 2: PROXIMITY CLUSTERING
//!
//! Builds an undirected adjacency graph over plots with geometry: two plots are
//! adjacent when their centroids are within `proximity_threshold` meters.
//! Connected components become raw clusters. Plots without geometry never join
//! a component and each forms a singleton cluster.
//!
//! Plots are indexed in id order and components are emitted ordered by their
//! smallest member, so the result does not depend on provider ordering.

use crate::geometry::PolygonOps;
use crate::stages::CandidatePlot;
use crate::utils::UnionFind;

/// Spatially connected set of plots (indices ascending)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCluster {
    pub members: Vec<usize>,
}

pub fn cluster_by_proximity(
    plots: &[CandidatePlot],
    proximity_threshold: f64,
    ops: &dyn PolygonOps,
) -> Vec<RawCluster> {
    let positioned: Vec<(usize, geo::Point<f64>)> = plots
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.spatial_position().map(|pos| (i, pos)))
        .collect();

    let mut uf = UnionFind::new(plots.len());
    let mut edges = 0usize;

    // Cluster sizes are village scale; the pairwise scan is cheap enough
    for (a, &(i, pi)) in positioned.iter().enumerate() {
        for &(j, pj) in &positioned[a + 1..] {
            if ops.distance_m(pi, pj) <= proximity_threshold {
                uf.union(i, j);
                edges += 1;
            }
        }
    }

    let clusters: Vec<RawCluster> = uf
        .components()
        .into_iter()
        .map(|members| RawCluster { members })
        .collect();

    tracing::debug!(
        "Proximity: {} positioned plots, {} edges, {} raw clusters (threshold {} m)",
        positioned.len(),
        edges,
        clusters.len(),
        proximity_threshold
    );

    clusters
}
