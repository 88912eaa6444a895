//! STAGE 5: GROUP SIZE CONSTRAINTS
//!
//! Brings every reconciled sub-cluster within
//! `[min_plots_per_group, max_plots_per_group]` and
//! `[min_group_area, max_group_area]`:
//!
//! 1. **Split** oversized sub-clusters with a greedy largest-first bin fill.
//!    Plots are sorted by descending area; each bin is seeded with the largest
//!    remaining plot and filled with the plot nearest to the bin's running
//!    centroid that still fits. Bins are capped at an even share of the plots
//!    (`ceil(n / k)` for the minimum bin count `k`) so the split does not leave a
//!    runt tail bin.
//! 2. **Merge** undersized sub-clusters into the nearest compatible sibling:
//!    same variety, overlapping planting windows (medians at most
//!    2 × tolerance apart), combined size within the maximum bounds. Siblings
//!    share a raw proximity cluster, except that plots without geometry can
//!    join anywhere and `ForceMerge` ignores distance altogether.
//! 3. **Classify** what is left: in-bounds sub-clusters become groups;
//!    out-of-bounds ones become exception groups or are rejected, depending on
//!    `UndersizedPolicy` and on whether they are date-outlier cohorts.

use geo::Point;

use crate::geometry::{mean_point, PolygonOps};
use crate::params::{GroupingParams, UndersizedPolicy};
use crate::stages::{CandidatePlot, CohortOrigin, SubCluster};
use crate::utils::day_gap;

pub const BELOW_MINIMUM_REASON: &str = "Below minimum threshold";
pub const EXCEEDS_MAXIMUM_REASON: &str = "Exceeds maximum group area";

/// Sub-cluster accepted as a group (possibly an exception group)
#[derive(Debug, Clone)]
pub struct SizedGroup {
    pub sub: SubCluster,
    pub exception_reason: Option<String>,
}

impl SizedGroup {
    pub fn is_exception(&self) -> bool {
        self.exception_reason.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionCause {
    BelowMinimum,
    ExceedsMaximum,
}

/// Sub-cluster whose plots end up ungrouped
#[derive(Debug, Clone)]
pub struct RejectedCluster {
    pub sub: SubCluster,
    pub cause: RejectionCause,
}

#[derive(Debug, Clone)]
pub struct SizeOutcome {
    pub groups: Vec<SizedGroup>,
    pub rejected: Vec<RejectedCluster>,
    pub splits: usize,
    pub merges: usize,
}

pub fn resolve_group_sizes(
    sub_clusters: Vec<SubCluster>,
    plots: &[CandidatePlot],
    params: &GroupingParams,
    ops: &dyn PolygonOps,
) -> SizeOutcome {
    let mut working = Vec::with_capacity(sub_clusters.len());
    let mut splits = 0usize;
    for sub in sub_clusters {
        let bins = split_oversized(sub, plots, params, ops);
        if bins.len() > 1 {
            splits += 1;
        }
        working.extend(bins);
    }

    let merges = merge_undersized(&mut working, plots, params, ops);

    let mut groups = Vec::new();
    let mut rejected = Vec::new();
    let leave_ungrouped = params.undersized_policy == UndersizedPolicy::LeaveUngrouped;

    for sub in working {
        if exceeds_max(&sub, plots, params) {
            if leave_ungrouped {
                rejected.push(RejectedCluster { sub, cause: RejectionCause::ExceedsMaximum });
            } else {
                groups.push(SizedGroup { sub, exception_reason: Some(EXCEEDS_MAXIMUM_REASON.to_string()) });
            }
        } else if below_min(&sub, plots, params) {
            if leave_ungrouped || sub.origin == CohortOrigin::DateOutliers {
                rejected.push(RejectedCluster { sub, cause: RejectionCause::BelowMinimum });
            } else {
                groups.push(SizedGroup { sub, exception_reason: Some(BELOW_MINIMUM_REASON.to_string()) });
            }
        } else {
            groups.push(SizedGroup { sub, exception_reason: None });
        }
    }

    tracing::debug!(
        "Size constraints: {} splits, {} merges -> {} groups ({} exception), {} rejected sub-clusters",
        splits,
        merges,
        groups.len(),
        groups.iter().filter(|g| g.is_exception()).count(),
        rejected.len()
    );

    SizeOutcome { groups, rejected, splits, merges }
}

fn exceeds_max(sub: &SubCluster, plots: &[CandidatePlot], params: &GroupingParams) -> bool {
    sub.len() > params.max_plots_per_group || sub.total_area(plots) > params.max_group_area
}

fn below_min(sub: &SubCluster, plots: &[CandidatePlot], params: &GroupingParams) -> bool {
    sub.len() < params.min_plots_per_group || sub.total_area(plots) < params.min_group_area
}

fn distance_or_inf(a: Option<Point<f64>>, b: Option<Point<f64>>, ops: &dyn PolygonOps) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => ops.distance_m(a, b),
        _ => f64::INFINITY,
    }
}

/// Greedy largest-first bin fill; returns the input unchanged when within bounds
fn split_oversized(
    sub: SubCluster,
    plots: &[CandidatePlot],
    params: &GroupingParams,
    ops: &dyn PolygonOps,
) -> Vec<SubCluster> {
    if !exceeds_max(&sub, plots, params) {
        return vec![sub];
    }

    let n = sub.len();
    let total_area = sub.total_area(plots);
    let by_count = n.div_ceil(params.max_plots_per_group);
    let by_area = if params.max_group_area > 0.0 {
        (total_area / params.max_group_area).ceil() as usize
    } else {
        n
    };
    // Never more bins than plots; `by_area` saturates for tiny area caps
    let bin_count = by_count.max(by_area).min(n).max(1);
    let plot_cap = n.div_ceil(bin_count).clamp(1, params.max_plots_per_group);

    let mut remaining = sub.members.clone();
    remaining.sort_by(|&a, &b| plots[b].area.total_cmp(&plots[a].area).then(a.cmp(&b)));

    let mut bins = Vec::with_capacity(bin_count);
    while !remaining.is_empty() {
        let seed = remaining.remove(0);
        let mut bin = vec![seed];
        let mut area = plots[seed].area;
        let mut positions: Vec<Point<f64>> = plots[seed].spatial_position().into_iter().collect();

        while bin.len() < plot_cap {
            let centroid = mean_point(positions.iter().copied());
            let pick = remaining
                .iter()
                .enumerate()
                .filter(|&(_, &i)| area + plots[i].area <= params.max_group_area)
                .map(|(slot, &i)| (slot, distance_or_inf(centroid, plots[i].spatial_position(), ops)))
                .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

            let Some((slot, _)) = pick else { break };
            let i = remaining.remove(slot);
            area += plots[i].area;
            positions.extend(plots[i].spatial_position());
            bin.push(i);
        }

        if let Some(part) = SubCluster::new(sub.raw_cluster, sub.variety_id, bin, plots, sub.origin) {
            bins.push(part);
        }
    }

    tracing::debug!(
        "Split sub-cluster of {} plots ({:.2} ha) into {} bins",
        n,
        total_area,
        bins.len()
    );
    bins
}

/// Merge undersized sub-clusters one at a time until no merge is possible
fn merge_undersized(
    working: &mut Vec<SubCluster>,
    plots: &[CandidatePlot],
    params: &GroupingParams,
    ops: &dyn PolygonOps,
) -> usize {
    let mut merges = 0usize;

    loop {
        let mut order: Vec<usize> = (0..working.len())
            .filter(|&i| below_min(&working[i], plots, params))
            .collect();
        // Smallest first, deterministic
        order.sort_by(|&a, &b| {
            working[a]
                .len()
                .cmp(&working[b].len())
                .then(working[a].total_area(plots).total_cmp(&working[b].total_area(plots)))
                .then(working[a].members.cmp(&working[b].members))
        });

        let found = order
            .iter()
            .find_map(|&src| best_merge_target(working, src, plots, params, ops).map(|dst| (src, dst)));

        let Some((src, dst)) = found else { break };
        let source = working.remove(src);
        let dst = if dst > src { dst - 1 } else { dst };
        working[dst].absorb(source, plots);
        merges += 1;
    }

    merges
}

/// Nearest compatible sibling for `working[src]`, ranked by distance, date gap, position
fn best_merge_target(
    working: &[SubCluster],
    src: usize,
    plots: &[CandidatePlot],
    params: &GroupingParams,
    ops: &dyn PolygonOps,
) -> Option<usize> {
    let source = &working[src];
    let source_area = source.total_area(plots);
    let source_centroid = source.centroid(plots);
    let window_overlap = 2 * params.planting_date_tolerance;
    let force = params.undersized_policy == UndersizedPolicy::ForceMerge;

    working
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != src)
        .filter(|(_, t)| t.variety_id == source.variety_id)
        .filter(|(_, t)| day_gap(t.median_date, source.median_date) <= window_overlap)
        .filter(|(_, t)| t.len() + source.len() <= params.max_plots_per_group)
        .filter(|(_, t)| t.total_area(plots) + source_area <= params.max_group_area)
        .filter_map(|(j, t)| {
            let target_centroid = t.centroid(plots);
            let sibling = force
                || t.raw_cluster == source.raw_cluster
                || source_centroid.is_none()
                || target_centroid.is_none();
            sibling.then(|| {
                (
                    j,
                    distance_or_inf(source_centroid, target_centroid, ops),
                    day_gap(t.median_date, source.median_date),
                )
            })
        })
        .min_by(|a, b| a.1.total_cmp(&b.1).then(a.2.cmp(&b.2)).then(a.0.cmp(&b.0)))
        .map(|(j, _, _)| j)
}
