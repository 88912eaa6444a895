//! STAGE 8: UNGROUPED PLOT EXPLANATIONS
//!
//! Every eligible plot that did not land in a group gets exactly one reason,
//! first match wins:
//!
//! 1. `NoGeometry`: the plot has no usable boundary
//! 2. `VarietyIncompatible`: no other plot of its variety exists
//! 3. `DateMismatch`: ejected from a planting window and no retry placed it
//! 4. `TooFarFromAnyGroup`: every formed group is beyond the proximity threshold
//! 5. `CapacityExhausted`: compatible, but the size bounds could not take it
//!
//! Each plot also lists its nearest candidates (formed groups and the other
//! ungrouped sub-clusters) with distance, planting-date gap and what keeps it
//! from joining them.

use std::fmt;

use chrono::NaiveDate;
use geo::Point;
use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::geometry::PolygonOps;
use crate::params::GroupingParams;
use crate::stages::{CandidatePlot, RejectedCluster, SizedGroup, SubCluster};
use crate::types::{FarmerId, PlotId, VarietyId};
use crate::utils::day_gap;

const MAX_CANDIDATES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum UngroupedReason {
    NoGeometry,
    VarietyIncompatible,
    DateMismatch,
    TooFarFromAnyGroup,
    CapacityExhausted,
}

impl UngroupedReason {
    pub const ALL: [UngroupedReason; 5] = [
        UngroupedReason::NoGeometry,
        UngroupedReason::VarietyIncompatible,
        UngroupedReason::DateMismatch,
        UngroupedReason::TooFarFromAnyGroup,
        UngroupedReason::CapacityExhausted,
    ];

    pub fn description(&self) -> &'static str {
        match self {
            UngroupedReason::NoGeometry => "Plot has no boundary polygon",
            UngroupedReason::VarietyIncompatible => "No other plots of this rice variety in the cluster",
            UngroupedReason::DateMismatch => "Planting date outside every group's planting window",
            UngroupedReason::TooFarFromAnyGroup => "Too far from any formed group",
            UngroupedReason::CapacityExhausted => "Group size bounds could not accommodate this plot",
        }
    }
}

impl fmt::Display for UngroupedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            UngroupedReason::NoGeometry => "NoGeometry",
            UngroupedReason::VarietyIncompatible => "VarietyIncompatible",
            UngroupedReason::DateMismatch => "DateMismatch",
            UngroupedReason::TooFarFromAnyGroup => "TooFarFromAnyGroup",
            UngroupedReason::CapacityExhausted => "CapacityExhausted",
        };
        f.write_str(code)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CandidateKind {
    /// 1-based number of a formed group
    FormedGroup { group_number: usize },
    /// Another ungrouped sub-cluster, identified by its first plot
    UngroupedCluster { anchor_plot_id: PlotId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NearbyCandidate {
    pub kind: CandidateKind,
    pub variety_id: VarietyId,
    /// `None` when either side has no position
    pub distance_m: Option<f64>,
    pub date_gap_days: i64,
    pub same_variety: bool,
    /// What prevents joining; `None` when compatible
    pub incompatibility: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UngroupedPlot {
    /// Index into the candidate plot table
    pub plot: usize,
    pub plot_id: PlotId,
    pub farmer_id: FarmerId,
    pub variety_id: VarietyId,
    pub planting_date: NaiveDate,
    pub area: f64,
    pub reason: UngroupedReason,
    pub detail: String,
    pub candidates: Vec<NearbyCandidate>,
}

impl UngroupedPlot {
    pub fn nearest(&self) -> Option<&NearbyCandidate> {
        self.candidates.first()
    }
}

/// Everything stage 8 looks at
pub struct UngroupedInput<'a> {
    pub plots: &'a [CandidatePlot],
    pub groups: &'a [SizedGroup],
    /// Centroid per formed group, same order as `groups`
    pub group_centroids: &'a [Option<Point<f64>>],
    pub rejected: &'a [RejectedCluster],
    /// Window outliers that no retry placed
    pub unplaced_outliers: &'a FxHashSet<usize>,
    pub params: &'a GroupingParams,
}

pub fn explain_ungrouped(input: &UngroupedInput<'_>, ops: &dyn PolygonOps) -> Vec<UngroupedPlot> {
    let mut out = Vec::new();

    for (r, rejected) in input.rejected.iter().enumerate() {
        for &i in &rejected.sub.members {
            let plot = &input.plots[i];
            let (reason, detail) = classify(input, r, i, ops);
            out.push(UngroupedPlot {
                plot: i,
                plot_id: plot.id,
                farmer_id: plot.farmer_id,
                variety_id: plot.variety_id,
                planting_date: plot.planting_date,
                area: plot.area,
                reason,
                detail,
                candidates: nearby_candidates(input, r, i, ops),
            });
        }
    }

    out.sort_by_key(|u| u.plot);

    if !out.is_empty() {
        tracing::debug!("{} ungrouped plots explained", out.len());
    }
    out
}

fn classify(input: &UngroupedInput<'_>, own: usize, i: usize, ops: &dyn PolygonOps) -> (UngroupedReason, String) {
    let plot = &input.plots[i];
    let params = input.params;

    if plot.geometry_missing {
        return (
            UngroupedReason::NoGeometry,
            "Plot has no usable boundary polygon and no compatible group could take it".to_string(),
        );
    }

    let has_sibling = input.rejected[own].sub.len() > 1
        || input.groups.iter().any(|g| g.sub.variety_id == plot.variety_id)
        || input
            .rejected
            .iter()
            .enumerate()
            .any(|(r, c)| r != own && c.sub.variety_id == plot.variety_id);
    if !has_sibling {
        return (
            UngroupedReason::VarietyIncompatible,
            "No other plot in the cluster grows this rice variety".to_string(),
        );
    }

    if input.unplaced_outliers.contains(&i) {
        return (
            UngroupedReason::DateMismatch,
            format!(
                "Planting date {} is more than {} days from every group's median",
                plot.planting_date, params.planting_date_tolerance
            ),
        );
    }

    if !input.groups.is_empty() {
        let nearest = input
            .group_centroids
            .iter()
            .map(|c| distance(plot.spatial_position(), *c, ops))
            .fold(f64::INFINITY, f64::min);
        if nearest > params.proximity_threshold {
            let detail = if nearest.is_finite() {
                format!(
                    "Nearest group is {:.0} m away (threshold {:.0} m)",
                    nearest, params.proximity_threshold
                )
            } else {
                "No formed group has a known position".to_string()
            };
            return (UngroupedReason::TooFarFromAnyGroup, detail);
        }
    }

    (
        UngroupedReason::CapacityExhausted,
        format!(
            "Could not be placed in a group of {}-{} plots and {}-{} ha",
            params.min_plots_per_group, params.max_plots_per_group, params.min_group_area, params.max_group_area
        ),
    )
}

fn distance(a: Option<Point<f64>>, b: Option<Point<f64>>, ops: &dyn PolygonOps) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => ops.distance_m(a, b),
        _ => f64::INFINITY,
    }
}

fn nearby_candidates(input: &UngroupedInput<'_>, own: usize, i: usize, ops: &dyn PolygonOps) -> Vec<NearbyCandidate> {
    let plot = &input.plots[i];
    let position = plot.spatial_position();
    let params = input.params;

    // (candidate, sort key: distance, gap, kind rank, ordinal)
    let mut ranked: Vec<(NearbyCandidate, (f64, i64, usize, usize))> = Vec::new();

    for (g, group) in input.groups.iter().enumerate() {
        let centroid = input.group_centroids.get(g).copied().flatten();
        let full = group.sub.len() >= params.max_plots_per_group
            || group.sub.total_area(input.plots) + plot.area > params.max_group_area;
        let candidate = candidate_for(
            plot,
            position,
            &group.sub,
            centroid,
            CandidateKind::FormedGroup { group_number: g + 1 },
            full,
            params,
            ops,
        );
        let key = (candidate.distance_m.unwrap_or(f64::INFINITY), candidate.date_gap_days, 0, g);
        ranked.push((candidate, key));
    }

    for (r, rejected) in input.rejected.iter().enumerate() {
        if r == own {
            continue;
        }
        let Some(&anchor) = rejected.sub.members.first() else {
            continue;
        };
        let candidate = candidate_for(
            plot,
            position,
            &rejected.sub,
            rejected.sub.centroid(input.plots),
            CandidateKind::UngroupedCluster {
                anchor_plot_id: input.plots[anchor].id,
            },
            false,
            params,
            ops,
        );
        let key = (candidate.distance_m.unwrap_or(f64::INFINITY), candidate.date_gap_days, 1, r);
        ranked.push((candidate, key));
    }

    ranked.sort_by(|a, b| {
        a.1 .0
            .total_cmp(&b.1 .0)
            .then(a.1 .1.cmp(&b.1 .1))
            .then(a.1 .2.cmp(&b.1 .2))
            .then(a.1 .3.cmp(&b.1 .3))
    });
    ranked.truncate(MAX_CANDIDATES);
    ranked.into_iter().map(|(c, _)| c).collect()
}

#[allow(clippy::too_many_arguments)]
fn candidate_for(
    plot: &CandidatePlot,
    position: Option<Point<f64>>,
    target: &SubCluster,
    target_centroid: Option<Point<f64>>,
    kind: CandidateKind,
    full: bool,
    params: &GroupingParams,
    ops: &dyn PolygonOps,
) -> NearbyCandidate {
    let distance_m = match (position, target_centroid) {
        (Some(a), Some(b)) => Some(ops.distance_m(a, b)),
        _ => None,
    };
    let date_gap_days = day_gap(plot.planting_date, target.median_date);
    let same_variety = plot.variety_id == target.variety_id;

    let incompatibility = if !same_variety {
        Some("Different rice variety".to_string())
    } else if date_gap_days > params.planting_date_tolerance {
        Some(format!("Planting date differs by {} days", date_gap_days))
    } else if distance_m.is_some_and(|d| d > params.proximity_threshold) {
        Some(format!(
            "{:.0} m away (threshold {:.0} m)",
            distance_m.unwrap_or_default(),
            params.proximity_threshold
        ))
    } else if full {
        Some("Group is at capacity".to_string())
    } else {
        None
    };

    NearbyCandidate {
        kind,
        variety_id: target.variety_id,
        distance_m,
        date_gap_days,
        same_variety,
        incompatibility,
    }
}
