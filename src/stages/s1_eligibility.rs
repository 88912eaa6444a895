//! STAGE 1: PLOT ELIGIBILITY
//!
//! Selects the plots that take part in group formation for a
//! (cluster, season, year). A plot is silently excluded (it is not reported as
//! ungrouped) when its farmer is inactive, its status is not Active, it has no
//! confirmed cultivation selection, it is already grouped for the season, or it
//! belongs to another cluster.
//!
//! Plots whose boundary is absent or unreadable stay eligible with
//! `geometry_missing` set; they are kept out of spatial clustering only.

use geo::Point;
use serde::Serialize;

use crate::error::GeometryError;
use crate::geometry::{parse_boundary, PolygonOps};
use crate::stages::CandidatePlot;
use crate::types::{ClusterId, PlotId, PlotRecord, PlotStatus};

/// Why plots were left out before grouping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionStats {
    pub farmer_inactive: usize,
    pub status_not_active: usize,
    pub no_confirmed_selection: usize,
    pub already_grouped: usize,
    pub other_cluster: usize,
    pub invalid_area: usize,
}

impl ExclusionStats {
    pub fn total(&self) -> usize {
        self.farmer_inactive
            + self.status_not_active
            + self.no_confirmed_selection
            + self.already_grouped
            + self.other_cluster
            + self.invalid_area
    }
}

#[derive(Debug, Clone)]
pub struct EligibilityOutcome {
    /// Sorted by plot id
    pub plots: Vec<CandidatePlot>,
    pub excluded: ExclusionStats,
    /// Boundaries that failed to parse (plots kept, flagged geometry-missing)
    pub geometry_errors: Vec<(PlotId, GeometryError)>,
}

/// Filter provider records down to eligible candidate plots
pub fn filter_eligible(
    records: Vec<PlotRecord>,
    cluster_id: ClusterId,
    ops: &dyn PolygonOps,
) -> EligibilityOutcome {
    let mut excluded = ExclusionStats::default();
    let mut geometry_errors = Vec::new();
    let mut plots = Vec::with_capacity(records.len());

    for record in records {
        if record.cluster_id != cluster_id {
            excluded.other_cluster += 1;
            continue;
        }
        if !record.farmer_active {
            excluded.farmer_inactive += 1;
            continue;
        }
        if record.status != PlotStatus::Active {
            excluded.status_not_active += 1;
            continue;
        }
        if record.grouped_this_season {
            excluded.already_grouped += 1;
            continue;
        }
        let Some(selection) = record.selection.filter(|s| s.confirmed) else {
            excluded.no_confirmed_selection += 1;
            continue;
        };
        if !record.area.is_finite() || record.area < 0.0 {
            excluded.invalid_area += 1;
            continue;
        }

        let boundary = match record.boundary_wkt.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(wkt) => match parse_boundary(wkt) {
                Ok(shape) => Some(shape),
                Err(e) => {
                    tracing::warn!("Plot {} boundary unreadable, treating as missing: {}", record.id, e);
                    geometry_errors.push((record.id, e));
                    None
                }
            },
        };

        let reported: Option<Point<f64>> = record.centroid.map(|c| c.to_point());
        let position = reported.or_else(|| boundary.as_ref().and_then(|b| ops.centroid(b)));

        plots.push(CandidatePlot {
            id: record.id,
            farmer_id: record.farmer_id,
            variety_id: selection.rice_variety_id,
            planting_date: selection.planting_date,
            area: record.area,
            soil_type: record.soil_type,
            geometry_missing: boundary.is_none(),
            boundary,
            position,
        });
    }

    // Determinism: downstream stages walk plots in id order
    plots.sort_by_key(|p| p.id);
    plots.dedup_by_key(|p| p.id);

    tracing::debug!(
        "Eligibility: {} eligible, {} excluded ({:?}), {} unreadable boundaries",
        plots.len(),
        excluded.total(),
        excluded,
        geometry_errors.len()
    );

    EligibilityOutcome {
        plots,
        excluded,
        geometry_errors,
    }
}
