//! Pipeline stages for group formation
//!
//! Each stage lives in its own module and is a pure function over
//! pre-materialized data. Stages share the candidate plot table built by
//! stage 1 and refer to plots by their index in that table (the table is
//! sorted by plot id, so index order is id order).

pub mod s1_eligibility;
pub mod s2_proximity;
pub mod s3_variety;
pub mod s4_planting_window;
pub mod s5_area_constraints;
pub mod s6_supervisors;
pub mod s7_geometry;
pub mod s8_ungrouped;

pub use s1_eligibility::{filter_eligible, EligibilityOutcome, ExclusionStats};
pub use s2_proximity::{cluster_by_proximity, RawCluster};
pub use s3_variety::{partition_by_variety, VarietyBucket};
pub use s4_planting_window::{reconcile_planting_windows, WindowOutcome};
pub use s5_area_constraints::{resolve_group_sizes, RejectedCluster, RejectionCause, SizeOutcome, SizedGroup};
pub use s6_supervisors::{assign_supervisors, GroupDemand, SupervisorAssignment};
pub use s7_geometry::{aggregate_geometry, GroupGeometry};
pub use s8_ungrouped::{
    explain_ungrouped, CandidateKind, NearbyCandidate, UngroupedInput, UngroupedPlot, UngroupedReason,
};

use chrono::NaiveDate;
use geo::{MultiPolygon, Point};

use crate::geometry::mean_point;
use crate::types::{FarmerId, PlotId, VarietyId};
use crate::utils::median_date;

/// Eligible plot with parsed geometry and its cultivation selection
#[derive(Debug, Clone)]
pub struct CandidatePlot {
    pub id: PlotId,
    pub farmer_id: FarmerId,
    pub variety_id: VarietyId,
    pub planting_date: NaiveDate,
    /// Hectares
    pub area: f64,
    pub soil_type: Option<String>,
    pub boundary: Option<MultiPolygon<f64>>,
    /// Reported centroid, or the boundary centroid
    pub position: Option<Point<f64>>,
    /// No usable boundary; kept out of spatial clustering
    pub geometry_missing: bool,
}

impl CandidatePlot {
    /// Position used for spatial decisions; `None` for plots without geometry
    pub fn spatial_position(&self) -> Option<Point<f64>> {
        if self.geometry_missing {
            None
        } else {
            self.position
        }
    }
}

/// Where a date cohort came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CohortOrigin {
    /// Plots kept around the sub-cluster's median planting date
    Primary,
    /// Plots ejected as date outliers that formed their own cohort
    DateOutliers,
}

/// Variety-homogeneous, date-reconciled set of plots on its way to becoming a group
#[derive(Debug, Clone)]
pub struct SubCluster {
    /// Index of the raw proximity cluster the plots came from
    pub raw_cluster: usize,
    pub variety_id: VarietyId,
    /// Plot indices, ascending
    pub members: Vec<usize>,
    pub median_date: NaiveDate,
    pub origin: CohortOrigin,
}

impl SubCluster {
    pub fn new(
        raw_cluster: usize,
        variety_id: VarietyId,
        mut members: Vec<usize>,
        plots: &[CandidatePlot],
        origin: CohortOrigin,
    ) -> Option<Self> {
        members.sort_unstable();
        let median = median_date(members.iter().map(|&i| plots[i].planting_date))?;
        Some(Self {
            raw_cluster,
            variety_id,
            members,
            median_date: median,
            origin,
        })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn total_area(&self, plots: &[CandidatePlot]) -> f64 {
        self.members.iter().map(|&i| plots[i].area).sum()
    }

    /// Mean position of members that have geometry
    pub fn centroid(&self, plots: &[CandidatePlot]) -> Option<Point<f64>> {
        mean_point(self.members.iter().filter_map(|&i| plots[i].spatial_position()))
    }

    /// Absorb another sub-cluster and recompute the median once
    pub fn absorb(&mut self, other: SubCluster, plots: &[CandidatePlot]) {
        self.members.extend(other.members);
        self.members.sort_unstable();
        if other.origin == CohortOrigin::Primary {
            self.origin = CohortOrigin::Primary;
        }
        if let Some(median) = median_date(self.members.iter().map(|&i| plots[i].planting_date)) {
            self.median_date = median;
        }
    }

    pub fn plot_ids(&self, plots: &[CandidatePlot]) -> Vec<PlotId> {
        self.members.iter().map(|&i| plots[i].id).collect()
    }
}
