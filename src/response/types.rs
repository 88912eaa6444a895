//! Response DTOs
//!
//! Wire shapes for preview, commit and ungrouped-plot reports. All fields are
//! camelCase; boundaries are GeoJSON in previews and WKT in commit results.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::engine::Warning;
use crate::params::GroupingParams;
use crate::stages::{ExclusionStats, UngroupedReason};
use crate::types::{ClusterId, FarmerId, GroupId, GroupStatus, LonLat, PlotId, SeasonId, SupervisorId, VarietyId};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewGroupsResponse {
    pub cluster_id: ClusterId,
    pub season_id: SeasonId,
    pub year: i32,
    pub parameters: GroupingParams,
    pub summary: PreviewSummary,
    pub groups: Vec<CandidateGroupDto>,
    pub ungrouped_plots: Vec<UngroupedPlotDto>,
    pub warnings: Vec<Warning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSummary {
    pub eligible_plots: usize,
    pub grouped_plots: usize,
    pub ungrouped_plots: usize,
    pub groups_formed: usize,
    pub exception_groups: usize,
    pub supervisors_needed: usize,
    pub supervisors_available: usize,
    pub excluded_plots: ExclusionStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateGroupDto {
    pub group_number: usize,
    pub rice_variety_id: VarietyId,
    pub supervisor_id: Option<SupervisorId>,
    pub planting_window_start: NaiveDate,
    pub planting_window_end: NaiveDate,
    pub median_planting_date: NaiveDate,
    pub plot_count: usize,
    pub farmer_count: u32,
    pub total_area: f64,
    pub centroid: Option<LonLat>,
    /// GeoJSON polygon
    pub boundary: Option<Value>,
    pub boundary_is_hull: bool,
    pub is_exception: bool,
    pub exception_reason: Option<String>,
    pub plots: Vec<GroupPlotDto>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPlotDto {
    pub plot_id: PlotId,
    pub farmer_id: FarmerId,
    pub area: f64,
    pub planting_date: NaiveDate,
    pub soil_type: Option<String>,
    pub has_geometry: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UngroupedPlotDto {
    pub plot_id: PlotId,
    pub farmer_id: FarmerId,
    pub rice_variety_id: VarietyId,
    pub planting_date: NaiveDate,
    pub area: f64,
    pub reason: UngroupedReason,
    pub reason_text: String,
    pub reason_detail: String,
    pub nearest_group_distance: Option<f64>,
    pub nearest_groups: Vec<NearbyGroupDto>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyGroupDto {
    /// "FormedGroup" or "UngroupedCluster"
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_number: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor_plot_id: Option<PlotId>,
    pub rice_variety_id: VarietyId,
    pub distance_meters: Option<f64>,
    pub planting_date_gap_days: i64,
    pub same_variety: bool,
    pub compatible: bool,
    pub incompatibility_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormGroupsResponse {
    pub cluster_id: ClusterId,
    pub season_id: SeasonId,
    pub year: i32,
    pub groups_created: usize,
    pub plots_grouped: usize,
    pub ungrouped_plots: usize,
    pub groups: Vec<CreatedGroupDto>,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedGroupDto {
    pub group_id: GroupId,
    pub group_number: usize,
    pub rice_variety_id: VarietyId,
    pub supervisor_id: Option<SupervisorId>,
    pub planting_date: NaiveDate,
    pub planting_window_start: NaiveDate,
    pub planting_window_end: NaiveDate,
    pub status: GroupStatus,
    pub is_exception: bool,
    pub exception_reason: Option<String>,
    pub total_area: f64,
    /// WKT polygon
    pub boundary: Option<String>,
    pub plot_ids: Vec<PlotId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UngroupedPlotsResponse {
    pub cluster_id: ClusterId,
    pub season_id: SeasonId,
    pub year: i32,
    pub total_ungrouped: usize,
    pub total_ungrouped_area: f64,
    pub plots: Vec<UngroupedPlotDto>,
    pub by_reason: Vec<ReasonStat>,
    pub by_variety: Vec<VarietyStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonStat {
    pub reason: UngroupedReason,
    pub description: &'static str,
    pub count: usize,
    pub total_area: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VarietyStat {
    pub rice_variety_id: VarietyId,
    pub count: usize,
    pub total_area: f64,
}
