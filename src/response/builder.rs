//! Pure mapping from engine results to response DTOs

use rustc_hash::FxHashMap;

use crate::engine::{CommitOutcome, FormedGroup, GroupingResult};
use crate::geometry::{polygon_to_geojson, polygon_to_wkt};
use crate::params::GroupingParams;
use crate::response::types::*;
use crate::stages::{CandidateKind, CandidatePlot, NearbyCandidate, UngroupedPlot, UngroupedReason};
use crate::types::{LonLat, VarietyId};

pub fn preview_response(result: &GroupingResult) -> PreviewGroupsResponse {
    let request = &result.request;
    PreviewGroupsResponse {
        cluster_id: request.cluster_id,
        season_id: request.season_id,
        year: request.year,
        parameters: request.params.clone(),
        summary: PreviewSummary {
            eligible_plots: result.eligible_count(),
            grouped_plots: result.grouped_count(),
            ungrouped_plots: result.ungrouped_count(),
            groups_formed: result.groups.len(),
            exception_groups: result.exception_count(),
            supervisors_needed: result.supervisors_needed(),
            supervisors_available: result.supervisors_available,
            excluded_plots: result.excluded.clone(),
        },
        groups: result
            .groups
            .iter()
            .map(|g| candidate_group(g, &result.plots))
            .collect(),
        ungrouped_plots: result
            .ungrouped
            .iter()
            .map(|u| ungrouped_plot(u, &request.params))
            .collect(),
        warnings: result.warnings.clone(),
        message: result.message.clone(),
    }
}

pub fn form_groups_response(outcome: &CommitOutcome) -> FormGroupsResponse {
    let result = &outcome.result;
    let request = &result.request;
    let groups: Vec<CreatedGroupDto> = outcome
        .groups
        .iter()
        .zip(&result.groups)
        .map(|(row, formed)| CreatedGroupDto {
            group_id: row.id,
            group_number: formed.number,
            rice_variety_id: row.rice_variety_id,
            supervisor_id: row.supervisor_id,
            planting_date: row.planting_date,
            planting_window_start: row.planting_window_start,
            planting_window_end: row.planting_window_end,
            status: row.status,
            is_exception: row.is_exception,
            exception_reason: row.exception_reason.clone(),
            total_area: row.total_area,
            boundary: formed.geometry.boundary.as_ref().map(polygon_to_wkt),
            plot_ids: formed.plot_ids.clone(),
        })
        .collect();

    FormGroupsResponse {
        cluster_id: request.cluster_id,
        season_id: request.season_id,
        year: request.year,
        groups_created: groups.len(),
        plots_grouped: outcome.group_plots.len(),
        ungrouped_plots: result.ungrouped_count(),
        groups,
        warnings: result.warnings.clone(),
    }
}

pub fn ungrouped_response(result: &GroupingResult) -> UngroupedPlotsResponse {
    let request = &result.request;
    let plots: Vec<UngroupedPlotDto> = result
        .ungrouped
        .iter()
        .map(|u| ungrouped_plot(u, &request.params))
        .collect();

    let by_reason: Vec<ReasonStat> = UngroupedReason::ALL
        .iter()
        .filter_map(|&reason| {
            let matching: Vec<&UngroupedPlot> = result.ungrouped.iter().filter(|u| u.reason == reason).collect();
            (!matching.is_empty()).then(|| ReasonStat {
                reason,
                description: reason.description(),
                count: matching.len(),
                total_area: matching.iter().map(|u| u.area).sum(),
            })
        })
        .collect();

    let mut varieties: FxHashMap<VarietyId, (usize, f64)> = FxHashMap::default();
    for u in &result.ungrouped {
        let entry = varieties.entry(u.variety_id).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += u.area;
    }
    let mut by_variety: Vec<VarietyStat> = varieties
        .into_iter()
        .map(|(rice_variety_id, (count, total_area))| VarietyStat {
            rice_variety_id,
            count,
            total_area,
        })
        .collect();
    by_variety.sort_by(|a, b| b.count.cmp(&a.count).then(a.rice_variety_id.cmp(&b.rice_variety_id)));

    UngroupedPlotsResponse {
        cluster_id: request.cluster_id,
        season_id: request.season_id,
        year: request.year,
        total_ungrouped: plots.len(),
        total_ungrouped_area: result.ungrouped.iter().map(|u| u.area).sum(),
        plots,
        by_reason,
        by_variety,
    }
}

fn candidate_group(group: &FormedGroup, plots: &[CandidatePlot]) -> CandidateGroupDto {
    CandidateGroupDto {
        group_number: group.number,
        rice_variety_id: group.variety_id,
        supervisor_id: group.supervisor_id,
        planting_window_start: group.window_start,
        planting_window_end: group.window_end,
        median_planting_date: group.median_date,
        plot_count: group.plot_count(),
        farmer_count: group.farmer_count,
        total_area: group.total_area,
        centroid: group.geometry.centroid.map(LonLat::from_point),
        boundary: group.geometry.boundary.as_ref().map(polygon_to_geojson),
        boundary_is_hull: group.geometry.is_hull,
        is_exception: group.is_exception(),
        exception_reason: group.exception_reason.clone(),
        plots: group
            .members
            .iter()
            .map(|&i| {
                let p = &plots[i];
                GroupPlotDto {
                    plot_id: p.id,
                    farmer_id: p.farmer_id,
                    area: p.area,
                    planting_date: p.planting_date,
                    soil_type: p.soil_type.clone(),
                    has_geometry: !p.geometry_missing,
                }
            })
            .collect(),
    }
}

fn ungrouped_plot(u: &UngroupedPlot, params: &GroupingParams) -> UngroupedPlotDto {
    UngroupedPlotDto {
        plot_id: u.plot_id,
        farmer_id: u.farmer_id,
        rice_variety_id: u.variety_id,
        planting_date: u.planting_date,
        area: u.area,
        reason: u.reason,
        reason_text: u.reason.description().to_string(),
        reason_detail: u.detail.clone(),
        nearest_group_distance: u.nearest().and_then(|c| c.distance_m),
        nearest_groups: u.candidates.iter().map(nearby_group).collect(),
        suggestions: suggestions(u, params),
    }
}

fn nearby_group(c: &NearbyCandidate) -> NearbyGroupDto {
    let (kind, group_number, anchor_plot_id) = match &c.kind {
        CandidateKind::FormedGroup { group_number } => ("FormedGroup", Some(*group_number), None),
        CandidateKind::UngroupedCluster { anchor_plot_id } => ("UngroupedCluster", None, Some(*anchor_plot_id)),
    };
    NearbyGroupDto {
        kind,
        group_number,
        anchor_plot_id,
        rice_variety_id: c.variety_id,
        distance_meters: c.distance_m,
        planting_date_gap_days: c.date_gap_days,
        same_variety: c.same_variety,
        compatible: c.incompatibility.is_none(),
        incompatibility_reason: c.incompatibility.clone(),
    }
}

fn describe(kind: &CandidateKind) -> String {
    match kind {
        CandidateKind::FormedGroup { group_number } => format!("group {}", group_number),
        CandidateKind::UngroupedCluster { anchor_plot_id } => format!("the ungrouped plots around {}", anchor_plot_id),
    }
}

fn suggestions(u: &UngroupedPlot, params: &GroupingParams) -> Vec<String> {
    let mut out = Vec::new();
    let same_variety = u.candidates.iter().find(|c| c.same_variety);

    match u.reason {
        UngroupedReason::NoGeometry => {
            out.push("Draw or re-import the plot boundary so it can be clustered spatially".to_string());
        }
        UngroupedReason::VarietyIncompatible => {
            out.push("No other plot in the cluster grows this variety; consider a variety grown nearby".to_string());
            if let Some(c) = u.nearest() {
                out.push(format!("Nearest is {}, which grows a different variety", describe(&c.kind)));
            }
        }
        UngroupedReason::DateMismatch => {
            if let Some(c) = same_variety {
                out.push(format!(
                    "Planting date is {} days from {}; within ±{} days it could join",
                    c.date_gap_days,
                    describe(&c.kind),
                    params.planting_date_tolerance
                ));
            }
        }
        UngroupedReason::TooFarFromAnyGroup => {
            if let Some((c, d)) = u.candidates.iter().find_map(|c| c.distance_m.map(|d| (c, d))) {
                out.push(format!(
                    "Nearest is {} at {:.0} m; a proximity threshold of {:.0} m would reach it",
                    describe(&c.kind),
                    d,
                    d.ceil()
                ));
            }
        }
        UngroupedReason::CapacityExhausted => {
            out.push(format!(
                "Lower the minimum group size ({} plots, {} ha) or keep it as an exception group",
                params.min_plots_per_group, params.min_group_area
            ));
        }
    }

    for c in u.candidates.iter().filter(|c| c.incompatibility.is_none()) {
        out.push(format!("Could be added to {} manually", describe(&c.kind)));
    }

    out
}
