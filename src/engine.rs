//! Group Formation Engine - runs the grouping pipeline for one (cluster, season, year)
//!
//! Pipeline:
//! 1. Eligibility      (stages::s1_eligibility)
//! 2. Proximity        (stages::s2_proximity)
//! 3. Variety          (stages::s3_variety)
//! 4. Planting window  (stages::s4_planting_window)
//! 5. Group size       (stages::s5_area_constraints)
//! 6. Supervisors      (stages::s6_supervisors)
//! 7. Geometry         (stages::s7_geometry, parallel across groups)
//! 8. Ungrouped plots  (stages::s8_ungrouped)
//!
//! `preview` is read-only and deterministic. `commit` re-runs the pipeline and
//! writes every group inside one store transaction, all or nothing.

use std::time::{Duration, Instant};

use chrono::{Duration as Days, NaiveDate};
use geo::Point;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{GroupingError, StoreError};
use crate::geometry::{polygon_to_wkt, GeoPolygonOps, PolygonOps};
use crate::params::GroupingParams;
use crate::source::FarmDataSource;
use crate::stages::*;
use crate::store::{GroupStore, GroupTransaction};
use crate::types::{
    ClusterId, Group, GroupPlot, GroupStatus, PlotId, SeasonId, SupervisorId, SupervisorTotals, VarietyId,
};
use crate::utils::{date_span, CancellationToken};

/// What to group
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupingRequest {
    pub cluster_id: ClusterId,
    pub season_id: SeasonId,
    pub year: i32,
    pub params: GroupingParams,
}

impl GroupingRequest {
    pub fn new(cluster_id: ClusterId, season_id: SeasonId, year: i32, params: GroupingParams) -> Self {
        Self {
            cluster_id,
            season_id,
            year,
            params,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WarningKind {
    /// No supervisor could take a group
    CapacityWarning,
    /// Group persisted outside the size bounds, pending manual review
    ExceptionGroup,
    /// Plot boundary could not be read; plot treated as having no geometry
    GeometryError,
}

/// Non-fatal issue surfaced to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_number: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plot_id: Option<PlotId>,
}

/// Candidate group produced by the pipeline
#[derive(Debug, Clone)]
pub struct FormedGroup {
    /// 1-based, in pipeline order
    pub number: usize,
    pub variety_id: VarietyId,
    /// Indices into `GroupingResult::plots`, ascending
    pub members: Vec<usize>,
    pub plot_ids: Vec<PlotId>,
    pub farmer_count: u32,
    pub median_date: NaiveDate,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub total_area: f64,
    pub supervisor_id: Option<SupervisorId>,
    pub exception_reason: Option<String>,
    pub geometry: GroupGeometry,
}

impl FormedGroup {
    pub fn is_exception(&self) -> bool {
        self.exception_reason.is_some()
    }

    pub fn plot_count(&self) -> usize {
        self.members.len()
    }
}

/// Everything a preview produces
#[derive(Debug, Clone)]
pub struct GroupingResult {
    pub request: GroupingRequest,
    /// Eligible plots, sorted by id
    pub plots: Vec<CandidatePlot>,
    pub excluded: ExclusionStats,
    pub groups: Vec<FormedGroup>,
    pub ungrouped: Vec<UngroupedPlot>,
    pub supervisor_totals: Vec<SupervisorTotals>,
    pub supervisors_available: usize,
    pub warnings: Vec<Warning>,
    /// Informational message (e.g. nothing to group)
    pub message: Option<String>,
    pub timings: Vec<(&'static str, Duration)>,
}

impl GroupingResult {
    pub fn eligible_count(&self) -> usize {
        self.plots.len()
    }

    pub fn grouped_count(&self) -> usize {
        self.groups.iter().map(|g| g.plot_count()).sum()
    }

    pub fn ungrouped_count(&self) -> usize {
        self.ungrouped.len()
    }

    pub fn supervisors_needed(&self) -> usize {
        self.groups.len()
    }

    pub fn exception_count(&self) -> usize {
        self.groups.iter().filter(|g| g.is_exception()).count()
    }

    pub fn capacity_warnings(&self) -> impl Iterator<Item = &Warning> {
        self.warnings.iter().filter(|w| w.kind == WarningKind::CapacityWarning)
    }
}

/// Result of a successful commit
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub result: GroupingResult,
    /// Created rows, same order as `result.groups`
    pub groups: Vec<Group>,
    pub group_plots: Vec<GroupPlot>,
}

/// Per-stage wall-clock timings for the run summary
struct StageTimer {
    started: Instant,
    last: Instant,
    laps: Vec<(&'static str, Duration)>,
}

impl StageTimer {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last: now,
            laps: Vec::with_capacity(8),
        }
    }

    fn lap(&mut self, stage: &'static str) {
        let now = Instant::now();
        self.laps.push((stage, now - self.last));
        self.last = now;
    }

    fn total(&self) -> Duration {
        self.started.elapsed()
    }

    fn summary(&self) -> String {
        self.laps
            .iter()
            .map(|(stage, d)| format!("{} {:.2?}", stage, d))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Main entry point for group formation
pub struct GroupFormationEngine<P: PolygonOps = GeoPolygonOps> {
    ops: P,
}

impl Default for GroupFormationEngine<GeoPolygonOps> {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupFormationEngine<GeoPolygonOps> {
    pub fn new() -> Self {
        Self { ops: GeoPolygonOps }
    }
}

impl<P: PolygonOps> GroupFormationEngine<P> {
    pub fn with_ops(ops: P) -> Self {
        Self { ops }
    }

    /// Run the pipeline without writing anything
    ///
    /// # Arguments
    /// * `source` - Farm and supervisor data
    /// * `request` - Cluster, season, year and parameters
    /// * `cancel` - Checked before every stage
    ///
    /// # Errors
    /// `Validation` for malformed parameters, `NotFound` for a missing cluster,
    /// season or rice variety, `Cancelled`, or a data source failure. An empty
    /// eligible set is not an error.
    pub fn preview(
        &self,
        source: &dyn FarmDataSource,
        request: &GroupingRequest,
        cancel: &CancellationToken,
    ) -> Result<GroupingResult, GroupingError> {
        let params = &request.params;
        let mut timer = StageTimer::new();

        cancel.check("validation")?;
        params.validate()?;
        check_references(source, request)?;

        cancel.check("eligibility")?;
        let records = source.list_plots(request.cluster_id, request.season_id, request.year)?;
        let eligibility = filter_eligible(records, request.cluster_id, &self.ops);
        check_varieties(source, &eligibility.plots)?;
        timer.lap("eligibility");

        let mut warnings: Vec<Warning> = eligibility
            .geometry_errors
            .iter()
            .map(|(plot_id, e)| Warning {
                kind: WarningKind::GeometryError,
                message: format!("Plot boundary unreadable, treated as missing: {}", e),
                group_number: None,
                plot_id: Some(*plot_id),
            })
            .collect();

        let plots = eligibility.plots;
        if plots.is_empty() {
            let supervisors = source.list_supervisors(request.cluster_id)?;
            let message = format!(
                "No eligible plots in cluster {} for season {} {}",
                request.cluster_id, request.season_id, request.year
            );
            tracing::info!("{}", message);
            return Ok(GroupingResult {
                request: request.clone(),
                plots,
                excluded: eligibility.excluded,
                groups: Vec::new(),
                ungrouped: Vec::new(),
                supervisor_totals: Vec::new(),
                supervisors_available: assign_supervisors(&[], &supervisors).available,
                warnings,
                message: Some(message),
                timings: timer.laps,
            });
        }

        cancel.check("proximity")?;
        let raw_clusters = cluster_by_proximity(&plots, params.proximity_threshold, &self.ops);
        timer.lap("proximity");

        cancel.check("variety")?;
        let buckets = partition_by_variety(&raw_clusters, &plots);
        timer.lap("variety");

        cancel.check("planting_window")?;
        let windows = reconcile_planting_windows(&buckets, &plots, params.planting_date_tolerance);
        timer.lap("planting_window");

        cancel.check("group_size")?;
        let sized = resolve_group_sizes(windows.sub_clusters, &plots, params, &self.ops);
        timer.lap("group_size");

        cancel.check("supervisors")?;
        let supervisors = source.list_supervisors(request.cluster_id)?;
        let demands: Vec<GroupDemand> = sized
            .groups
            .iter()
            .map(|g| GroupDemand::for_members(&g.sub.members, &plots))
            .collect();
        let assignment = assign_supervisors(&demands, &supervisors);
        timer.lap("supervisors");

        cancel.check("geometry")?;
        let member_lists: Vec<&[usize]> = sized.groups.iter().map(|g| g.sub.members.as_slice()).collect();
        let geometry = aggregate_geometry(&member_lists, &plots, &self.ops);
        timer.lap("geometry");

        cancel.check("ungrouped")?;
        let centroids: Vec<Option<Point<f64>>> = geometry
            .iter()
            .zip(&sized.groups)
            .map(|(g, s)| g.centroid.or_else(|| s.sub.centroid(&plots)))
            .collect();
        let ungrouped = explain_ungrouped(
            &UngroupedInput {
                plots: &plots,
                groups: &sized.groups,
                group_centroids: &centroids,
                rejected: &sized.rejected,
                unplaced_outliers: &windows.unplaced_outliers,
                params,
            },
            &self.ops,
        );
        timer.lap("ungrouped");

        let groups: Vec<FormedGroup> = sized
            .groups
            .into_iter()
            .zip(geometry)
            .zip(demands.iter().zip(&assignment.assignments))
            .enumerate()
            .map(|(idx, ((sized_group, geometry), (demand, supervisor_id)))| {
                let sub = sized_group.sub;
                let (window_start, window_end) = planting_window(&sub, &plots, params.planting_date_tolerance);
                FormedGroup {
                    number: idx + 1,
                    variety_id: sub.variety_id,
                    plot_ids: sub.plot_ids(&plots),
                    farmer_count: demand.farmers,
                    median_date: sub.median_date,
                    window_start,
                    window_end,
                    total_area: geometry.total_area,
                    supervisor_id: *supervisor_id,
                    exception_reason: sized_group.exception_reason,
                    geometry,
                    members: sub.members,
                }
            })
            .collect();

        for group in &groups {
            if let Some(reason) = &group.exception_reason {
                warnings.push(Warning {
                    kind: WarningKind::ExceptionGroup,
                    message: format!(
                        "Group {} flagged for manual review: {} ({} plots, {:.2} ha)",
                        group.number,
                        reason,
                        group.plot_count(),
                        group.total_area
                    ),
                    group_number: Some(group.number),
                    plot_id: None,
                });
            }
        }
        for group in groups.iter().filter(|g| g.supervisor_id.is_none()) {
            tracing::warn!(
                "Insufficient supervisors: group {} ({} farmers, {:.2} ha) has no supervisor",
                group.number,
                group.farmer_count,
                group.total_area
            );
            warnings.push(Warning {
                kind: WarningKind::CapacityWarning,
                message: format!(
                    "Insufficient supervisors: no capacity for group {} ({} farmers, {:.2} ha)",
                    group.number, group.farmer_count, group.total_area
                ),
                group_number: Some(group.number),
                plot_id: None,
            });
        }

        let result = GroupingResult {
            request: request.clone(),
            plots,
            excluded: eligibility.excluded,
            groups,
            ungrouped,
            supervisor_totals: assignment.totals,
            supervisors_available: assignment.available,
            warnings,
            message: None,
            timings: timer.laps.clone(),
        };

        for violation in verify_invariants(&result) {
            tracing::error!("Grouping invariant violated: {}", violation);
        }

        tracing::info!(
            "Grouped cluster {} season {} {}: {} eligible -> {} groups ({} exception), {} ungrouped, {}/{} supervisors in {:.2?} [{}]",
            request.cluster_id,
            request.season_id,
            request.year,
            result.eligible_count(),
            result.groups.len(),
            result.exception_count(),
            result.ungrouped_count(),
            result.supervisor_totals.len(),
            result.supervisors_available,
            timer.total(),
            timer.summary()
        );

        Ok(result)
    }

    /// Re-run the pipeline and persist its groups in one transaction
    ///
    /// Fails with `ConcurrencyConflict` (and writes nothing) when any plot was
    /// grouped for the season since the data was read.
    pub fn commit(
        &self,
        source: &dyn FarmDataSource,
        store: &dyn GroupStore,
        request: &GroupingRequest,
        cancel: &CancellationToken,
    ) -> Result<CommitOutcome, GroupingError> {
        let result = self.preview(source, request, cancel)?;
        cancel.check("commit")?;

        if result.groups.is_empty() {
            tracing::info!("Nothing to commit for cluster {}", request.cluster_id);
            return Ok(CommitOutcome {
                result,
                groups: Vec::new(),
                group_plots: Vec::new(),
            });
        }

        let mut tx = store.begin()?;
        let written = write_groups(tx.as_mut(), &result);
        let (groups, group_plots) = match written {
            Ok(rows) => rows,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::warn!("Rollback failed after commit error: {}", rollback_err);
                }
                return Err(e);
            }
        };
        tx.commit().map_err(conflict_or_store)?;

        tracing::info!(
            "Committed {} groups ({} plots) for cluster {} season {} {}",
            groups.len(),
            group_plots.len(),
            request.cluster_id,
            request.season_id,
            request.year
        );

        Ok(CommitOutcome {
            result,
            groups,
            group_plots,
        })
    }
}

fn check_references(source: &dyn FarmDataSource, request: &GroupingRequest) -> Result<(), GroupingError> {
    if !source.cluster_exists(request.cluster_id)? {
        return Err(GroupingError::NotFound {
            entity: "cluster",
            id: request.cluster_id,
        });
    }
    if !source.season_exists(request.season_id)? {
        return Err(GroupingError::NotFound {
            entity: "season",
            id: request.season_id,
        });
    }
    Ok(())
}

fn check_varieties(source: &dyn FarmDataSource, plots: &[CandidatePlot]) -> Result<(), GroupingError> {
    let mut varieties: Vec<VarietyId> = plots
        .iter()
        .map(|p| p.variety_id)
        .collect::<FxHashSet<_>>()
        .into_iter()
        .collect();
    varieties.sort_unstable();
    for variety_id in varieties {
        if !source.variety_exists(variety_id)? {
            return Err(GroupingError::NotFound {
                entity: "rice variety",
                id: variety_id,
            });
        }
    }
    Ok(())
}

/// Median ± tolerance, widened to cover every member's planting date
fn planting_window(sub: &SubCluster, plots: &[CandidatePlot], tolerance_days: i64) -> (NaiveDate, NaiveDate) {
    let median = sub.median_date;
    let start = median.checked_sub_signed(Days::days(tolerance_days)).unwrap_or(median);
    let end = median.checked_add_signed(Days::days(tolerance_days)).unwrap_or(median);
    match date_span(sub.members.iter().map(|&i| plots[i].planting_date)) {
        Some((earliest, latest)) => (start.min(earliest), end.max(latest)),
        None => (start, end),
    }
}

fn conflict_or_store(e: StoreError) -> GroupingError {
    match e {
        StoreError::UniqueViolation { plot_id } => GroupingError::ConcurrencyConflict {
            plot_ids: vec![plot_id],
        },
        other => GroupingError::Store(other),
    }
}

fn write_groups(
    tx: &mut dyn GroupTransaction,
    result: &GroupingResult,
) -> Result<(Vec<Group>, Vec<GroupPlot>), GroupingError> {
    let request = &result.request;
    let plot_ids: Vec<PlotId> = result.groups.iter().flat_map(|g| g.plot_ids.iter().copied()).collect();

    let conflicts = tx.grouped_plots(request.season_id, request.year, &plot_ids)?;
    if !conflicts.is_empty() {
        tracing::warn!(
            "{} plots were grouped by another commit since they were read",
            conflicts.len()
        );
        return Err(GroupingError::ConcurrencyConflict { plot_ids: conflicts });
    }

    let mut groups = Vec::with_capacity(result.groups.len());
    let mut links = Vec::with_capacity(plot_ids.len());

    for formed in &result.groups {
        let group = Group {
            id: Uuid::new_v4(),
            cluster_id: request.cluster_id,
            season_id: request.season_id,
            year: request.year,
            rice_variety_id: formed.variety_id,
            supervisor_id: formed.supervisor_id,
            planting_date: formed.median_date,
            planting_window_start: formed.window_start,
            planting_window_end: formed.window_end,
            status: if formed.is_exception() {
                GroupStatus::Draft
            } else {
                GroupStatus::Active
            },
            is_exception: formed.is_exception(),
            exception_reason: formed.exception_reason.clone(),
            total_area: formed.total_area,
            boundary_wkt: formed.geometry.boundary.as_ref().map(polygon_to_wkt),
        };
        tx.create_group(&group)?;

        for &plot_id in &formed.plot_ids {
            let link = GroupPlot {
                group_id: group.id,
                plot_id,
                season_id: request.season_id,
                year: request.year,
            };
            tx.create_group_plot(&link).map_err(conflict_or_store)?;
            links.push(link);
        }
        groups.push(group);
    }

    for totals in &result.supervisor_totals {
        tx.update_supervisor_totals(totals)?;
    }

    Ok((groups, links))
}

/// Re-check the grouping invariants on a result; returns one message per violation
pub fn verify_invariants(result: &GroupingResult) -> Vec<String> {
    let params = &result.request.params;
    let mut violations = Vec::new();
    let mut placements: FxHashMap<usize, usize> = FxHashMap::default();

    for group in &result.groups {
        for &i in &group.members {
            *placements.entry(i).or_default() += 1;
            if result.plots[i].variety_id != group.variety_id {
                violations.push(format!(
                    "plot {} in group {} has a different rice variety",
                    result.plots[i].id, group.number
                ));
            }
        }

        if !group.is_exception() {
            let count = group.plot_count();
            if count < params.min_plots_per_group || count > params.max_plots_per_group {
                violations.push(format!(
                    "group {} has {} plots, outside [{}, {}]",
                    group.number, count, params.min_plots_per_group, params.max_plots_per_group
                ));
            }
            if group.total_area < params.min_group_area || group.total_area > params.max_group_area {
                violations.push(format!(
                    "group {} has {:.2} ha, outside [{}, {}]",
                    group.number, group.total_area, params.min_group_area, params.max_group_area
                ));
            }
        }
    }

    for u in &result.ungrouped {
        *placements.entry(u.plot).or_default() += 1;
    }

    for (i, plot) in result.plots.iter().enumerate() {
        match placements.get(&i).copied().unwrap_or(0) {
            1 => {}
            0 => violations.push(format!("plot {} is neither grouped nor ungrouped", plot.id)),
            n => violations.push(format!("plot {} appears {} times", plot.id, n)),
        }
    }

    violations
}
