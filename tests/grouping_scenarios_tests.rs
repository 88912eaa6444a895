//! Grouping Scenario Tests
//!
//! End-to-end preview runs over in-memory farm data: the reference scenarios,
//! the grouping invariants, and repeatability of previews.

mod common;

use approx::assert_relative_eq;
use common::*;
use rice_grouping::response::{preview_response, ungrouped_response};
use rice_grouping::{
    verify_invariants, CancellationToken, CandidateKind, GroupFormationEngine, GroupingResult, UndersizedPolicy,
    UngroupedReason, WarningKind,
};

fn preview(farm: &Farm, params: rice_grouping::GroupingParams) -> GroupingResult {
    GroupFormationEngine::new()
        .preview(&farm.data, &request(params), &CancellationToken::new())
        .expect("preview failed")
}

#[test]
fn test_scenario_a_close_aligned_plots_form_one_group() {
    let mut farm = Farm::new();
    let positions = [(0.0, 0.0), (20.0, 0.0), (40.0, 0.0), (0.0, 20.0), (20.0, 20.0)];
    let days = [10, 11, 12, 10, 11];
    for (&(e, n), &day) in positions.iter().zip(&days) {
        farm.plot(e, n, variety_a(), day, 2.0);
    }
    let supervisor = farm.supervisor(40, 0, None);

    let result = preview(&farm, params(100.0, 3, 3, 30));

    assert_eq!(result.groups.len(), 1);
    assert!(result.ungrouped.is_empty());
    let group = &result.groups[0];
    assert_eq!(group.plot_count(), 5);
    assert_eq!(group.variety_id, variety_a());
    assert!(!group.is_exception());
    assert_eq!(group.supervisor_id, Some(supervisor));
    assert_relative_eq!(group.total_area, 10.0);
    assert_eq!(group.median_date, date(11));
    assert!(group.geometry.boundary.is_some());
    assert!(group.geometry.centroid.is_some());
    assert!(verify_invariants(&result).is_empty());
}

#[test]
fn test_scenario_b_distant_pair_left_ungrouped() {
    let mut farm = Farm::new();
    let first = farm.plot(0.0, 0.0, variety_a(), 10, 2.0);
    let second = farm.plot(500.0, 0.0, variety_a(), 10, 2.0);
    farm.supervisor(40, 0, None);

    let mut p = params(100.0, 3, 2, 30);
    p.undersized_policy = UndersizedPolicy::LeaveUngrouped;
    let result = preview(&farm, p);

    assert!(result.groups.is_empty());
    assert_eq!(result.ungrouped.len(), 2);
    for u in &result.ungrouped {
        assert_eq!(u.reason, UngroupedReason::CapacityExhausted);
        let nearest = u.nearest().expect("the other plot is a candidate");
        assert!(nearest.same_variety);
        assert!((nearest.distance_m.unwrap() - 500.0).abs() < 5.0);
    }
    assert_eq!(
        result.ungrouped[0].candidates[0].kind,
        CandidateKind::UngroupedCluster { anchor_plot_id: second }
    );
    assert_eq!(
        result.ungrouped[1].candidates[0].kind,
        CandidateKind::UngroupedCluster { anchor_plot_id: first }
    );
    assert!(verify_invariants(&result).is_empty());
}

#[test]
fn test_scenario_b_default_policy_flags_exception_groups() {
    let mut farm = Farm::new();
    farm.plot(0.0, 0.0, variety_a(), 10, 2.0);
    farm.plot(500.0, 0.0, variety_a(), 10, 2.0);
    farm.supervisor(40, 0, None);

    let result = preview(&farm, params(100.0, 3, 2, 30));

    assert_eq!(result.groups.len(), 2);
    assert!(result.ungrouped.is_empty());
    for g in &result.groups {
        assert_eq!(g.exception_reason.as_deref(), Some("Below minimum threshold"));
    }
    let exception_warnings = result
        .warnings
        .iter()
        .filter(|w| w.kind == WarningKind::ExceptionGroup)
        .count();
    assert_eq!(exception_warnings, 2);
    assert!(verify_invariants(&result).is_empty());
}

#[test]
fn test_scenario_b_force_merge_joins_distant_pair() {
    let mut farm = Farm::new();
    farm.plot(0.0, 0.0, variety_a(), 10, 2.0);
    farm.plot(500.0, 0.0, variety_a(), 11, 2.0);
    farm.supervisor(40, 0, None);

    let mut p = params(100.0, 3, 2, 30);
    p.undersized_policy = UndersizedPolicy::ForceMerge;
    let result = preview(&farm, p);

    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.groups[0].plot_count(), 2);
    assert!(!result.groups[0].is_exception());
    assert!(result.groups[0].geometry.is_hull);
}

#[test]
fn test_scenario_c_two_planting_waves_form_two_groups() {
    let mut farm = Farm::new();
    for i in 0..10 {
        let day = if i < 5 { 2 } else { 10 };
        farm.plot((i % 5) as f64 * 10.0, (i / 5) as f64 * 10.0, variety_a(), day, 1.0);
    }
    farm.supervisor(40, 0, None);

    let result = preview(&farm, params(100.0, 3, 3, 30));

    assert_eq!(result.groups.len(), 2);
    assert!(result.ungrouped.is_empty());
    let mut medians: Vec<_> = result.groups.iter().map(|g| g.median_date).collect();
    medians.sort();
    assert_eq!(medians, vec![date(2), date(10)]);
    for g in &result.groups {
        assert_eq!(g.plot_count(), 5);
        assert!(!g.is_exception());
        assert_relative_eq!(g.total_area, 5.0);
    }
    assert!(verify_invariants(&result).is_empty());
}

#[test]
fn test_scenario_d_no_supervisor_capacity_is_a_warning() {
    let mut farm = Farm::new();
    for i in 0..5 {
        farm.plot(i as f64 * 20.0, 0.0, variety_a(), 10, 2.0);
    }
    farm.supervisor(10, 10, None);
    farm.supervisor(20, 5, Some(0.0));

    let result = preview(&farm, params(100.0, 3, 3, 30));

    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.groups[0].supervisor_id, None);
    assert_eq!(result.supervisors_available, 0);
    let warnings: Vec<_> = result.capacity_warnings().collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].group_number, Some(1));
    assert!(warnings[0].message.contains("Insufficient supervisors"));
}

#[test]
fn test_plots_without_geometry_group_by_variety_and_date() {
    let mut farm = Farm::new();
    farm.plot(0.0, 0.0, variety_a(), 10, 2.0);
    farm.plot(20.0, 0.0, variety_a(), 10, 2.0);
    farm.plot_without_geometry(variety_a(), 11, 2.0);
    let lonely = farm.plot_without_geometry(variety_b(), 11, 2.0);
    farm.supervisor(40, 0, None);

    let mut p = params(100.0, 3, 3, 30);
    p.undersized_policy = UndersizedPolicy::LeaveUngrouped;
    let result = preview(&farm, p);

    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.groups[0].plot_count(), 3);
    assert_eq!(result.ungrouped.len(), 1);
    assert_eq!(result.ungrouped[0].plot_id, lonely);
    assert_eq!(result.ungrouped[0].reason, UngroupedReason::NoGeometry);
}

#[test]
fn test_date_outlier_reported_as_date_mismatch() {
    let mut farm = Farm::new();
    for i in 0..4 {
        farm.plot(i as f64 * 20.0, 0.0, variety_a(), 10, 2.0);
    }
    let late = farm.plot(80.0, 0.0, variety_a(), 25, 2.0);
    farm.supervisor(40, 0, None);

    let result = preview(&farm, params(100.0, 3, 3, 30));

    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.groups[0].plot_count(), 4);
    assert_eq!(result.ungrouped.len(), 1);
    let u = &result.ungrouped[0];
    assert_eq!(u.plot_id, late);
    assert_eq!(u.reason, UngroupedReason::DateMismatch);
    let nearest = u.nearest().unwrap();
    assert_eq!(nearest.kind, CandidateKind::FormedGroup { group_number: 1 });
    assert_eq!(nearest.date_gap_days, 15);
    assert!(nearest.incompatibility.as_deref().unwrap().contains("15 days"));
}

#[test]
fn test_oversized_cluster_is_split_within_bounds() {
    let mut farm = Farm::new();
    for i in 0..12 {
        farm.plot((i % 4) as f64 * 20.0, (i / 4) as f64 * 20.0, variety_a(), 10, 6.0);
    }
    farm.supervisor(100, 0, None);

    let mut p = params(100.0, 3, 3, 30);
    p.max_group_area = 25.0;
    let result = preview(&farm, p);

    assert!(result.groups.len() >= 3);
    assert_eq!(result.grouped_count(), 12);
    for g in &result.groups {
        assert!(g.total_area <= 25.0);
        assert!(!g.is_exception());
    }
    assert!(verify_invariants(&result).is_empty());
}

#[test]
fn test_invariants_hold_on_mixed_village_for_every_policy() {
    let mut farm = Farm::new();
    village(&mut farm, 160);
    farm.supervisor(30, 0, Some(60.0));
    farm.supervisor(12, 2, None);

    for policy in [
        UndersizedPolicy::FlagException,
        UndersizedPolicy::ForceMerge,
        UndersizedPolicy::LeaveUngrouped,
    ] {
        let mut p = params(60.0, 3, 3, 12);
        p.min_group_area = 3.0;
        p.max_group_area = 20.0;
        p.undersized_policy = policy;
        let result = preview(&farm, p);

        let violations = verify_invariants(&result);
        assert!(violations.is_empty(), "{:?}: {:?}", policy, violations);
        assert_eq!(result.grouped_count() + result.ungrouped_count(), 160);
        for g in &result.groups {
            for &i in &g.members {
                assert_eq!(result.plots[i].variety_id, g.variety_id);
            }
        }
    }
}

#[test]
fn test_preview_is_repeatable() {
    let mut farm = Farm::new();
    village(&mut farm, 120);
    farm.supervisor(30, 0, None);

    let mut p = params(60.0, 3, 3, 12);
    p.min_group_area = 3.0;
    p.max_group_area = 20.0;

    let first = preview(&farm, p.clone());
    let second = preview(&farm, p);

    let a = serde_json::to_value(preview_response(&first)).unwrap();
    let b = serde_json::to_value(preview_response(&second)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_ungrouped_report_statistics() {
    let mut farm = Farm::new();
    for i in 0..4 {
        farm.plot(i as f64 * 20.0, 0.0, variety_a(), 10, 2.0);
    }
    farm.plot(80.0, 0.0, variety_a(), 25, 1.5);
    farm.plot_without_geometry(variety_b(), 10, 3.0);
    farm.supervisor(40, 0, None);

    let mut p = params(100.0, 3, 3, 30);
    p.undersized_policy = UndersizedPolicy::LeaveUngrouped;
    let result = preview(&farm, p);
    let report = ungrouped_response(&result);

    assert_eq!(report.total_ungrouped, 2);
    assert_relative_eq!(report.total_ungrouped_area, 4.5);
    let reasons: Vec<_> = report.by_reason.iter().map(|r| (r.reason, r.count)).collect();
    assert_eq!(
        reasons,
        vec![(UngroupedReason::NoGeometry, 1), (UngroupedReason::DateMismatch, 1)]
    );
    assert_eq!(report.by_variety.len(), 2);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["byReason"][0]["reason"], "NoGeometry");
    assert!(json["plots"][0]["suggestions"].as_array().is_some());
}

#[test]
fn test_small_cluster_of_unique_variety_is_capacity_exhausted() {
    let mut farm = Farm::new();
    for i in 0..3 {
        farm.plot(i as f64 * 20.0, 0.0, variety_a(), 10, 2.0);
    }
    let b1 = farm.plot(60.0, 0.0, variety_b(), 10, 2.0);
    let b2 = farm.plot(80.0, 0.0, variety_b(), 10, 2.0);
    farm.supervisor(40, 0, None);

    let mut p = params(100.0, 3, 3, 30);
    p.undersized_policy = UndersizedPolicy::LeaveUngrouped;
    let result = preview(&farm, p);

    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.groups[0].variety_id, variety_a());
    let ids: Vec<_> = result.ungrouped.iter().map(|u| u.plot_id).collect();
    assert_eq!(ids, vec![b1, b2]);
    for u in &result.ungrouped {
        assert_eq!(u.reason, UngroupedReason::CapacityExhausted);
    }
}
