//! STAGE 4: PLANTING WINDOW RECONCILIATION
//!
//! Within each variety bucket, the median planting date defines a window of
//! `median ± tolerance` days. Plots outside it are ejected and the median of
//! the remaining plots is recomputed once (no iterative re-convergence).
//!
//! Ejected plots are first retried against the other cohorts of the same
//! bucket (joining the one whose median is closest, within tolerance). Those
//! that still don't fit are reconciled among themselves and form follow-up
//! cohorts, which is how a bucket planted in two waves ends up as two
//! sub-clusters.

use chrono::NaiveDate;
use rustc_hash::FxHashSet;

use crate::stages::{CandidatePlot, CohortOrigin, SubCluster, VarietyBucket};
use crate::utils::{day_gap, median_date};

#[derive(Debug, Clone)]
pub struct WindowOutcome {
    pub sub_clusters: Vec<SubCluster>,
    /// Plots ejected from a window that no retry placed; they only sit in
    /// follow-up cohorts
    pub unplaced_outliers: FxHashSet<usize>,
}

pub fn reconcile_planting_windows(
    buckets: &[VarietyBucket],
    plots: &[CandidatePlot],
    tolerance_days: i64,
) -> WindowOutcome {
    let mut sub_clusters = Vec::new();
    let mut unplaced_outliers: FxHashSet<usize> = FxHashSet::default();

    for bucket in buckets {
        let mut cohorts: Vec<SubCluster> = Vec::new();
        let mut pool = bucket.members.clone();
        let mut origin = CohortOrigin::Primary;

        while !pool.is_empty() {
            let (kept, outliers) = split_by_window(&pool, plots, tolerance_days);
            let Some(cohort) = SubCluster::new(bucket.raw_cluster, bucket.variety_id, kept, plots, origin) else {
                break;
            };
            cohorts.push(cohort);

            // Retry against the bucket's other cohorts, not the one just left
            let others = cohorts.len() - 1;
            let mut remaining = Vec::new();
            for i in outliers {
                match closest_cohort(&cohorts[..others], plots[i].planting_date, tolerance_days) {
                    Some(c) => {
                        cohorts[c].members.push(i);
                        unplaced_outliers.remove(&i);
                    }
                    None => {
                        unplaced_outliers.insert(i);
                        remaining.push(i);
                    }
                }
            }

            pool = remaining;
            origin = CohortOrigin::DateOutliers;
        }

        for cohort in &mut cohorts {
            cohort.members.sort_unstable();
        }
        sub_clusters.extend(cohorts);
    }

    tracing::debug!(
        "Planting windows: {} buckets -> {} sub-clusters, {} outliers never placed by retry",
        buckets.len(),
        sub_clusters.len(),
        unplaced_outliers.len()
    );

    WindowOutcome { sub_clusters, unplaced_outliers }
}

/// Partition a pool into plots inside / outside `median ± tolerance`
fn split_by_window(pool: &[usize], plots: &[CandidatePlot], tolerance_days: i64) -> (Vec<usize>, Vec<usize>) {
    let Some(median) = median_date(pool.iter().map(|&i| plots[i].planting_date)) else {
        return (Vec::new(), Vec::new());
    };
    pool.iter()
        .copied()
        .partition(|&i| day_gap(plots[i].planting_date, median) <= tolerance_days)
}

/// Cohort whose median is nearest to `date`, if within tolerance (ties: earliest cohort)
fn closest_cohort(cohorts: &[SubCluster], date: NaiveDate, tolerance_days: i64) -> Option<usize> {
    cohorts
        .iter()
        .enumerate()
        .map(|(idx, c)| (idx, day_gap(c.median_date, date)))
        .filter(|&(_, gap)| gap <= tolerance_days)
        .min_by_key(|&(idx, gap)| (gap, idx))
        .map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::{date, id, plot};

    fn bucket(members: Vec<usize>) -> VarietyBucket {
        VarietyBucket { raw_cluster: 0, variety_id: id(9), members }
    }

    #[test]
    fn test_aligned_dates_stay_together() {
        let plots: Vec<_> = (0..5).map(|n| plot(n as u128 + 1, 9, 10 + (n % 3) as u32, 1.0, Some((0.0, 0.0)))).collect();
        let outcome = reconcile_planting_windows(&[bucket(vec![0, 1, 2, 3, 4])], &plots, 3);
        assert_eq!(outcome.sub_clusters.len(), 1);
        assert_eq!(outcome.sub_clusters[0].members, vec![0, 1, 2, 3, 4]);
        assert_eq!(outcome.sub_clusters[0].origin, CohortOrigin::Primary);
        assert!(outcome.unplaced_outliers.is_empty());
    }

    #[test]
    fn test_two_planting_waves_become_two_cohorts() {
        // Five plots on day 2, five on day 10
        let plots: Vec<_> = (0..10)
            .map(|n| plot(n as u128 + 1, 9, if n % 2 == 0 { 2 } else { 10 }, 1.0, Some((0.0, 0.0))))
            .collect();
        let outcome = reconcile_planting_windows(&[bucket((0..10).collect())], &plots, 3);

        assert_eq!(outcome.sub_clusters.len(), 2);
        let first = &outcome.sub_clusters[0];
        let second = &outcome.sub_clusters[1];
        assert_eq!(first.median_date, date(2));
        assert_eq!(first.members, vec![0, 2, 4, 6, 8]);
        assert_eq!(first.origin, CohortOrigin::Primary);
        assert_eq!(second.median_date, date(10));
        assert_eq!(second.members, vec![1, 3, 5, 7, 9]);
        assert_eq!(second.origin, CohortOrigin::DateOutliers);
        assert_eq!(outcome.unplaced_outliers.len(), 5);
    }

    #[test]
    fn test_single_outlier_gets_own_cohort() {
        let plots = vec![
            plot(1, 9, 5, 1.0, Some((0.0, 0.0))),
            plot(2, 9, 6, 1.0, Some((0.0, 0.0))),
            plot(3, 9, 5, 1.0, Some((0.0, 0.0))),
            plot(4, 9, 25, 1.0, Some((0.0, 0.0))),
        ];
        let outcome = reconcile_planting_windows(&[bucket(vec![0, 1, 2, 3])], &plots, 3);
        assert_eq!(outcome.sub_clusters.len(), 2);
        assert_eq!(outcome.sub_clusters[1].members, vec![3]);
        assert!(outcome.unplaced_outliers.contains(&3));
    }

    #[test]
    fn test_outlier_placed_on_retry_is_not_left_unplaced() {
        // Window around day 5 ejects day 1 and both day-20 plots; the kept
        // median drops to day 4, so day 1 rejoins the first cohort on the
        // second pass while the day-20 plots form their own cohort
        let days = [1, 4, 5, 20, 20];
        let plots: Vec<_> = days
            .iter()
            .enumerate()
            .map(|(n, &d)| plot(n as u128 + 1, 9, d, 1.0, Some((0.0, 0.0))))
            .collect();
        let outcome = reconcile_planting_windows(&[bucket(vec![0, 1, 2, 3, 4])], &plots, 3);

        assert_eq!(outcome.sub_clusters.len(), 2);
        assert_eq!(outcome.sub_clusters[0].members, vec![0, 1, 2]);
        assert_eq!(outcome.sub_clusters[0].median_date, date(4));
        assert_eq!(outcome.sub_clusters[1].members, vec![3, 4]);
        assert!(!outcome.unplaced_outliers.contains(&0));
        assert!(outcome.unplaced_outliers.contains(&3));
        assert!(outcome.unplaced_outliers.contains(&4));
    }

    #[test]
    fn test_closest_cohort_respects_tolerance() {
        let plots = vec![
            plot(1, 9, 5, 1.0, None),
            plot(2, 9, 15, 1.0, None),
        ];
        let cohorts = vec![
            SubCluster::new(0, id(9), vec![0], &plots, CohortOrigin::Primary).unwrap(),
            SubCluster::new(0, id(9), vec![1], &plots, CohortOrigin::DateOutliers).unwrap(),
        ];
        assert_eq!(closest_cohort(&cohorts, date(7), 3), Some(0));
        assert_eq!(closest_cohort(&cohorts, date(13), 3), Some(1));
        assert_eq!(closest_cohort(&cohorts, date(10), 3), None);
        // Equidistant: earliest cohort wins
        assert_eq!(closest_cohort(&cohorts, date(10), 5), Some(0));
    }
}
