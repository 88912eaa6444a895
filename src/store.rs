//! Persistence collaborator (commit only)
//!
//! A commit runs inside one `GroupTransaction`: nothing it writes is visible
//! until `commit` succeeds, and a `rollback` (or a failed commit) leaves no
//! Group/GroupPlot rows behind. Membership is unique per (plot, season, year);
//! a violation is reported as `StoreError::UniqueViolation`.

use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::StoreError;
use crate::types::{Group, GroupPlot, PlotId, SeasonId, SupervisorId, SupervisorTotals};

pub trait GroupStore: Send + Sync {
    fn begin(&self) -> Result<Box<dyn GroupTransaction + '_>, StoreError>;
}

pub trait GroupTransaction {
    /// Plots among `plot_ids` that already belong to a group for (season, year)
    fn grouped_plots(&self, season_id: SeasonId, year: i32, plot_ids: &[PlotId]) -> Result<Vec<PlotId>, StoreError>;

    fn create_group(&mut self, group: &Group) -> Result<(), StoreError>;

    fn create_group_plot(&mut self, link: &GroupPlot) -> Result<(), StoreError>;

    fn update_supervisor_totals(&mut self, totals: &SupervisorTotals) -> Result<(), StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct StoreState {
    groups: Vec<Group>,
    group_plots: Vec<GroupPlot>,
    memberships: FxHashSet<(PlotId, SeasonId, i32)>,
    supervisor_totals: FxHashMap<SupervisorId, (u32, f64)>,
}

/// Store that applies a transaction's writes atomically at commit, under a lock
#[derive(Debug, Default)]
pub struct InMemoryGroupStore {
    state: Mutex<StoreState>,
}

impl InMemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Other(anyhow!("group store lock poisoned")))
    }

    pub fn groups(&self) -> Vec<Group> {
        self.lock().map(|s| s.groups.clone()).unwrap_or_default()
    }

    pub fn group_plots(&self) -> Vec<GroupPlot> {
        self.lock().map(|s| s.group_plots.clone()).unwrap_or_default()
    }

    /// Farmers and hectares added to a supervisor by committed groups
    pub fn supervisor_totals(&self, supervisor_id: SupervisorId) -> Option<(u32, f64)> {
        self.lock().ok().and_then(|s| s.supervisor_totals.get(&supervisor_id).copied())
    }
}

impl GroupStore for InMemoryGroupStore {
    fn begin(&self) -> Result<Box<dyn GroupTransaction + '_>, StoreError> {
        Ok(Box::new(InMemoryTransaction {
            store: self,
            groups: Vec::new(),
            group_plots: Vec::new(),
            pending: FxHashSet::default(),
            totals: Vec::new(),
        }))
    }
}

struct InMemoryTransaction<'a> {
    store: &'a InMemoryGroupStore,
    groups: Vec<Group>,
    group_plots: Vec<GroupPlot>,
    pending: FxHashSet<(PlotId, SeasonId, i32)>,
    totals: Vec<SupervisorTotals>,
}

impl GroupTransaction for InMemoryTransaction<'_> {
    fn grouped_plots(&self, season_id: SeasonId, year: i32, plot_ids: &[PlotId]) -> Result<Vec<PlotId>, StoreError> {
        let state = self.store.lock()?;
        Ok(plot_ids
            .iter()
            .copied()
            .filter(|&p| {
                let key = (p, season_id, year);
                state.memberships.contains(&key) || self.pending.contains(&key)
            })
            .collect())
    }

    fn create_group(&mut self, group: &Group) -> Result<(), StoreError> {
        self.groups.push(group.clone());
        Ok(())
    }

    fn create_group_plot(&mut self, link: &GroupPlot) -> Result<(), StoreError> {
        let key = (link.plot_id, link.season_id, link.year);
        if !self.pending.insert(key) {
            return Err(StoreError::UniqueViolation { plot_id: link.plot_id });
        }
        self.group_plots.push(*link);
        Ok(())
    }

    fn update_supervisor_totals(&mut self, totals: &SupervisorTotals) -> Result<(), StoreError> {
        self.totals.push(totals.clone());
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTransaction {
            store,
            groups,
            group_plots,
            pending,
            totals,
        } = *self;
        let mut state = store.lock()?;

        // Uniqueness is enforced here, as a database constraint would be
        if let Some(&(plot_id, _, _)) = pending.iter().find(|k| state.memberships.contains(*k)) {
            tracing::debug!("Commit rejected: plot {} already grouped for the season", plot_id);
            return Err(StoreError::UniqueViolation { plot_id });
        }

        state.memberships.extend(pending);
        state.groups.extend(groups);
        state.group_plots.extend(group_plots);
        for t in totals {
            let entry = state.supervisor_totals.entry(t.supervisor_id).or_insert((0, 0.0));
            entry.0 += t.farmers_added;
            entry.1 += t.area_added;
        }
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        tracing::debug!(
            "Rolled back transaction with {} groups and {} memberships",
            self.groups.len(),
            self.group_plots.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GroupStatus;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn group(n: u128) -> Group {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        Group {
            id: Uuid::from_u128(n),
            cluster_id: Uuid::from_u128(1),
            season_id: Uuid::from_u128(2),
            year: 2025,
            rice_variety_id: Uuid::from_u128(3),
            supervisor_id: None,
            planting_date: date,
            planting_window_start: date,
            planting_window_end: date,
            status: GroupStatus::Active,
            is_exception: false,
            exception_reason: None,
            total_area: 10.0,
            boundary_wkt: None,
        }
    }

    fn link(group: u128, plot: u128) -> GroupPlot {
        GroupPlot {
            group_id: Uuid::from_u128(group),
            plot_id: Uuid::from_u128(plot),
            season_id: Uuid::from_u128(2),
            year: 2025,
        }
    }

    #[test]
    fn test_writes_invisible_until_commit() {
        let store = InMemoryGroupStore::new();
        let mut tx = store.begin().unwrap();
        tx.create_group(&group(10)).unwrap();
        tx.create_group_plot(&link(10, 100)).unwrap();
        assert!(store.groups().is_empty());
        tx.commit().unwrap();
        assert_eq!(store.groups().len(), 1);
        assert_eq!(store.group_plots(), vec![link(10, 100)]);
    }

    #[test]
    fn test_rollback_discards_writes() {
        let store = InMemoryGroupStore::new();
        let mut tx = store.begin().unwrap();
        tx.create_group(&group(10)).unwrap();
        tx.create_group_plot(&link(10, 100)).unwrap();
        tx.rollback().unwrap();
        assert!(store.groups().is_empty());
        assert!(store.group_plots().is_empty());
    }

    #[test]
    fn test_second_commit_of_same_plot_is_rejected() {
        let store = InMemoryGroupStore::new();
        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();
        first.create_group(&group(10)).unwrap();
        first.create_group_plot(&link(10, 100)).unwrap();
        second.create_group(&group(11)).unwrap();
        second.create_group_plot(&link(11, 100)).unwrap();

        first.commit().unwrap();
        let err = second.commit().unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
        assert_eq!(store.groups().len(), 1);
        assert_eq!(store.group_plots().len(), 1);
    }

    #[test]
    fn test_duplicate_within_transaction_and_revalidation() {
        let store = InMemoryGroupStore::new();
        let mut tx = store.begin().unwrap();
        tx.create_group_plot(&link(10, 100)).unwrap();
        assert!(matches!(
            tx.create_group_plot(&link(11, 100)),
            Err(StoreError::UniqueViolation { .. })
        ));
        tx.commit().unwrap();

        let tx = store.begin().unwrap();
        let taken = tx
            .grouped_plots(Uuid::from_u128(2), 2025, &[Uuid::from_u128(100), Uuid::from_u128(101)])
            .unwrap();
        assert_eq!(taken, vec![Uuid::from_u128(100)]);
        let other_year = tx.grouped_plots(Uuid::from_u128(2), 2026, &[Uuid::from_u128(100)]).unwrap();
        assert!(other_year.is_empty());
    }

    #[test]
    fn test_supervisor_totals_accumulate() {
        let store = InMemoryGroupStore::new();
        let sup = Uuid::from_u128(7);
        for _ in 0..2 {
            let mut tx = store.begin().unwrap();
            tx.update_supervisor_totals(&SupervisorTotals {
                supervisor_id: sup,
                farmers_added: 3,
                area_added: 4.5,
            })
            .unwrap();
            tx.commit().unwrap();
        }
        assert_eq!(store.supervisor_totals(sup), Some((6, 9.0)));
    }
}
