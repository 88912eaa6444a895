//! Read-side collaborators
//!
//! Farm management (plots, cultivation selections) and supervisor management
//! are external systems; the engine only sees them through `FarmDataSource`,
//! which hands back flat, pre-materialized records.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::SourceError;
use crate::types::{
    ClusterId, CultivationSelection, PlotId, PlotRecord, SeasonId, SupervisorRecord, VarietyId,
};

pub trait FarmDataSource: Send + Sync {
    fn cluster_exists(&self, cluster_id: ClusterId) -> Result<bool, SourceError>;

    fn season_exists(&self, season_id: SeasonId) -> Result<bool, SourceError>;

    fn variety_exists(&self, variety_id: VarietyId) -> Result<bool, SourceError>;

    /// Plots of a cluster with their selection and grouped flag for (season, year)
    fn list_plots(
        &self,
        cluster_id: ClusterId,
        season_id: SeasonId,
        year: i32,
    ) -> Result<Vec<PlotRecord>, SourceError>;

    fn list_supervisors(&self, cluster_id: ClusterId) -> Result<Vec<SupervisorRecord>, SourceError>;
}

/// In-memory farm data, used by tests, benches and the file-backed loader
#[derive(Debug, Clone, Default)]
pub struct InMemoryFarmData {
    clusters: FxHashSet<ClusterId>,
    seasons: FxHashSet<SeasonId>,
    varieties: FxHashSet<VarietyId>,
    /// Season-independent plot attributes
    plots: Vec<PlotRecord>,
    selections: FxHashMap<(PlotId, SeasonId, i32), CultivationSelection>,
    grouped: FxHashSet<(PlotId, SeasonId, i32)>,
    supervisors: Vec<(ClusterId, SupervisorRecord)>,
}

impl InMemoryFarmData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cluster(&mut self, cluster_id: ClusterId) -> &mut Self {
        self.clusters.insert(cluster_id);
        self
    }

    pub fn add_season(&mut self, season_id: SeasonId) -> &mut Self {
        self.seasons.insert(season_id);
        self
    }

    pub fn add_variety(&mut self, variety_id: VarietyId) -> &mut Self {
        self.varieties.insert(variety_id);
        self
    }

    /// Add a plot; any `selection`/`grouped_this_season` on the record is ignored
    pub fn add_plot(&mut self, mut record: PlotRecord) -> &mut Self {
        record.selection = None;
        record.grouped_this_season = false;
        self.plots.push(record);
        self
    }

    pub fn add_selection(
        &mut self,
        plot_id: PlotId,
        season_id: SeasonId,
        year: i32,
        selection: CultivationSelection,
    ) -> &mut Self {
        self.selections.insert((plot_id, season_id, year), selection);
        self
    }

    pub fn mark_grouped(&mut self, plot_id: PlotId, season_id: SeasonId, year: i32) -> &mut Self {
        self.grouped.insert((plot_id, season_id, year));
        self
    }

    pub fn add_supervisor(&mut self, cluster_id: ClusterId, record: SupervisorRecord) -> &mut Self {
        self.supervisors.push((cluster_id, record));
        self
    }

    pub fn plot_count(&self) -> usize {
        self.plots.len()
    }
}

impl FarmDataSource for InMemoryFarmData {
    fn cluster_exists(&self, cluster_id: ClusterId) -> Result<bool, SourceError> {
        Ok(self.clusters.contains(&cluster_id))
    }

    fn season_exists(&self, season_id: SeasonId) -> Result<bool, SourceError> {
        Ok(self.seasons.contains(&season_id))
    }

    fn variety_exists(&self, variety_id: VarietyId) -> Result<bool, SourceError> {
        Ok(self.varieties.contains(&variety_id))
    }

    fn list_plots(
        &self,
        cluster_id: ClusterId,
        season_id: SeasonId,
        year: i32,
    ) -> Result<Vec<PlotRecord>, SourceError> {
        Ok(self
            .plots
            .iter()
            .filter(|p| p.cluster_id == cluster_id)
            .map(|p| {
                let key = (p.id, season_id, year);
                PlotRecord {
                    selection: self.selections.get(&key).cloned(),
                    grouped_this_season: self.grouped.contains(&key),
                    ..p.clone()
                }
            })
            .collect())
    }

    fn list_supervisors(&self, cluster_id: ClusterId) -> Result<Vec<SupervisorRecord>, SourceError> {
        let mut supervisors: Vec<SupervisorRecord> = self
            .supervisors
            .iter()
            .filter(|(c, _)| *c == cluster_id)
            .map(|(_, s)| s.clone())
            .collect();
        supervisors.sort_by_key(|s| s.id);
        Ok(supervisors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlotStatus;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn record(n: u128, cluster: u128) -> PlotRecord {
        PlotRecord {
            id: Uuid::from_u128(n),
            farmer_id: Uuid::from_u128(100 + n),
            cluster_id: Uuid::from_u128(cluster),
            farmer_active: true,
            status: PlotStatus::Active,
            area: 1.0,
            soil_type: None,
            boundary_wkt: None,
            centroid: None,
            selection: None,
            grouped_this_season: false,
        }
    }

    #[test]
    fn test_selection_and_grouped_flag_are_per_season() {
        let season_a = Uuid::from_u128(50);
        let season_b = Uuid::from_u128(51);
        let selection = CultivationSelection {
            rice_variety_id: Uuid::from_u128(9),
            planting_date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            confirmed: true,
        };

        let mut data = InMemoryFarmData::new();
        data.add_cluster(Uuid::from_u128(1))
            .add_plot(record(1, 1))
            .add_plot(record(2, 2))
            .add_selection(Uuid::from_u128(1), season_a, 2025, selection.clone())
            .mark_grouped(Uuid::from_u128(1), season_b, 2025);

        let a = data.list_plots(Uuid::from_u128(1), season_a, 2025).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].selection.as_ref(), Some(&selection));
        assert!(!a[0].grouped_this_season);

        let b = data.list_plots(Uuid::from_u128(1), season_b, 2025).unwrap();
        assert!(b[0].selection.is_none());
        assert!(b[0].grouped_this_season);

        assert!(data.cluster_exists(Uuid::from_u128(1)).unwrap());
        assert!(!data.cluster_exists(Uuid::from_u128(2)).unwrap());
    }
}
