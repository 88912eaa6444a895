//! Grouping Parameters
//!
//! Caller-supplied, per-invocation configuration. Can be built in code, taken
//! from a request body, or loaded from a JSON parameter file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use anyhow::{Context, Result};

use crate::error::GroupingError;

/// What to do with a sub-cluster that stays below the minimum bounds after
/// merge attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UndersizedPolicy {
    /// Merge with a nearby compatible sibling, otherwise persist as an
    /// exception group flagged for manual review
    #[default]
    FlagException,
    /// Merge with the nearest same-variety, window-compatible sub-cluster
    /// anywhere in the cluster, ignoring distance
    ForceMerge,
    /// Merge if possible, otherwise report the plots as ungrouped
    LeaveUngrouped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupingParams {
    /// Meters between plot centroids for spatial adjacency
    pub proximity_threshold: f64,
    /// Days either side of the median planting date
    pub planting_date_tolerance: i64,
    /// Hectares
    pub min_group_area: f64,
    /// Hectares
    pub max_group_area: f64,
    pub min_plots_per_group: usize,
    pub max_plots_per_group: usize,
    pub undersized_policy: UndersizedPolicy,
    /// Preview only; echoed back to the caller
    pub include_empty_seasons: bool,
}

impl Default for GroupingParams {
    fn default() -> Self {
        Self {
            proximity_threshold: 500.0,
            planting_date_tolerance: 3,
            min_group_area: 5.0,
            max_group_area: 50.0,
            min_plots_per_group: 3,
            max_plots_per_group: 30,
            undersized_policy: UndersizedPolicy::FlagException,
            include_empty_seasons: false,
        }
    }
}

impl GroupingParams {
    /// Load parameters from a JSON file; missing fields take defaults
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read grouping parameters: {:?}", path))?;

        let params: GroupingParams = serde_json::from_str(&contents)
            .with_context(|| "Failed to parse grouping parameters JSON")?;

        params.validate()?;
        Ok(params)
    }

    /// Reject malformed parameter sets before any data is loaded
    pub fn validate(&self) -> Result<(), GroupingError> {
        if !self.proximity_threshold.is_finite() || self.proximity_threshold <= 0.0 {
            return Err(GroupingError::Validation(format!(
                "proximityThreshold must be a positive number of meters (got {})",
                self.proximity_threshold
            )));
        }
        if self.planting_date_tolerance < 0 {
            return Err(GroupingError::Validation(format!(
                "plantingDateTolerance must not be negative (got {})",
                self.planting_date_tolerance
            )));
        }
        if !self.min_group_area.is_finite() || !self.max_group_area.is_finite() {
            return Err(GroupingError::Validation("group area bounds must be finite".to_string()));
        }
        if self.min_group_area < 0.0 {
            return Err(GroupingError::Validation(format!(
                "minGroupArea must not be negative (got {})",
                self.min_group_area
            )));
        }
        if self.min_group_area > self.max_group_area {
            return Err(GroupingError::Validation(format!(
                "minGroupArea ({}) exceeds maxGroupArea ({})",
                self.min_group_area, self.max_group_area
            )));
        }
        if self.max_plots_per_group == 0 {
            return Err(GroupingError::Validation("maxPlotsPerGroup must be at least 1".to_string()));
        }
        if self.min_plots_per_group > self.max_plots_per_group {
            return Err(GroupingError::Validation(format!(
                "minPlotsPerGroup ({}) exceeds maxPlotsPerGroup ({})",
                self.min_plots_per_group, self.max_plots_per_group
            )));
        }
        Ok(())
    }
}
