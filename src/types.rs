//! Domain model for group formation
//!
//! Flat, denormalized records handed over by the farm-management and
//! supervisor-management collaborators, plus the Group/GroupPlot entities
//! written at commit time. The engine never holds tracked ORM entities;
//! everything here is plain data.

use chrono::NaiveDate;
use geo::Point;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PlotId = Uuid;
pub type FarmerId = Uuid;
pub type ClusterId = Uuid;
pub type SeasonId = Uuid;
pub type VarietyId = Uuid;
pub type SupervisorId = Uuid;
pub type GroupId = Uuid;

/// Lifecycle status of a plot in farmer management
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlotStatus {
    Active,
    PendingPolygon,
    Inactive,
    Archived,
}

impl PlotStatus {
    /// Parse the status names used in farm-management exports
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(PlotStatus::Active),
            "pendingpolygon" | "pending_polygon" | "pending" => Some(PlotStatus::PendingPolygon),
            "inactive" => Some(PlotStatus::Inactive),
            "archived" => Some(PlotStatus::Archived),
            _ => None,
        }
    }
}

/// WGS84 position (degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    pub fn to_point(self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }

    pub fn from_point(point: Point<f64>) -> Self {
        Self { lon: point.x(), lat: point.y() }
    }
}

/// Farmer's cultivation choice for a plot in one season/year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CultivationSelection {
    pub rice_variety_id: VarietyId,
    pub planting_date: NaiveDate,
    pub confirmed: bool,
}

/// Plot as returned by the plot provider for a (cluster, season, year)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotRecord {
    pub id: PlotId,
    pub farmer_id: FarmerId,
    pub cluster_id: ClusterId,
    pub farmer_active: bool,
    pub status: PlotStatus,
    /// Hectares
    pub area: f64,
    pub soil_type: Option<String>,
    /// Boundary polygon as WKT, lon/lat
    pub boundary_wkt: Option<String>,
    pub centroid: Option<LonLat>,
    pub selection: Option<CultivationSelection>,
    /// Already a member of a group for the requested season/year
    pub grouped_this_season: bool,
}

/// Supervisor capacity as reported by supervisor management
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorRecord {
    pub id: SupervisorId,
    pub name: String,
    pub max_farmer_capacity: u32,
    pub current_farmer_count: u32,
    pub max_area_capacity: Option<f64>,
    pub current_total_area: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupStatus {
    Draft,
    Active,
    Completed,
}

/// Group row created at commit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub cluster_id: ClusterId,
    pub season_id: SeasonId,
    pub year: i32,
    pub rice_variety_id: VarietyId,
    pub supervisor_id: Option<SupervisorId>,
    pub planting_date: NaiveDate,
    pub planting_window_start: NaiveDate,
    pub planting_window_end: NaiveDate,
    pub status: GroupStatus,
    pub is_exception: bool,
    pub exception_reason: Option<String>,
    pub total_area: f64,
    pub boundary_wkt: Option<String>,
}

/// Group membership row; unique per (plot, season, year)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPlot {
    pub group_id: GroupId,
    pub plot_id: PlotId,
    pub season_id: SeasonId,
    pub year: i32,
}

/// Running-total increment applied to a supervisor at commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorTotals {
    pub supervisor_id: SupervisorId,
    pub farmers_added: u32,
    pub area_added: f64,
}
