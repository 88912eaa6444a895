//! Shared builders for the integration tests
//!
//! Plots are laid out in meters east/north of (105.0 E, 10.0 N) with a square
//! 15 m boundary; planting dates are days of January 2025.

#![allow(dead_code)]

use chrono::NaiveDate;
use rice_grouping::{
    CultivationSelection, GroupingParams, GroupingRequest, InMemoryFarmData, LonLat, PlotId, PlotRecord, PlotStatus,
    SupervisorId, SupervisorRecord, UndersizedPolicy,
};
use uuid::Uuid;

pub const YEAR: i32 = 2025;
const METERS_PER_DEGREE: f64 = 111_195.0;
const PLOT_SIDE_M: f64 = 15.0;

pub fn id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

pub fn cluster() -> Uuid {
    id(1)
}

pub fn season() -> Uuid {
    id(2)
}

pub fn variety_a() -> Uuid {
    id(3)
}

pub fn variety_b() -> Uuid {
    id(4)
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
}

fn to_lon_lat(east_m: f64, north_m: f64) -> (f64, f64) {
    let lat = 10.0 + north_m / METERS_PER_DEGREE;
    let lon = 105.0 + east_m / (METERS_PER_DEGREE * 10.0_f64.to_radians().cos());
    (lon, lat)
}

fn square_wkt(east_m: f64, north_m: f64) -> String {
    let (x0, y0) = to_lon_lat(east_m, north_m);
    let (x1, y1) = to_lon_lat(east_m + PLOT_SIDE_M, north_m + PLOT_SIDE_M);
    format!(
        "POLYGON(({x0} {y0}, {x1} {y0}, {x1} {y1}, {x0} {y1}, {x0} {y0}))",
        x0 = x0,
        y0 = y0,
        x1 = x1,
        y1 = y1
    )
}

/// Farm data for one cluster/season with two known varieties
pub struct Farm {
    pub data: InMemoryFarmData,
    next_plot: u128,
    next_supervisor: u128,
}

impl Farm {
    pub fn new() -> Self {
        let mut data = InMemoryFarmData::new();
        data.add_cluster(cluster())
            .add_season(season())
            .add_variety(variety_a())
            .add_variety(variety_b());
        Self {
            data,
            next_plot: 1000,
            next_supervisor: 9000,
        }
    }

    fn add(&mut self, variety: Uuid, day: u32, area: f64, at: Option<(f64, f64)>) -> PlotId {
        self.next_plot += 1;
        let plot_id = id(self.next_plot);
        let (boundary_wkt, centroid) = match at {
            Some((e, n)) => {
                let (lon, lat) = to_lon_lat(e + PLOT_SIDE_M / 2.0, n + PLOT_SIDE_M / 2.0);
                (Some(square_wkt(e, n)), Some(LonLat::new(lon, lat)))
            }
            None => (None, None),
        };
        self.data
            .add_plot(PlotRecord {
                id: plot_id,
                farmer_id: id(self.next_plot + 100_000),
                cluster_id: cluster(),
                farmer_active: true,
                status: PlotStatus::Active,
                area,
                soil_type: Some("Alluvial".to_string()),
                boundary_wkt,
                centroid,
                selection: None,
                grouped_this_season: false,
            })
            .add_selection(
                plot_id,
                season(),
                YEAR,
                CultivationSelection {
                    rice_variety_id: variety,
                    planting_date: date(day),
                    confirmed: true,
                },
            );
        plot_id
    }

    /// Plot with a boundary at (east, north) meters
    pub fn plot(&mut self, east_m: f64, north_m: f64, variety: Uuid, day: u32, area: f64) -> PlotId {
        self.add(variety, day, area, Some((east_m, north_m)))
    }

    pub fn plot_without_geometry(&mut self, variety: Uuid, day: u32, area: f64) -> PlotId {
        self.add(variety, day, area, None)
    }

    pub fn supervisor(&mut self, max_farmers: u32, current_farmers: u32, max_area: Option<f64>) -> SupervisorId {
        self.next_supervisor += 1;
        let supervisor_id = id(self.next_supervisor);
        self.data.add_supervisor(
            cluster(),
            SupervisorRecord {
                id: supervisor_id,
                name: format!("Supervisor {}", self.next_supervisor),
                max_farmer_capacity: max_farmers,
                current_farmer_count: current_farmers,
                max_area_capacity: max_area,
                current_total_area: 0.0,
            },
        );
        supervisor_id
    }
}

pub fn params(proximity_m: f64, tolerance_days: i64, min_plots: usize, max_plots: usize) -> GroupingParams {
    GroupingParams {
        proximity_threshold: proximity_m,
        planting_date_tolerance: tolerance_days,
        min_group_area: 0.0,
        max_group_area: 50.0,
        min_plots_per_group: min_plots,
        max_plots_per_group: max_plots,
        undersized_policy: UndersizedPolicy::FlagException,
        include_empty_seasons: false,
    }
}

pub fn request(params: GroupingParams) -> GroupingRequest {
    GroupingRequest::new(cluster(), season(), YEAR, params)
}

/// Deterministic mixed village: three varieties' worth of dates, a few plots without geometry
pub fn village(farm: &mut Farm, plots: usize) {
    for i in 0..plots {
        let variety = if i % 3 == 0 { variety_b() } else { variety_a() };
        let day = 1 + ((i * 7) % 15) as u32;
        let area = 0.5 + (i % 5) as f64 * 0.7;
        if i % 17 == 5 {
            farm.plot_without_geometry(variety, day, area);
        } else {
            let east = (i % 20) as f64 * 40.0 + if (i / 20) % 4 == 3 { 2000.0 } else { 0.0 };
            let north = (i / 20) as f64 * 40.0;
            farm.plot(east, north, variety, day, area);
        }
    }
}
