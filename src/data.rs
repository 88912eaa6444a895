//! File-backed Farm Data
//!
//! Loads farm-management CSV exports from a directory with Polars and turns
//! them into an `InMemoryFarmData` provider:
//!
//! - `clusters.csv`     cluster_id
//! - `seasons.csv`      season_id
//! - `varieties.csv`    variety_id
//! - `plots.csv`        plot attributes (boundary as WKT, optional centroid)
//! - `selections.csv`   cultivation selection per (plot, season, year)
//! - `supervisors.csv`  supervisor capacity per cluster
//!
//! Every column is read as a string and parsed here, so exports with blank
//! cells or mixed types don't depend on schema inference.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

use crate::source::InMemoryFarmData;
use crate::types::{CultivationSelection, LonLat, PlotRecord, PlotStatus, SupervisorRecord};

pub const REQUIRED_PLOT_COLS: &[&str] = &["plot_id", "farmer_id", "cluster_id", "farmer_active", "status", "area"];

pub const REQUIRED_SELECTION_COLS: &[&str] = &["plot_id", "season_id", "year", "variety_id", "planting_date", "confirmed"];

pub const REQUIRED_SUPERVISOR_COLS: &[&str] = &[
    "supervisor_id",
    "cluster_id",
    "name",
    "max_farmer_capacity",
    "current_farmer_count",
    "current_total_area",
];

/// Raw frames as read from disk
pub struct FarmFrames {
    pub clusters: DataFrame,
    pub seasons: DataFrame,
    pub varieties: DataFrame,
    pub plots: DataFrame,
    pub selections: DataFrame,
    pub supervisors: DataFrame,
}

/// Load a data directory into an in-memory provider
pub fn load_farm_data(dir: &Path) -> Result<InMemoryFarmData> {
    FarmFrames::read_dir(dir)?.into_farm_data()
}

impl FarmFrames {
    pub fn read_dir(dir: &Path) -> Result<Self> {
        tracing::info!("Loading farm data from {:?}", dir);
        let frames = Self {
            clusters: read_csv(&dir.join("clusters.csv"))?,
            seasons: read_csv(&dir.join("seasons.csv"))?,
            varieties: read_csv(&dir.join("varieties.csv"))?,
            plots: read_csv(&dir.join("plots.csv"))?,
            selections: read_csv(&dir.join("selections.csv"))?,
            supervisors: read_csv(&dir.join("supervisors.csv"))?,
        };
        tracing::info!(
            "  clusters: {}, seasons: {}, varieties: {}, plots: {}, selections: {}, supervisors: {}",
            frames.clusters.height(),
            frames.seasons.height(),
            frames.varieties.height(),
            frames.plots.height(),
            frames.selections.height(),
            frames.supervisors.height()
        );
        Ok(frames)
    }

    pub fn into_farm_data(self) -> Result<InMemoryFarmData> {
        let mut data = InMemoryFarmData::new();

        for id in id_column(&self.clusters, "cluster_id", "clusters")? {
            data.add_cluster(id);
        }
        for id in id_column(&self.seasons, "season_id", "seasons")? {
            data.add_season(id);
        }
        for id in id_column(&self.varieties, "variety_id", "varieties")? {
            data.add_variety(id);
        }
        for record in plot_records(&self.plots)? {
            data.add_plot(record);
        }
        load_selections(&self.selections, &mut data)?;
        load_supervisors(&self.supervisors, &mut data)?;

        Ok(data)
    }
}

fn read_csv(path: &Path) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .with_context(|| format!("Failed to create CSV reader: {:?}", path))?
        .finish()
        .with_context(|| format!("Failed to load CSV: {:?}", path))
}

/// Fail early, listing what is there, when a required column is absent
fn require_columns(df: &DataFrame, columns: &[&str], context: &str) -> Result<()> {
    let actual: HashSet<String> = df.get_column_names().into_iter().map(|s| s.to_string()).collect();
    for &expected in columns {
        if !actual.contains(expected) {
            return Err(anyhow!(
                "{}: Missing expected column '{}'. Available columns: {:?}",
                context,
                expected,
                actual
            ));
        }
    }
    Ok(())
}

/// Column values as trimmed strings; blank cells become `None`
fn string_column(df: &DataFrame, name: &str, context: &str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .with_context(|| format!("{}: Column '{}' not found", context, name))?;
    let as_string = column
        .cast(&DataType::String)
        .with_context(|| format!("{}: Column '{}' cannot be read as text", context, name))?;
    let values = as_string
        .str()
        .with_context(|| format!("{}: Column '{}' is not string type", context, name))?;

    Ok(values
        .into_iter()
        .map(|v| v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string))
        .collect())
}

/// Like `string_column`, but an absent column reads as all blanks
fn optional_column(df: &DataFrame, name: &str, context: &str) -> Result<Vec<Option<String>>> {
    if df.get_column_names().iter().any(|c| c.as_str() == name) {
        string_column(df, name, context)
    } else {
        Ok(vec![None; df.height()])
    }
}

fn required<'a>(value: &'a Option<String>, column: &str, row: usize, context: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| anyhow!("{}: row {} has no value for '{}'", context, row + 1, column))
}

fn parse_uuid(value: &str, column: &str, row: usize, context: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("{}: row {} '{}' is not a UUID: {}", context, row + 1, column, value))
}

fn parse_f64(value: &str, column: &str, row: usize, context: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .with_context(|| format!("{}: row {} '{}' is not a number: {}", context, row + 1, column, value))
}

fn parse_u32(value: &str, column: &str, row: usize, context: &str) -> Result<u32> {
    value
        .parse::<u32>()
        .with_context(|| format!("{}: row {} '{}' is not a count: {}", context, row + 1, column, value))
}

fn parse_bool(value: &str, column: &str, row: usize, context: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(anyhow!("{}: row {} '{}' is not a boolean: {}", context, row + 1, column, value)),
    }
}

fn parse_date(value: &str, column: &str, row: usize, context: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("{}: row {} '{}' is not a YYYY-MM-DD date: {}", context, row + 1, column, value))
}

fn id_column(df: &DataFrame, name: &str, context: &str) -> Result<Vec<Uuid>> {
    require_columns(df, &[name], context)?;
    string_column(df, name, context)?
        .iter()
        .enumerate()
        .filter_map(|(row, v)| v.as_deref().map(|s| (row, s)))
        .map(|(row, s)| parse_uuid(s, name, row, context))
        .collect()
}

fn plot_records(df: &DataFrame) -> Result<Vec<PlotRecord>> {
    const CTX: &str = "plots";
    require_columns(df, REQUIRED_PLOT_COLS, CTX)?;

    let plot_ids = string_column(df, "plot_id", CTX)?;
    let farmer_ids = string_column(df, "farmer_id", CTX)?;
    let cluster_ids = string_column(df, "cluster_id", CTX)?;
    let farmer_active = string_column(df, "farmer_active", CTX)?;
    let statuses = string_column(df, "status", CTX)?;
    let areas = string_column(df, "area", CTX)?;
    let soil_types = optional_column(df, "soil_type", CTX)?;
    let boundaries = optional_column(df, "boundary_wkt", CTX)?;
    let lons = optional_column(df, "centroid_lon", CTX)?;
    let lats = optional_column(df, "centroid_lat", CTX)?;

    let mut records = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let status_text = required(&statuses[row], "status", row, CTX)?;
        let status = PlotStatus::parse(status_text)
            .ok_or_else(|| anyhow!("{}: row {} has unknown status '{}'", CTX, row + 1, status_text))?;

        let centroid = match (&lons[row], &lats[row]) {
            (Some(lon), Some(lat)) => Some(LonLat::new(
                parse_f64(lon, "centroid_lon", row, CTX)?,
                parse_f64(lat, "centroid_lat", row, CTX)?,
            )),
            _ => None,
        };

        records.push(PlotRecord {
            id: parse_uuid(required(&plot_ids[row], "plot_id", row, CTX)?, "plot_id", row, CTX)?,
            farmer_id: parse_uuid(required(&farmer_ids[row], "farmer_id", row, CTX)?, "farmer_id", row, CTX)?,
            cluster_id: parse_uuid(required(&cluster_ids[row], "cluster_id", row, CTX)?, "cluster_id", row, CTX)?,
            farmer_active: parse_bool(required(&farmer_active[row], "farmer_active", row, CTX)?, "farmer_active", row, CTX)?,
            status,
            area: parse_f64(required(&areas[row], "area", row, CTX)?, "area", row, CTX)?,
            soil_type: soil_types[row].clone(),
            boundary_wkt: boundaries[row].clone(),
            centroid,
            selection: None,
            grouped_this_season: false,
        });
    }
    Ok(records)
}

fn load_selections(df: &DataFrame, data: &mut InMemoryFarmData) -> Result<()> {
    const CTX: &str = "selections";
    require_columns(df, REQUIRED_SELECTION_COLS, CTX)?;

    let plot_ids = string_column(df, "plot_id", CTX)?;
    let season_ids = string_column(df, "season_id", CTX)?;
    let years = string_column(df, "year", CTX)?;
    let varieties = string_column(df, "variety_id", CTX)?;
    let dates = string_column(df, "planting_date", CTX)?;
    let confirmed = string_column(df, "confirmed", CTX)?;
    let grouped = optional_column(df, "grouped", CTX)?;

    for row in 0..df.height() {
        let plot_id = parse_uuid(required(&plot_ids[row], "plot_id", row, CTX)?, "plot_id", row, CTX)?;
        let season_id = parse_uuid(required(&season_ids[row], "season_id", row, CTX)?, "season_id", row, CTX)?;
        let year_text = required(&years[row], "year", row, CTX)?;
        let year: i32 = year_text
            .parse()
            .with_context(|| format!("{}: row {} 'year' is not a year: {}", CTX, row + 1, year_text))?;

        data.add_selection(
            plot_id,
            season_id,
            year,
            CultivationSelection {
                rice_variety_id: parse_uuid(required(&varieties[row], "variety_id", row, CTX)?, "variety_id", row, CTX)?,
                planting_date: parse_date(required(&dates[row], "planting_date", row, CTX)?, "planting_date", row, CTX)?,
                confirmed: parse_bool(required(&confirmed[row], "confirmed", row, CTX)?, "confirmed", row, CTX)?,
            },
        );

        if let Some(flag) = grouped[row].as_deref() {
            if parse_bool(flag, "grouped", row, CTX)? {
                data.mark_grouped(plot_id, season_id, year);
            }
        }
    }
    Ok(())
}

fn load_supervisors(df: &DataFrame, data: &mut InMemoryFarmData) -> Result<()> {
    const CTX: &str = "supervisors";
    require_columns(df, REQUIRED_SUPERVISOR_COLS, CTX)?;

    let ids = string_column(df, "supervisor_id", CTX)?;
    let clusters = string_column(df, "cluster_id", CTX)?;
    let names = string_column(df, "name", CTX)?;
    let max_farmers = string_column(df, "max_farmer_capacity", CTX)?;
    let current_farmers = string_column(df, "current_farmer_count", CTX)?;
    let max_area = optional_column(df, "max_area_capacity", CTX)?;
    let current_area = string_column(df, "current_total_area", CTX)?;

    for row in 0..df.height() {
        let cluster_id = parse_uuid(required(&clusters[row], "cluster_id", row, CTX)?, "cluster_id", row, CTX)?;
        let record = SupervisorRecord {
            id: parse_uuid(required(&ids[row], "supervisor_id", row, CTX)?, "supervisor_id", row, CTX)?,
            name: names[row].clone().unwrap_or_default(),
            max_farmer_capacity: parse_u32(
                required(&max_farmers[row], "max_farmer_capacity", row, CTX)?,
                "max_farmer_capacity",
                row,
                CTX,
            )?,
            current_farmer_count: parse_u32(
                required(&current_farmers[row], "current_farmer_count", row, CTX)?,
                "current_farmer_count",
                row,
                CTX,
            )?,
            max_area_capacity: max_area[row]
                .as_deref()
                .map(|v| parse_f64(v, "max_area_capacity", row, CTX))
                .transpose()?,
            current_total_area: parse_f64(
                required(&current_area[row], "current_total_area", row, CTX)?,
                "current_total_area",
                row,
                CTX,
            )?,
        };
        data.add_supervisor(cluster_id, record);
    }
    Ok(())
}
