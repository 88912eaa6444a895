//! STAGE 7: GROUP GEOMETRY
//!
//! Unions the boundaries of each group's plots. A single-polygon union is used
//! as-is; a union with disjoint parts (plots close by centroid whose
//! boundaries don't touch) falls back to its convex hull, which is for display
//! only. Group area is always the sum of plot areas, never the area of the
//! reported boundary.
//!
//! Groups share no mutable state, so they are aggregated in parallel.

use geo::{MultiPolygon, Point, Polygon};
use rayon::prelude::*;

use crate::geometry::PolygonOps;
use crate::stages::CandidatePlot;

#[derive(Debug, Clone)]
pub struct GroupGeometry {
    /// `None` when no member plot has geometry
    pub boundary: Option<Polygon<f64>>,
    /// Boundary is the convex hull of a multi-part union
    pub is_hull: bool,
    pub centroid: Option<Point<f64>>,
    /// Sum of member plot areas (hectares)
    pub total_area: f64,
    pub plots_with_geometry: usize,
}

pub fn aggregate_geometry(
    groups: &[&[usize]],
    plots: &[CandidatePlot],
    ops: &dyn PolygonOps,
) -> Vec<GroupGeometry> {
    groups
        .par_iter()
        .map(|members| aggregate_one(members, plots, ops))
        .collect()
}

fn aggregate_one(members: &[usize], plots: &[CandidatePlot], ops: &dyn PolygonOps) -> GroupGeometry {
    let total_area = members.iter().map(|&i| plots[i].area).sum();
    let shapes: Vec<&MultiPolygon<f64>> = members
        .iter()
        .filter_map(|&i| plots[i].boundary.as_ref())
        .collect();

    let union = ops.union(&shapes);
    let (boundary, is_hull) = match union.0.len() {
        0 => (None, false),
        1 => (union.0.into_iter().next(), false),
        _ => (Some(ops.convex_hull(&union)), true),
    };

    let centroid = boundary
        .as_ref()
        .and_then(|polygon| ops.centroid(&MultiPolygon::new(vec![polygon.clone()])));

    GroupGeometry {
        boundary,
        is_hull,
        centroid,
        total_area,
        plots_with_geometry: shapes.len(),
    }
}
