//! Geometry capability used by the grouping engine
//!
//! The engine only talks to `PolygonOps`; `GeoPolygonOps` is the default
//! implementation on top of the `geo` crate. Coordinates are WGS84 lon/lat.
//! Union and hull operate directly in degrees (fine at village scale); distances
//! are haversine meters.

pub mod boundary;

use geo::{BooleanOps, Centroid, ConvexHull, HaversineDistance, MultiPolygon, Point, Polygon};
use serde_json::{json, Value};

pub use boundary::{parse_boundary, polygon_to_wkt};

/// Geometry operations needed by group formation
pub trait PolygonOps: Send + Sync {
    /// Union of all shapes; empty input yields an empty multipolygon
    fn union(&self, shapes: &[&MultiPolygon<f64>]) -> MultiPolygon<f64>;

    fn convex_hull(&self, shape: &MultiPolygon<f64>) -> Polygon<f64>;

    fn centroid(&self, shape: &MultiPolygon<f64>) -> Option<Point<f64>>;

    /// Distance in meters between two lon/lat points
    fn distance_m(&self, a: Point<f64>, b: Point<f64>) -> f64;
}

/// `PolygonOps` backed by the `geo` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoPolygonOps;

impl PolygonOps for GeoPolygonOps {
    fn union(&self, shapes: &[&MultiPolygon<f64>]) -> MultiPolygon<f64> {
        let mut iter = shapes.iter();
        let Some(first) = iter.next() else {
            return MultiPolygon::new(Vec::new());
        };
        iter.fold((*first).clone(), |acc, shape| acc.union(*shape))
    }

    fn convex_hull(&self, shape: &MultiPolygon<f64>) -> Polygon<f64> {
        shape.convex_hull()
    }

    fn centroid(&self, shape: &MultiPolygon<f64>) -> Option<Point<f64>> {
        shape.centroid()
    }

    fn distance_m(&self, a: Point<f64>, b: Point<f64>) -> f64 {
        a.haversine_distance(&b)
    }
}

/// Arithmetic mean of lon/lat points; adequate for plots a few km apart
pub fn mean_point<I>(points: I) -> Option<Point<f64>>
where
    I: IntoIterator<Item = Point<f64>>,
{
    let mut n = 0usize;
    let (mut sx, mut sy) = (0.0, 0.0);
    for p in points {
        sx += p.x();
        sy += p.y();
        n += 1;
    }
    (n > 0).then(|| Point::new(sx / n as f64, sy / n as f64))
}

/// GeoJSON geometry object for a polygon
pub fn polygon_to_geojson(polygon: &Polygon<f64>) -> Value {
    let mut rings = Vec::with_capacity(1 + polygon.interiors().len());
    rings.push(ring_coords(polygon.exterior()));
    for interior in polygon.interiors() {
        rings.push(ring_coords(interior));
    }
    json!({ "type": "Polygon", "coordinates": rings })
}

fn ring_coords(ring: &geo::LineString<f64>) -> Vec<[f64; 2]> {
    ring.coords().map(|c| [c.x, c.y]).collect()
}
