//! WKT reading and writing for plot and group boundaries
//!
//! Plot boundaries arrive as WKT (lon/lat, optionally with an EWKT `SRID=` prefix).
//! Only POLYGON and MULTIPOLYGON are meaningful for a field boundary; anything
//! else is a `GeometryError` and the plot is treated as having no geometry.

use std::str::FromStr;

use wkt::Wkt;
use geo::{Geometry, LineString, MultiPolygon, Polygon};

use crate::error::GeometryError;

/// Parse a plot boundary into a multipolygon (a POLYGON becomes a single part)
pub fn parse_boundary(text: &str) -> Result<MultiPolygon<f64>, GeometryError> {
    let mut text = text.trim();

    // EWKT: "SRID=4326;POLYGON((...))"
    if text.get(..5).is_some_and(|prefix| prefix.eq_ignore_ascii_case("SRID=")) {
        let semi = text
            .find(';')
            .ok_or_else(|| GeometryError::Malformed("SRID prefix without ';'".to_string()))?;
        text = text[semi + 1..].trim();
    }

    let tag_end = text
        .find(|c: char| c == '(' || c.is_whitespace())
        .unwrap_or(text.len());
    let tag = text[..tag_end].to_ascii_uppercase();
    match tag.as_str() {
        "POLYGON" | "MULTIPOLYGON" => {}
        "" => return Err(GeometryError::Malformed("missing geometry type".to_string())),
        other => return Err(GeometryError::UnsupportedType(other.to_string())),
    }
    let body = text[tag_end..].trim();
    if body.eq_ignore_ascii_case("EMPTY") {
        return Err(GeometryError::Empty);
    }

    let normalized = format!("{} {}", tag, body);
    let parsed = Wkt::<f64>::from_str(&normalized).map_err(|e| GeometryError::Malformed(e.to_string()))?;
    let polygons = match Geometry::<f64>::try_from(parsed).map_err(|e| GeometryError::Malformed(e.to_string()))? {
        Geometry::Polygon(polygon) => vec![polygon],
        Geometry::MultiPolygon(multi) => multi.0,
        _ => return Err(GeometryError::UnsupportedType(tag)),
    };

    if polygons.is_empty() {
        return Err(GeometryError::Empty);
    }
    for polygon in &polygons {
        check_ring(polygon.exterior())?;
        for interior in polygon.interiors() {
            check_ring(interior)?;
        }
    }
    Ok(MultiPolygon::new(polygons))
}

/// Rings come back closed from `Polygon::new`; a closed ring needs 4 points
fn check_ring(ring: &LineString<f64>) -> Result<(), GeometryError> {
    if ring.0.len() < 4 {
        return Err(GeometryError::RingTooShort(ring.0.len()));
    }
    if let Some(c) = ring.coords().find(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(GeometryError::Malformed(format!("non-finite coordinate ({} {})", c.x, c.y)));
    }
    Ok(())
}

/// Render a polygon as WKT, e.g. `POLYGON ((105.1 10.2, ...))`
pub fn polygon_to_wkt(polygon: &Polygon<f64>) -> String {
    let mut rings = Vec::with_capacity(1 + polygon.interiors().len());
    rings.push(ring_to_wkt(polygon.exterior()));
    for interior in polygon.interiors() {
        rings.push(ring_to_wkt(interior));
    }
    format!("POLYGON ({})", rings.join(", "))
}

fn ring_to_wkt(ring: &LineString<f64>) -> String {
    let coords: Vec<String> = ring
        .coords()
        .map(|c| format!("{} {}", c.x, c.y))
        .collect();
    format!("({})", coords.join(", "))
}
