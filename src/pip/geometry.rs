//! Geometry repair and test-point selection.
//!
//! Some sources encode holes as separate parts of a multipolygon instead of
//! interior rings. Parts wound counter-clockwise are holes and parts wound
//! clockwise are shells; [`sanitize`] subtracts each hole from the shells
//! that contain it.

use geo::orient::{Direction, Orient};
use geo::{
    Area, BooleanOps, Centroid, Contains, InteriorPoint, MultiPolygon, Point, Polygon, Winding,
};

use crate::models::BoundaryShape;

/// Rebuild a shape so holes encoded as separate parts are subtracted from
/// their shells.
///
/// Polygons pass through unchanged. Hole parts that no shell contains are
/// kept as they are, so well-formed counter-clockwise data is untouched.
/// Applying this twice gives the same result as applying it once.
pub fn sanitize(shape: &BoundaryShape) -> BoundaryShape {
    match shape {
        BoundaryShape::Polygon(polygon) => BoundaryShape::Polygon(polygon.clone()),
        BoundaryShape::MultiPolygon(multi) => BoundaryShape::MultiPolygon(sanitize_parts(multi)),
    }
}

fn is_hole(part: &Polygon<f64>) -> bool {
    part.exterior().is_ccw()
}

fn sanitize_parts(multi: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    let (holes, shells): (Vec<&Polygon<f64>>, Vec<&Polygon<f64>>) =
        multi.0.iter().partition(|part| is_hole(part));

    if holes.is_empty() || shells.is_empty() {
        return multi.clone();
    }

    let mut parts = Vec::with_capacity(multi.0.len());
    for part in &multi.0 {
        if is_hole(part) {
            if !shells.iter().any(|shell| shell.contains(part)) {
                parts.push(part.clone());
            }
            continue;
        }

        let inside: Vec<&&Polygon<f64>> = holes.iter().filter(|hole| part.contains(**hole)).collect();
        if inside.is_empty() {
            parts.push(part.clone());
            continue;
        }

        let mut carved = MultiPolygon::new(vec![part.clone()]);
        for hole in inside {
            carved = carved.difference(*hole);
        }
        parts.extend(carved.orient(Direction::Reversed));
    }

    MultiPolygon::new(parts)
}

/// The point a shape is tested at when looking up containing regions.
///
/// The shape is sanitized first and only the largest part of a multipolygon
/// is considered. Its centroid is used when it falls inside the part,
/// otherwise an interior point.
pub fn representative_point(shape: &BoundaryShape) -> Option<Point<f64>> {
    match sanitize(shape) {
        BoundaryShape::Polygon(polygon) => polygon_point(&polygon),
        BoundaryShape::MultiPolygon(multi) => {
            let largest = multi.0.iter().max_by(|a, b| {
                a.unsigned_area()
                    .partial_cmp(&b.unsigned_area())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })?;
            polygon_point(largest)
        }
    }
}

fn polygon_point(polygon: &Polygon<f64>) -> Option<Point<f64>> {
    match polygon.centroid() {
        Some(centroid) if polygon.contains(&centroid) => Some(centroid),
        _ => polygon.interior_point(),
    }
}

/// Whether `point` lies strictly inside `shape`.
pub fn shape_contains(shape: &BoundaryShape, point: &Point<f64>) -> bool {
    match shape {
        BoundaryShape::Polygon(polygon) => polygon.contains(point),
        BoundaryShape::MultiPolygon(multi) => multi.contains(point),
    }
}
