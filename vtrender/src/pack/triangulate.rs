//! Ear clipping of flattened 3D ring sets.

use crate::util::math::{signed_area, ProjectionPlane, TilePoint, AREA_EPSILON};

/// Triangulates an outer ring followed by holes starting at `holes`.
///
/// Rings are projected to XY first. When the projection is degenerate or ear clipping yields no
/// triangle, XZ and then YZ are tried. An empty result means the rings have no area in any of
/// the planes.
pub fn triangulate(points: &[TilePoint], holes: &[usize]) -> Vec<u32> {
    if points.len() < 3 {
        return Vec::new();
    }
    let outer_end = holes.first().copied().unwrap_or(points.len());

    for plane in ProjectionPlane::FALLBACK_ORDER {
        if signed_area(&points[..outer_end], plane).abs() <= AREA_EPSILON {
            continue;
        }

        let coords: Vec<f64> = points.iter().flat_map(|p| plane.project(p)).collect();
        match earcutr::earcut(&coords, holes, 2) {
            Ok(indices) if !indices.is_empty() => {
                if plane != ProjectionPlane::XY {
                    log::debug!("triangulated {} points in the {plane:?} plane", points.len());
                }
                return indices.into_iter().map(|index| index as u32).collect();
            }
            Ok(_) => {}
            Err(e) => log::debug!("ear clipping in the {plane:?} plane failed: {e:?}"),
        }
    }

    Vec::new()
}
