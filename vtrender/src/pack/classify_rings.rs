//! Groups the rings of a polygon feature into outer rings and their holes.

use crate::{
    pack::PackError,
    util::math::{ring_plane, signed_area, TilePoint, AREA_EPSILON},
};

/// A polygon: the outer ring first, followed by its holes.
pub type RingGroup<'a> = Vec<&'a [TilePoint]>;

/// Splits `rings` into polygons. The winding of the first ring defines outer rings, rings with
/// the opposite winding are holes of the preceding outer ring. Rings without area are dropped.
///
/// Winding is measured in the first plane in which a ring has an area, so that vertical
/// geometry is classified as well. Polygons with more than `max_rings` rings keep their
/// outer ring and the largest holes.
pub fn classify_rings(
    rings: &[Vec<TilePoint>],
    max_rings: usize,
) -> Result<Vec<RingGroup<'_>>, PackError> {
    if rings
        .iter()
        .flatten()
        .any(|point| point.iter().any(|c| !c.is_finite()))
    {
        return Err(PackError::InvalidCoordinate);
    }

    let Some(plane) = rings.iter().find_map(|ring| ring_plane(ring)) else {
        return Ok(Vec::new());
    };

    let mut polygons: Vec<Vec<(&[TilePoint], f64)>> = Vec::new();
    let mut polygon: Vec<(&[TilePoint], f64)> = Vec::new();
    let mut outer_winding = None;

    for ring in rings {
        let area = signed_area(ring, plane);
        if area.abs() <= AREA_EPSILON {
            continue;
        }

        let negative = area < 0.0;
        let outer_negative = *outer_winding.get_or_insert(negative);

        if negative == outer_negative {
            if !polygon.is_empty() {
                polygons.push(std::mem::take(&mut polygon));
            }
            polygon.push((ring.as_slice(), area));
        } else {
            polygon.push((ring.as_slice(), area));
        }
    }
    if !polygon.is_empty() {
        polygons.push(polygon);
    }

    Ok(polygons
        .into_iter()
        .map(|mut polygon| {
            if max_rings > 1 && polygon.len() > max_rings {
                polygon[1..].sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
                polygon.truncate(max_rings);
            }
            polygon.into_iter().map(|(ring, _)| ring).collect()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use crate::{pack::classify_rings::classify_rings, util::math::TilePoint};

    fn square(x: f64, y: f64, size: f64, clockwise: bool) -> Vec<TilePoint> {
        let mut ring = vec![
            [x, y, 0.0],
            [x + size, y, 0.0],
            [x + size, y + size, 0.0],
            [x, y + size, 0.0],
        ];
        if !clockwise {
            ring.reverse();
        }
        ring
    }

    #[test]
    fn test_outer_rings_and_holes() {
        let rings = vec![
            square(0.0, 0.0, 100.0, true),
            square(10.0, 10.0, 10.0, false),
            square(200.0, 0.0, 50.0, true),
        ];

        let polygons = classify_rings(&rings, 500).unwrap();
        assert_eq!(polygons.len(), 2);
        assert_eq!(polygons[0].len(), 2);
        assert_eq!(polygons[1].len(), 1);
    }

    #[test]
    fn test_ring_limit_keeps_largest_holes() {
        let rings = vec![
            square(0.0, 0.0, 100.0, true),
            square(10.0, 10.0, 2.0, false),
            square(30.0, 30.0, 20.0, false),
            square(60.0, 60.0, 5.0, false),
        ];

        let polygons = classify_rings(&rings, 3).unwrap();
        assert_eq!(polygons[0].len(), 3);
        assert_eq!(polygons[0][1][0], [30.0, 30.0, 0.0]);
        assert_eq!(polygons[0][2][0], [60.0, 60.0, 0.0]);
    }

    #[test]
    fn test_degenerate_and_invalid_rings() {
        let line = vec![vec![[0.0, 0.0, 0.0], [1.0, 1.0, 0.0], [2.0, 2.0, 0.0]]];
        assert!(classify_rings(&line, 500).unwrap().is_empty());

        let invalid = vec![vec![[0.0, 0.0, 0.0], [f64::NAN, 1.0, 0.0], [2.0, 0.0, 0.0]]];
        assert!(classify_rings(&invalid, 500).is_err());
    }
}
