//! Clips polygon rings against the padded tile bounds.

use crate::util::math::{Aabb2, TilePoint};

#[derive(Clone, Copy)]
enum Edge {
    Left(f64),
    Right(f64),
    Top(f64),
    Bottom(f64),
}

impl Edge {
    fn inside(&self, point: &TilePoint) -> bool {
        match *self {
            Edge::Left(x) => point[0] >= x,
            Edge::Right(x) => point[0] <= x,
            Edge::Top(y) => point[1] >= y,
            Edge::Bottom(y) => point[1] <= y,
        }
    }

    fn intersect(&self, a: &TilePoint, b: &TilePoint) -> TilePoint {
        let t = match *self {
            Edge::Left(x) | Edge::Right(x) => (x - a[0]) / (b[0] - a[0]),
            Edge::Top(y) | Edge::Bottom(y) => (y - a[1]) / (b[1] - a[1]),
        };
        let mut point = [
            a[0] + (b[0] - a[0]) * t,
            a[1] + (b[1] - a[1]) * t,
            a[2] + (b[2] - a[2]) * t,
        ];
        // Snap onto the edge to avoid drift from the division.
        match *self {
            Edge::Left(x) | Edge::Right(x) => point[0] = x,
            Edge::Top(y) | Edge::Bottom(y) => point[1] = y,
        }
        point
    }
}

/// Sutherland-Hodgman clipping of a ring. Altitudes are interpolated along clipped edges.
pub fn clip_polygon(ring: &[TilePoint], bounds: &Aabb2) -> Vec<TilePoint> {
    let edges = [
        Edge::Left(bounds.min.x),
        Edge::Right(bounds.max.x),
        Edge::Top(bounds.min.y),
        Edge::Bottom(bounds.max.y),
    ];

    let mut output = ring.to_vec();
    for edge in edges {
        let Some(&last) = output.last() else {
            break;
        };
        let input = std::mem::take(&mut output);

        let mut previous = last;
        for current in input {
            match (edge.inside(&previous), edge.inside(&current)) {
                (true, true) => output.push(current),
                (true, false) => output.push(edge.intersect(&previous, &current)),
                (false, true) => {
                    output.push(edge.intersect(&previous, &current));
                    output.push(current);
                }
                (false, false) => {}
            }
            previous = current;
        }
    }
    output
}

/// Drops the closing point of a ring which repeats its first point.
pub fn strip_closing_point(mut ring: Vec<TilePoint>) -> Vec<TilePoint> {
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}
