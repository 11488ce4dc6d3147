use cgmath::Point2;

/// Tile-local point with an optional altitude in `z`.
pub type TilePoint = [f64; 3];

/// Areas below this are treated as degenerate when projecting rings onto a plane.
pub const AREA_EPSILON: f64 = 1e-9;

/// Axis-aligned planes rings are projected onto before triangulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectionPlane {
    XY,
    XZ,
    YZ,
}

impl ProjectionPlane {
    /// Planes in the order they are tried when a projection is degenerate.
    pub const FALLBACK_ORDER: [ProjectionPlane; 3] =
        [ProjectionPlane::XY, ProjectionPlane::XZ, ProjectionPlane::YZ];

    pub fn project(&self, point: &TilePoint) -> [f64; 2] {
        match self {
            ProjectionPlane::XY => [point[0], point[1]],
            ProjectionPlane::XZ => [point[0], point[2]],
            ProjectionPlane::YZ => [point[1], point[2]],
        }
    }
}

/// Twice the signed area of the ring projected onto `plane` (shoelace formula).
pub fn signed_area(ring: &[TilePoint], plane: ProjectionPlane) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }

    let mut sum = 0.0;
    let mut previous = plane.project(&ring[ring.len() - 1]);
    for point in ring {
        let current = plane.project(point);
        sum += (previous[0] - current[0]) * (current[1] + previous[1]);
        previous = current;
    }
    sum
}

/// The first plane in fallback order in which the ring is not degenerate.
pub fn ring_plane(ring: &[TilePoint]) -> Option<ProjectionPlane> {
    ProjectionPlane::FALLBACK_ORDER
        .into_iter()
        .find(|plane| signed_area(ring, *plane).abs() > AREA_EPSILON)
}

/// An axis aligned bounding box in two dimensions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb2 {
    pub min: Point2<f64>,
    pub max: Point2<f64>,
}

impl Aabb2 {
    pub fn new(min: Point2<f64>, max: Point2<f64>) -> Self {
        Self { min, max }
    }

    /// Bounds of a tile of `extent` units, grown by `padding` on every side.
    pub fn padded_extent(extent: f64, padding: f64) -> Self {
        Self::new(
            Point2::new(-padding, -padding),
            Point2::new(extent + padding, extent + padding),
        )
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min.x && x <= self.max.x && y >= self.min.y && y <= self.max.y
    }
}
