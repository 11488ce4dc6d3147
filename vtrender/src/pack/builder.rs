//! Post-processing of packed geometry for lit and shadowed rendering.

use std::collections::BTreeMap;

use cgmath::{InnerSpace, Vector3};

use crate::{
    pack::{AttributeArray, IndexArray},
    util::math::TilePoint,
};

/// Duplicates vertices so that every index addresses its own vertex.
///
/// Afterwards `indices` is `0..n` and each attribute holds `n` elements. Returns the previous
/// indices, which identify the shared vertex each new vertex was copied from.
pub fn build_unique_vertex(
    attributes: &mut BTreeMap<String, AttributeArray>,
    indices: &mut Vec<u32>,
) -> Vec<u32> {
    for attribute in attributes.values_mut() {
        attribute.data = attribute.data.gather(attribute.width, indices);
    }

    let vertex_ids = std::mem::take(indices);
    indices.extend(0..vertex_ids.len() as u32);
    vertex_ids
}

/// Flat normals of a triangle list. `positions` holds three components per vertex.
///
/// The normal of a triangle is written to all three of its corners. Degenerate triangles get a
/// zero normal.
pub fn build_face_normals(positions: &[f64], indices: &[u32]) -> Vec<f32> {
    let mut normals = vec![0.0f32; positions.len()];
    let point = |i: u32| {
        let i = i as usize * 3;
        Vector3::new(positions[i], positions[i + 1], positions[i + 2])
    };

    for triangle in indices.chunks_exact(3) {
        let (p1, p2, p3) = (point(triangle[0]), point(triangle[1]), point(triangle[2]));
        let normal = (p2 - p1).cross(p2 - p3);
        let magnitude = normal.magnitude();
        let normal = if magnitude > 0.0 {
            normal / magnitude
        } else {
            Vector3::new(0.0, 0.0, 0.0)
        };

        for corner in triangle {
            let i = *corner as usize * 3;
            normals[i] = normal.x as f32;
            normals[i + 1] = normal.y as f32;
            normals[i + 2] = normal.z as f32;
        }
    }
    normals
}

/// Light facing caps of a shadow volume.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShadowVolume {
    /// Four components per vertex, `w` is always 1.
    pub vertices: Vec<f32>,
    pub indices: IndexArray,
    /// Index count after each feature.
    pub feature_ends: Vec<usize>,
}

/// Builds the light cap of the shadow volume of every feature.
///
/// `vertex_ids` maps every index position to the shared vertex it was made unique from, see
/// [`build_unique_vertex`]. `feature_ends` are the index counts after each feature. Only the
/// light cap is produced, side and back caps are not.
pub fn build_shadow_volume(
    positions: &[f64],
    vertex_ids: &[u32],
    indices: &[u32],
    normals: &[f32],
    feature_ends: &[usize],
    shadow_dir: [f64; 3],
) -> ShadowVolume {
    let shadow_dir = Vector3::from(shadow_dir);
    let mut vertices = Vec::new();
    let mut shadow_indices = Vec::new();
    let mut ends = Vec::with_capacity(feature_ends.len());

    let mut start = 0;
    for end in feature_ends.iter().map(|end| (*end).min(indices.len())) {
        let range = start.min(end)..end;
        let loops = feature_silhouette(
            positions,
            vertex_ids.get(range.clone()).unwrap_or_default(),
            &indices[range],
            normals,
            shadow_dir,
        );
        start = end.max(start);

        for silhouette in loops {
            let cap = triangulate_facing(&silhouette, shadow_dir);
            if cap.is_empty() {
                continue;
            }
            let base = (vertices.len() / 4) as u32;
            for point in &silhouette {
                vertices.extend([point[0] as f32, point[1] as f32, point[2] as f32, 1.0]);
            }
            shadow_indices.extend(cap.iter().map(|index| base + index));
        }
        ends.push(shadow_indices.len());
    }

    ShadowVolume {
        vertices,
        indices: IndexArray::from_indices(&shadow_indices),
        feature_ends: ends,
    }
}

/// Closed loops of silhouette edges among the triangles of one feature. `vertex_ids` runs
/// parallel to `indices`.
///
/// An edge is on the silhouette when exactly one of its two triangles faces the light. It is
/// taken in the winding of the lit triangle, so the edges chain head to tail.
fn feature_silhouette(
    positions: &[f64],
    vertex_ids: &[u32],
    indices: &[u32],
    normals: &[f32],
    shadow_dir: Vector3<f64>,
) -> Vec<Vec<TilePoint>> {
    let lit = |vertex: u32| {
        let i = vertex as usize * 3;
        let normal = Vector3::new(normals[i] as f64, normals[i + 1] as f64, normals[i + 2] as f64);
        normal.dot(shadow_dir) > 0.0
    };

    let mut points: BTreeMap<u32, TilePoint> = BTreeMap::new();
    // Undirected edge to the directed edges of the triangles sharing it.
    let mut edges: BTreeMap<(u32, u32), Vec<(bool, u32, u32)>> = BTreeMap::new();
    for (triangle, ids) in indices.chunks_exact(3).zip(vertex_ids.chunks_exact(3)) {
        let facing = lit(triangle[0]);
        for (corner, id) in triangle.iter().zip(ids) {
            let i = *corner as usize * 3;
            points
                .entry(*id)
                .or_insert([positions[i], positions[i + 1], positions[i + 2]]);
        }
        for (a, b) in [(0, 1), (1, 2), (2, 0)] {
            let (from, to) = (ids[a], ids[b]);
            edges
                .entry((from.min(to), from.max(to)))
                .or_default()
                .push((facing, from, to));
        }
    }

    let mut next: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for sides in edges.values() {
        if let [first, second] = sides.as_slice() {
            if first.0 != second.0 {
                let (_, from, to) = if first.0 { first } else { second };
                next.entry(*from).or_default().push(*to);
            }
        }
    }

    let mut loops = Vec::new();
    while let Some(start) = next
        .iter()
        .find(|(_, targets)| !targets.is_empty())
        .map(|(from, _)| *from)
    {
        let mut ids = vec![start];
        let mut current = start;
        let closed = loop {
            let Some(to) = next.get_mut(&current).and_then(Vec::pop) else {
                break false;
            };
            if to == start {
                break true;
            }
            ids.push(to);
            current = to;
        };

        if closed && ids.len() >= 3 {
            loops.push(ids.iter().filter_map(|id| points.get(id).copied()).collect());
        } else {
            log::debug!("dropping open silhouette chain of {} vertices", ids.len());
        }
    }
    loops
}

/// Ear clips a loop projected onto the plane perpendicular to `dir`.
fn triangulate_facing(silhouette: &[TilePoint], dir: Vector3<f64>) -> Vec<u32> {
    let Some(dir) = (dir.magnitude() > 0.0).then(|| dir.normalize()) else {
        return Vec::new();
    };
    let helper = if dir.z.abs() < 0.9 {
        Vector3::unit_z()
    } else {
        Vector3::unit_x()
    };
    let u = helper.cross(dir).normalize();
    let v = dir.cross(u);

    let coords: Vec<f64> = silhouette
        .iter()
        .flat_map(|point| {
            let point = Vector3::from(*point);
            [point.dot(u), point.dot(v)]
        })
        .collect();
    match earcutr::earcut(&coords, &[], 2) {
        Ok(indices) => indices.into_iter().map(|index| index as u32).collect(),
        Err(e) => {
            log::debug!("ear clipping the light cap failed: {e:?}");
            Vec::new()
        }
    }
}
