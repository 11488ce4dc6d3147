//! Packs styled tile features into numeric vertex and index buffers.
//!
//! Every pack writes a base layout of `aPosition` and `aPickingId`. Style properties which vary
//! per feature add further attributes, literal and zoom-dependent properties are left to the
//! painters, which push them as uniforms.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod builder;
pub mod classify_rings;
pub mod clip;
pub mod line;
pub mod polygon;
pub mod styled_vector;
pub mod triangulate;

pub use styled_vector::{create_styled_vector, FeatureStyle, StyledVector};

pub const A_POSITION: &str = "aPosition";
pub const A_PICKING_ID: &str = "aPickingId";
pub const A_COLOR: &str = "aColor";
pub const A_OPACITY: &str = "aOpacity";
pub const A_UV_SCALE: &str = "aUVScale";
pub const A_UV_OFFSET: &str = "aUVOffset";
pub const A_TEX_INFO: &str = "aTexInfo";
pub const A_EXTRUDE: &str = "aExtrude";
pub const A_LINE_WIDTH: &str = "aLineWidth";

/// Auxiliary index array with the outline edges of polygons.
pub const LINE_INDICES: &str = "lineIndices";

/// Upper bound of rings kept per polygon, the outer ring included.
pub const MAX_RINGS: usize = 500;

#[derive(Error, Debug)]
pub enum PackError {
    #[error("style property `{property}` has malformed value {value}")]
    MalformedProperty {
        property: &'static str,
        value: String,
    },
    #[error("feature has non-finite coordinates")]
    InvalidCoordinate,
    #[error("tessellating line failed: {0}")]
    Tessellation(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumericType {
    U8,
    U16,
    U32,
    I16,
    F32,
}

impl NumericType {
    pub fn byte_size(&self) -> usize {
        match self {
            NumericType::U8 => 1,
            NumericType::U16 | NumericType::I16 => 2,
            NumericType::U32 | NumericType::F32 => 4,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AttributeData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    I16(Vec<i16>),
    F32(Vec<f32>),
}

impl AttributeData {
    /// Converts values with the saturating semantics of `as` casts.
    pub fn encode(numeric_type: NumericType, values: &[f64]) -> Self {
        match numeric_type {
            NumericType::U8 => AttributeData::U8(values.iter().map(|v| *v as u8).collect()),
            NumericType::U16 => AttributeData::U16(values.iter().map(|v| *v as u16).collect()),
            NumericType::U32 => AttributeData::U32(values.iter().map(|v| *v as u32).collect()),
            NumericType::I16 => AttributeData::I16(values.iter().map(|v| *v as i16).collect()),
            NumericType::F32 => AttributeData::F32(values.iter().map(|v| *v as f32).collect()),
        }
    }

    pub fn numeric_type(&self) -> NumericType {
        match self {
            AttributeData::U8(_) => NumericType::U8,
            AttributeData::U16(_) => NumericType::U16,
            AttributeData::U32(_) => NumericType::U32,
            AttributeData::I16(_) => NumericType::I16,
            AttributeData::F32(_) => NumericType::F32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AttributeData::U8(values) => values.len(),
            AttributeData::U16(values) => values.len(),
            AttributeData::U32(values) => values.len(),
            AttributeData::I16(values) => values.len(),
            AttributeData::F32(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> Option<f64> {
        match self {
            AttributeData::U8(values) => values.get(i).map(|v| *v as f64),
            AttributeData::U16(values) => values.get(i).map(|v| *v as f64),
            AttributeData::U32(values) => values.get(i).map(|v| *v as f64),
            AttributeData::I16(values) => values.get(i).map(|v| *v as f64),
            AttributeData::F32(values) => values.get(i).map(|v| *v as f64),
        }
    }

    /// Raw bytes as they are uploaded to a vertex buffer.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AttributeData::U8(values) => values.as_slice(),
            AttributeData::U16(values) => bytemuck::cast_slice(values),
            AttributeData::U32(values) => bytemuck::cast_slice(values),
            AttributeData::I16(values) => bytemuck::cast_slice(values),
            AttributeData::F32(values) => bytemuck::cast_slice(values),
        }
    }

    /// Copies `width` sized elements in the order given by `indices`.
    pub fn gather(&self, width: usize, indices: &[u32]) -> Self {
        fn gather<T: Copy>(values: &[T], width: usize, indices: &[u32]) -> Vec<T> {
            let mut gathered = Vec::with_capacity(indices.len() * width);
            for index in indices {
                let start = *index as usize * width;
                gathered.extend_from_slice(&values[start..start + width]);
            }
            gathered
        }

        match self {
            AttributeData::U8(values) => AttributeData::U8(gather(values, width, indices)),
            AttributeData::U16(values) => AttributeData::U16(gather(values, width, indices)),
            AttributeData::U32(values) => AttributeData::U32(gather(values, width, indices)),
            AttributeData::I16(values) => AttributeData::I16(gather(values, width, indices)),
            AttributeData::F32(values) => AttributeData::F32(gather(values, width, indices)),
        }
    }
}

/// A named vertex attribute: `width` components per vertex.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeArray {
    pub width: usize,
    pub data: AttributeData,
}

impl AttributeArray {
    pub fn vertex_count(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.data.len() / self.width
        }
    }

    pub fn vertex(&self, i: usize) -> Vec<f64> {
        (i * self.width..(i + 1) * self.width)
            .filter_map(|component| self.data.get(component))
            .collect()
    }
}

/// Element width of an index array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexWidth {
    U8,
    U16,
    U32,
}

impl IndexWidth {
    /// 1 byte up to 256 elements, 2 bytes up to 65536, 4 bytes beyond.
    pub fn for_count(count: usize) -> Self {
        if count <= 1 << 8 {
            IndexWidth::U8
        } else if count <= 1 << 16 {
            IndexWidth::U16
        } else {
            IndexWidth::U32
        }
    }

    /// Width of an index array, chosen from its element count. Widened when the largest index
    /// does not fit the chosen width.
    pub fn for_indices(indices: &[u32]) -> Self {
        let by_count = Self::for_count(indices.len());
        let max = indices.iter().copied().max().unwrap_or(0);
        let by_value = if max <= u8::MAX as u32 {
            IndexWidth::U8
        } else if max <= u16::MAX as u32 {
            IndexWidth::U16
        } else {
            IndexWidth::U32
        };
        if by_value.byte_size() > by_count.byte_size() {
            log::debug!(
                "index array of {} elements widened to hold index {max}",
                indices.len()
            );
            by_value
        } else {
            by_count
        }
    }

    pub fn byte_size(&self) -> usize {
        match self {
            IndexWidth::U8 => 1,
            IndexWidth::U16 => 2,
            IndexWidth::U32 => 4,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum IndexArray {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl Default for IndexArray {
    fn default() -> Self {
        IndexArray::U8(Vec::new())
    }
}

impl IndexArray {
    pub fn new(indices: &[u32], width: IndexWidth) -> Self {
        match width {
            IndexWidth::U8 => IndexArray::U8(indices.iter().map(|i| *i as u8).collect()),
            IndexWidth::U16 => IndexArray::U16(indices.iter().map(|i| *i as u16).collect()),
            IndexWidth::U32 => IndexArray::U32(indices.to_vec()),
        }
    }

    pub fn from_indices(indices: &[u32]) -> Self {
        Self::new(indices, IndexWidth::for_indices(indices))
    }

    pub fn width(&self) -> IndexWidth {
        match self {
            IndexArray::U8(_) => IndexWidth::U8,
            IndexArray::U16(_) => IndexWidth::U16,
            IndexArray::U32(_) => IndexWidth::U32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexArray::U8(indices) => indices.len(),
            IndexArray::U16(indices) => indices.len(),
            IndexArray::U32(indices) => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<u32> {
        match self {
            IndexArray::U8(indices) => indices.iter().map(|i| *i as u32).collect(),
            IndexArray::U16(indices) => indices.iter().map(|i| *i as u32).collect(),
            IndexArray::U32(indices) => indices.clone(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            IndexArray::U8(indices) => indices.as_slice(),
            IndexArray::U16(indices) => bytemuck::cast_slice(indices),
            IndexArray::U32(indices) => bytemuck::cast_slice(indices),
        }
    }
}

/// Output of a pack call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackedTileBuffer {
    pub vertex_count: usize,
    pub attributes: BTreeMap<String, AttributeArray>,
    pub indices: IndexArray,
    #[serde(default)]
    pub aux_indices: BTreeMap<String, IndexArray>,
}

impl PackedTileBuffer {
    pub fn attribute(&self, name: &str) -> Option<&AttributeArray> {
        self.attributes.get(name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Every attribute holds exactly `vertex_count` elements and every index addresses a vertex.
    pub fn is_consistent(&self) -> bool {
        self.attributes
            .values()
            .all(|attribute| attribute.data.len() == self.vertex_count * attribute.width)
            && self
                .indices
                .to_vec()
                .iter()
                .all(|index| (*index as usize) < self.vertex_count)
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Layout of an icon atlas from which fill and line patterns are sampled.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IconAtlas {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub positions: BTreeMap<String, IconPosition>,
}

impl IconAtlas {
    pub fn exceeds_u8(&self) -> bool {
        self.width > 255 || self.height > 255
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IconPosition {
    /// Top left corner in the atlas, in pixels.
    pub tl: [f64; 2],
    pub display_size: [f64; 2],
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PackOptions {
    pub max_rings: usize,
    /// Clip polygons to the tile bounds, padded by one unit.
    pub clip_to_tile: bool,
    /// Emit outline edges of polygons into [`LINE_INDICES`].
    pub line_elements: bool,
    /// Flattening tolerance of line strokes, in tile units.
    pub line_tolerance: f32,
    pub atlas: Option<IconAtlas>,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            max_rings: MAX_RINGS,
            clip_to_tile: true,
            line_elements: false,
            line_tolerance: 0.5,
            atlas: None,
        }
    }
}

/// Numeric type of an attribute, some are only decided once all values are known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeType {
    Fixed(NumericType),
    /// `i16` when every coordinate is integral and fits, `f32` otherwise.
    Position,
    /// Narrowest unsigned type holding the largest picking id.
    PickingId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeFormat {
    pub name: &'static str,
    pub width: usize,
    pub attribute_type: AttributeType,
}

impl AttributeFormat {
    pub const fn new(name: &'static str, width: usize, attribute_type: AttributeType) -> Self {
        Self {
            name,
            width,
            attribute_type,
        }
    }
}

/// Lengths of a [`VertexWriter`] at some point, used to undo a failed feature.
pub struct Checkpoint {
    vertex_count: usize,
    indices: usize,
    aux: Vec<(&'static str, usize)>,
}

/// Accumulates vertices in the layout given by a list of [`AttributeFormat`]s.
pub struct VertexWriter {
    formats: Vec<AttributeFormat>,
    stride: usize,
    values: Vec<f64>,
    vertex_count: usize,
    indices: Vec<u32>,
    aux: BTreeMap<&'static str, Vec<u32>>,
}

impl VertexWriter {
    pub fn new(formats: Vec<AttributeFormat>) -> Self {
        let stride = formats.iter().map(|format| format.width).sum();
        Self {
            formats,
            stride,
            values: Vec::new(),
            vertex_count: 0,
            indices: Vec::new(),
            aux: BTreeMap::new(),
        }
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count as u32
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Appends one vertex. `values` holds the components of all attributes in format order.
    pub fn push_vertex(&mut self, values: &[f64]) {
        debug_assert_eq!(values.len(), self.stride);
        self.values.extend_from_slice(values);
        self.vertex_count += 1;
    }

    /// Appends triangle indices relative to `base`.
    pub fn push_elements(&mut self, base: u32, elements: &[u32]) {
        self.indices
            .extend(elements.iter().map(|element| base + element));
    }

    pub fn push_aux(&mut self, name: &'static str, a: u32, b: u32) {
        self.aux.entry(name).or_default().extend([a, b]);
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            vertex_count: self.vertex_count,
            indices: self.indices.len(),
            aux: self
                .aux
                .iter()
                .map(|(name, indices)| (*name, indices.len()))
                .collect(),
        }
    }

    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.vertex_count = checkpoint.vertex_count;
        self.values.truncate(checkpoint.vertex_count * self.stride);
        self.indices.truncate(checkpoint.indices);
        for (name, indices) in &mut self.aux {
            let len = checkpoint
                .aux
                .iter()
                .find(|(aux_name, _)| aux_name == name)
                .map_or(0, |(_, len)| *len);
            indices.truncate(len);
        }
        self.aux.retain(|_, indices| !indices.is_empty());
    }

    /// Splits the interleaved staging values into typed attribute arrays.
    pub fn finish(self) -> Option<PackedTileBuffer> {
        if self.vertex_count == 0 || self.indices.is_empty() {
            return None;
        }

        let mut attributes = BTreeMap::new();
        let mut offset = 0;
        for format in &self.formats {
            let mut values = Vec::with_capacity(self.vertex_count * format.width);
            for vertex in self.values.chunks_exact(self.stride) {
                values.extend_from_slice(&vertex[offset..offset + format.width]);
            }
            offset += format.width;

            let numeric_type = match format.attribute_type {
                AttributeType::Fixed(numeric_type) => numeric_type,
                AttributeType::Position => position_type(&values),
                AttributeType::PickingId => picking_id_type(&values),
            };
            attributes.insert(
                format.name.to_owned(),
                AttributeArray {
                    width: format.width,
                    data: AttributeData::encode(numeric_type, &values),
                },
            );
        }

        Some(PackedTileBuffer {
            vertex_count: self.vertex_count,
            attributes,
            indices: IndexArray::from_indices(&self.indices),
            aux_indices: self
                .aux
                .iter()
                .map(|(name, indices)| (name.to_string(), IndexArray::from_indices(indices)))
                .collect(),
        })
    }
}

fn position_type(values: &[f64]) -> NumericType {
    let fits = values.iter().all(|value| {
        value.fract() == 0.0 && *value >= i16::MIN as f64 && *value <= i16::MAX as f64
    });
    if fits {
        NumericType::I16
    } else {
        NumericType::F32
    }
}

fn picking_id_type(values: &[f64]) -> NumericType {
    let max = values.iter().copied().fold(0.0, f64::max);
    if max <= u8::MAX as f64 {
        NumericType::U8
    } else if max <= u16::MAX as f64 {
        NumericType::U16
    } else {
        NumericType::F32
    }
}

/// A packer for one kind of geometry.
pub trait VectorPack {
    /// Attribute layout, base attributes first.
    fn format(&self) -> Vec<AttributeFormat>;

    /// Writes the vertices and elements of one feature.
    fn place_vector(
        &self,
        vector: &StyledVector<'_>,
        scale: f64,
        writer: &mut VertexWriter,
    ) -> Result<(), PackError>;

    /// Packs all vectors. A feature which fails is dropped without affecting the others.
    fn pack(&self, vectors: &[StyledVector<'_>], scale: f64) -> Option<PackedTileBuffer> {
        let mut writer = VertexWriter::new(self.format());
        for vector in vectors {
            let checkpoint = writer.checkpoint();
            if let Err(e) = self.place_vector(vector, scale, &mut writer) {
                log::warn!(
                    "dropping feature {:?} (picking id {}): {e}",
                    vector.feature.id,
                    vector.picking_id
                );
                writer.rollback(checkpoint);
            }
        }
        writer.finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::pack::{
        AttributeData, AttributeFormat, AttributeType, IndexArray, IndexWidth, NumericType,
        VertexWriter, A_COLOR, A_PICKING_ID, A_POSITION, LINE_INDICES,
    };

    #[test]
    fn test_index_width_boundaries() {
        assert_eq!(IndexWidth::for_count(0), IndexWidth::U8);
        assert_eq!(IndexWidth::for_count(256), IndexWidth::U8);
        assert_eq!(IndexWidth::for_count(257), IndexWidth::U16);
        assert_eq!(IndexWidth::for_count(65536), IndexWidth::U16);
        assert_eq!(IndexWidth::for_count(65537), IndexWidth::U32);
        assert_eq!(IndexWidth::for_count(1 << 20).byte_size(), 4);
    }

    #[test]
    fn test_index_array_width() {
        let indices: Vec<u32> = (0..300).collect();
        let array = IndexArray::from_indices(&indices);
        assert_eq!(array.width(), IndexWidth::U16);
        assert_eq!(array.as_bytes().len(), 600);
        assert_eq!(array.to_vec(), indices);
    }

    #[test]
    fn test_short_index_arrays_widen_for_large_indices() {
        assert_eq!(IndexWidth::for_indices(&[0, 1, 2]), IndexWidth::U8);
        assert_eq!(IndexWidth::for_indices(&[0, 299, 300]), IndexWidth::U16);
        assert_eq!(IndexWidth::for_indices(&[70_000]), IndexWidth::U32);
        assert_eq!(IndexArray::from_indices(&[298, 299]).to_vec(), vec![298, 299]);
    }

    fn writer() -> VertexWriter {
        VertexWriter::new(vec![
            AttributeFormat::new(A_POSITION, 3, AttributeType::Position),
            AttributeFormat::new(A_PICKING_ID, 1, AttributeType::PickingId),
            AttributeFormat::new(A_COLOR, 4, AttributeType::Fixed(NumericType::U8)),
        ])
    }

    #[test]
    fn test_writer_splits_attributes() {
        let mut writer = writer();
        writer.push_vertex(&[0.0, 0.0, 0.0, 1.0, 255.0, 0.0, 0.0, 255.0]);
        writer.push_vertex(&[10.0, 0.0, 0.0, 1.0, 255.0, 0.0, 0.0, 255.0]);
        writer.push_vertex(&[10.0, 10.0, 0.0, 1.0, 255.0, 0.0, 0.0, 255.0]);
        writer.push_elements(0, &[0, 1, 2]);

        let buffer = writer.finish().unwrap();
        assert!(buffer.is_consistent());
        assert_eq!(buffer.vertex_count, 3);
        assert_eq!(
            buffer.attributes[A_POSITION].data,
            AttributeData::I16(vec![0, 0, 0, 10, 0, 0, 10, 10, 0])
        );
        assert_eq!(buffer.attributes[A_PICKING_ID].data.numeric_type(), NumericType::U8);
        assert_eq!(buffer.attributes[A_COLOR].data.len(), 12);
    }

    #[test]
    fn test_fractional_positions_use_f32() {
        let mut writer = writer();
        writer.push_vertex(&[0.5, 0.0, 0.0, 300.0, 0.0, 0.0, 0.0, 0.0]);
        writer.push_vertex(&[1.0, 0.0, 0.0, 300.0, 0.0, 0.0, 0.0, 0.0]);
        writer.push_vertex(&[1.0, 1.0, 0.0, 300.0, 0.0, 0.0, 0.0, 0.0]);
        writer.push_elements(0, &[0, 1, 2]);

        let buffer = writer.finish().unwrap();
        assert_eq!(buffer.attributes[A_POSITION].data.numeric_type(), NumericType::F32);
        assert_eq!(buffer.attributes[A_PICKING_ID].data.numeric_type(), NumericType::U16);
    }

    #[test]
    fn test_rollback_discards_feature() {
        let mut writer = writer();
        for x in [0.0, 1.0, 2.0] {
            writer.push_vertex(&[x, x, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        }
        writer.push_elements(0, &[0, 1, 2]);

        let checkpoint = writer.checkpoint();
        writer.push_vertex(&[5.0, 5.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
        writer.push_elements(3, &[0, 0, 0]);
        writer.push_aux(LINE_INDICES, 3, 3);
        writer.rollback(checkpoint);

        let buffer = writer.finish().unwrap();
        assert_eq!(buffer.vertex_count, 3);
        assert_eq!(buffer.indices.to_vec(), vec![0, 1, 2]);
        assert!(buffer.aux_indices.is_empty());
        assert!(buffer.is_consistent());
    }
}
