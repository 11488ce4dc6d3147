//! Packs line features into stroke triangles with per-vertex extrusion.

use lyon::{
    geom::point,
    path::Path,
    tessellation::{
        BuffersBuilder, StrokeOptions, StrokeTessellator, StrokeVertex, StrokeVertexConstructor,
        VertexBuffers,
    },
};

use crate::{
    pack::{
        AttributeFormat, AttributeType, NumericType, PackError, PackOptions, StyledVector,
        VectorPack, VertexWriter, A_COLOR, A_EXTRUDE, A_LINE_WIDTH, A_OPACITY, A_PICKING_ID,
        A_POSITION,
    },
    style::symbol::{is_feature_function, LineSymbol},
};

/// Lines are tessellated at unit width, painters scale the extrusion by the line width.
const UNIT_LINE_WIDTH: f32 = 1.0;

/// Per-feature line widths are stored as unsigned 16 bit tenths of a pixel.
pub const LINE_WIDTH_SCALE: f64 = 10.0;

#[derive(Clone, Copy, Debug)]
struct LineVertex {
    position: [f32; 2],
    normal: [f32; 2],
    altitude: f32,
}

struct LineVertexConstructor;

impl StrokeVertexConstructor<LineVertex> for LineVertexConstructor {
    fn new_vertex(&mut self, mut vertex: StrokeVertex) -> LineVertex {
        let altitude = vertex.interpolated_attributes().first().copied().unwrap_or(0.0);
        LineVertex {
            position: vertex.position_on_path().to_array(),
            normal: vertex.normal().to_array(),
            altitude,
        }
    }
}

pub struct LinePack<'a> {
    options: &'a PackOptions,
    has_color: bool,
    has_opacity: bool,
    has_width: bool,
}

impl<'a> LinePack<'a> {
    pub fn new(symbol: &LineSymbol, options: &'a PackOptions) -> Self {
        Self {
            options,
            has_color: is_feature_function(&symbol.line_color),
            has_opacity: is_feature_function(&symbol.line_opacity),
            has_width: is_feature_function(&symbol.line_width),
        }
    }

    fn tessellate(&self, vector: &StyledVector<'_>) -> Result<VertexBuffers<LineVertex, u32>, PackError> {
        let mut builder = Path::builder_with_attributes(1);
        let mut has_segments = false;
        for line in &vector.feature.geometry {
            if line.iter().flatten().any(|c| !c.is_finite()) {
                return Err(PackError::InvalidCoordinate);
            }
            let Some((first, rest)) = line.split_first() else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }

            builder.begin(point(first[0] as f32, first[1] as f32), &[first[2] as f32]);
            for p in rest {
                builder.line_to(point(p[0] as f32, p[1] as f32), &[p[2] as f32]);
            }
            builder.end(false);
            has_segments = true;
        }

        let mut buffers = VertexBuffers::new();
        if !has_segments {
            return Ok(buffers);
        }

        let options = StrokeOptions::tolerance(self.options.line_tolerance)
            .with_line_width(UNIT_LINE_WIDTH);
        StrokeTessellator::new()
            .tessellate_path(
                &builder.build(),
                &options,
                &mut BuffersBuilder::new(&mut buffers, LineVertexConstructor),
            )
            .map_err(|e| PackError::Tessellation(format!("{e:?}")))?;
        Ok(buffers)
    }
}

impl VectorPack for LinePack<'_> {
    fn format(&self) -> Vec<AttributeFormat> {
        let mut format = vec![
            AttributeFormat::new(A_POSITION, 3, AttributeType::Position),
            AttributeFormat::new(A_PICKING_ID, 1, AttributeType::PickingId),
            AttributeFormat::new(A_EXTRUDE, 2, AttributeType::Fixed(NumericType::F32)),
        ];
        if self.has_color {
            format.push(AttributeFormat::new(A_COLOR, 4, AttributeType::Fixed(NumericType::U8)));
        }
        if self.has_opacity {
            format.push(AttributeFormat::new(A_OPACITY, 1, AttributeType::Fixed(NumericType::U8)));
        }
        if self.has_width {
            format.push(AttributeFormat::new(A_LINE_WIDTH, 1, AttributeType::Fixed(NumericType::U16)));
        }
        format
    }

    fn place_vector(
        &self,
        vector: &StyledVector<'_>,
        scale: f64,
        writer: &mut VertexWriter,
    ) -> Result<(), PackError> {
        let buffers = self.tessellate(vector)?;
        if buffers.indices.is_empty() {
            return Ok(());
        }

        let style = &vector.style;
        let mut style_values = Vec::new();
        if self.has_color {
            let color = style.color.unwrap_or([0.0, 0.0, 0.0, 1.0]);
            style_values.extend(color.iter().map(|c| (*c as f64 * 255.0).round()));
        }
        if self.has_opacity {
            style_values.push(style.opacity.unwrap_or(1.0) * 255.0);
        }
        if self.has_width {
            style_values.push((style.line_width.unwrap_or(1.0) * LINE_WIDTH_SCALE).round());
        }

        let base = writer.vertex_count();
        let mut values = Vec::with_capacity(writer.stride());
        for vertex in &buffers.vertices {
            values.clear();
            values.extend([
                vertex.position[0] as f64 * scale,
                vertex.position[1] as f64 * scale,
                vertex.altitude as f64,
                vector.picking_id as f64,
                vertex.normal[0] as f64,
                vertex.normal[1] as f64,
            ]);
            values.extend_from_slice(&style_values);
            writer.push_vertex(&values);
        }
        writer.push_elements(base, &buffers.indices);

        Ok(())
    }
}
