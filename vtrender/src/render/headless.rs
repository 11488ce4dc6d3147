//! A software implementation of [`GpuBackend`].
//!
//! Triangles are rasterized at pixel centers into an RGBA color buffer and an 8 bit stencil
//! buffer. Every pixel is shaded at most once per draw call, so shared triangle edges are not
//! blended twice. Colors are flat per triangle, taken from its first vertex. Patterns are not
//! sampled.

use std::collections::HashMap;

use cgmath::{Matrix4, Vector4};

use crate::{
    pack::{
        line::LINE_WIDTH_SCALE, A_COLOR, A_EXTRUDE, A_LINE_WIDTH, A_OPACITY, A_PICKING_ID,
        A_POSITION,
    },
    render::{
        backend::{
            BackendError, DrawCommand, DrawGeometry, FrameUniforms, GpuBackend, RenderTarget,
            Shading, StencilTest, TargetId,
        },
        mesh::{defines, Mesh, ShaderKind},
        picking::encode_id,
    },
};

struct Canvas {
    width: u32,
    height: u32,
    color: Vec<[f32; 4]>,
    stencil: Vec<u8>,
}

impl Canvas {
    fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            color: vec![[0.0; 4]; len],
            stencil: vec![0; len],
        }
    }
}

/// A vertex after projection to pixel space, with the color of its triangle.
#[derive(Clone, Copy)]
struct ScreenVertex {
    x: f64,
    y: f64,
}

pub struct HeadlessBackend {
    screen: Canvas,
    offscreen: HashMap<TargetId, Canvas>,
    next_target: TargetId,
    draw_calls: usize,
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            screen: Canvas::new(width, height),
            offscreen: HashMap::new(),
            next_target: 1,
            draw_calls: 0,
        }
    }

    /// Number of draw calls submitted so far.
    pub fn draw_calls(&self) -> usize {
        self.draw_calls
    }

    /// Stencil value of a pixel.
    pub fn stencil_at(&self, target: RenderTarget, x: u32, y: u32) -> Result<u8, BackendError> {
        let canvas = self.canvas(target)?;
        if x >= canvas.width || y >= canvas.height {
            return Err(BackendError::OutOfBounds {
                x,
                y,
                width: 1,
                height: 1,
            });
        }
        Ok(canvas.stencil[(y * canvas.width + x) as usize])
    }

    fn canvas(&self, target: RenderTarget) -> Result<&Canvas, BackendError> {
        match target {
            RenderTarget::Screen => Ok(&self.screen),
            RenderTarget::Offscreen(id) => self
                .offscreen
                .get(&id)
                .ok_or(BackendError::UnknownTarget(target)),
        }
    }

    fn canvas_mut(&mut self, target: RenderTarget) -> Result<&mut Canvas, BackendError> {
        match target {
            RenderTarget::Screen => Ok(&mut self.screen),
            RenderTarget::Offscreen(id) => self
                .offscreen
                .get_mut(&id)
                .ok_or(BackendError::UnknownTarget(target)),
        }
    }
}

impl GpuBackend for HeadlessBackend {
    fn create_render_target(&mut self, width: u32, height: u32) -> TargetId {
        let id = self.next_target;
        self.next_target += 1;
        self.offscreen.insert(id, Canvas::new(width, height));
        id
    }

    fn resize_render_target(
        &mut self,
        target: RenderTarget,
        width: u32,
        height: u32,
    ) -> Result<(), BackendError> {
        *self.canvas_mut(target)? = Canvas::new(width, height);
        Ok(())
    }

    fn destroy_render_target(&mut self, target: TargetId) {
        self.offscreen.remove(&target);
    }

    fn clear(
        &mut self,
        target: RenderTarget,
        color: Option<[f32; 4]>,
        stencil: Option<u32>,
    ) -> Result<(), BackendError> {
        let canvas = self.canvas_mut(target)?;
        if let Some(color) = color {
            canvas.color.fill(color);
        }
        if let Some(stencil) = stencil {
            canvas.stencil.fill(stencil as u8);
        }
        Ok(())
    }

    fn submit_draw(&mut self, command: &DrawCommand<'_>) -> Result<(), BackendError> {
        self.draw_calls += 1;
        let canvas = self.canvas_mut(command.target)?;
        let mut rasterizer = Rasterizer::new(canvas, command);

        match command.geometry {
            DrawGeometry::TileQuad { transform, extent } => {
                let corners = [[0.0, 0.0], [extent, 0.0], [extent, extent], [0.0, extent]]
                    .map(|[x, y]| rasterizer.project(&transform, [x, y, 0.0]));
                rasterizer.triangle([corners[0], corners[1], corners[2]], [1.0; 4]);
                rasterizer.triangle([corners[0], corners[2], corners[3]], [1.0; 4]);
            }
            DrawGeometry::Mesh(mesh) => rasterizer.mesh(mesh)?,
        }
        Ok(())
    }

    fn read_pixels(
        &self,
        target: RenderTarget,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, BackendError> {
        let canvas = self.canvas(target)?;
        if x + width > canvas.width || y + height > canvas.height {
            return Err(BackendError::OutOfBounds {
                x,
                y,
                width,
                height,
            });
        }

        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for row in y..y + height {
            for column in x..x + width {
                let color = canvas.color[(row * canvas.width + column) as usize];
                pixels.extend(color.map(|c| (c * 255.0).round().clamp(0.0, 255.0) as u8));
            }
        }
        Ok(pixels)
    }
}

struct Rasterizer<'a> {
    canvas: &'a mut Canvas,
    frame: &'a FrameUniforms,
    stencil: Option<StencilTest>,
    color_write: bool,
    shading: Shading,
    visited: Vec<bool>,
}

impl<'a> Rasterizer<'a> {
    fn new(canvas: &'a mut Canvas, command: &DrawCommand<'a>) -> Self {
        let len = canvas.color.len();
        Self {
            canvas,
            frame: command.frame,
            stencil: command.stencil,
            color_write: command.color_write,
            shading: command.shading,
            visited: vec![false; len],
        }
    }

    fn project(&self, model: &Matrix4<f64>, position: [f64; 3]) -> ScreenVertex {
        let clip = self.frame.proj_view
            * model
            * Vector4::new(position[0], position[1], position[2], 1.0);
        let w = if clip.w.abs() > f64::EPSILON { clip.w } else { 1.0 };
        ScreenVertex {
            x: (clip.x / w + 1.0) / 2.0 * self.canvas.width as f64,
            y: (1.0 - clip.y / w) / 2.0 * self.canvas.height as f64,
        }
    }

    fn mesh(&mut self, mesh: &Mesh) -> Result<(), BackendError> {
        let buffer = &mesh.buffer;
        let positions = buffer
            .attribute(A_POSITION)
            .ok_or(BackendError::MissingAttribute(A_POSITION))?;
        let picking_ids = buffer
            .attribute(A_PICKING_ID)
            .ok_or(BackendError::MissingAttribute(A_PICKING_ID))?;

        let mut vertices = Vec::with_capacity(buffer.vertex_count);
        for i in 0..buffer.vertex_count {
            let position = positions.vertex(i);
            let [x, y, z] = [position[0], position[1], position[2]];
            let mut vertex = self.project(&mesh.local_transform, [x, y, z]);

            if mesh.shader == ShaderKind::Line {
                let extrude = buffer
                    .attribute(A_EXTRUDE)
                    .ok_or(BackendError::MissingAttribute(A_EXTRUDE))?
                    .vertex(i);
                let width = if mesh.has_define(defines::HAS_LINE_WIDTH) {
                    attribute_value(mesh, A_LINE_WIDTH, i, 0)
                        .map_or(1.0, |width| width / LINE_WIDTH_SCALE)
                } else {
                    mesh.material.float("lineWidth").unwrap_or(1.0)
                };
                let half_width = width / 2.0;
                vertex.x += extrude[0] * half_width + mesh.material.float("lineDx").unwrap_or(0.0);
                vertex.y += extrude[1] * half_width + mesh.material.float("lineDy").unwrap_or(0.0);
            }
            vertices.push(vertex);
        }

        for triangle in buffer.indices.to_vec().chunks_exact(3) {
            let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
            if a >= vertices.len() || b >= vertices.len() || c >= vertices.len() {
                continue;
            }
            let color = match self.shading {
                Shading::Color => material_color(mesh, a),
                Shading::Picking { base_id } => {
                    let picking_id = picking_ids.vertex(a)[0] as u32;
                    encode_id(base_id + picking_id + 1).map(|byte| byte as f32 / 255.0)
                }
            };
            self.triangle([vertices[a], vertices[b], vertices[c]], color);
        }
        Ok(())
    }

    fn triangle(&mut self, [a, b, c]: [ScreenVertex; 3], color: [f32; 4]) {
        let area = edge(a, b, c.x, c.y);
        if area.abs() < f64::EPSILON {
            return;
        }

        let (width, height) = (self.canvas.width as f64, self.canvas.height as f64);
        let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as u32;
        let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as u32;
        let max_x = a.x.max(b.x).max(c.x).ceil().min(width) as u32;
        let max_y = a.y.max(b.y).max(c.y).ceil().min(height) as u32;

        for py in min_y..max_y {
            for px in min_x..max_x {
                let (x, y) = (px as f64 + 0.5, py as f64 + 0.5);
                let w0 = edge(b, c, x, y);
                let w1 = edge(c, a, x, y);
                let w2 = edge(a, b, x, y);
                let inside = if area > 0.0 {
                    w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0
                } else {
                    w0 <= 0.0 && w1 <= 0.0 && w2 <= 0.0
                };
                if inside {
                    self.fragment((py * self.canvas.width + px) as usize, color);
                }
            }
        }
    }

    fn fragment(&mut self, index: usize, color: [f32; 4]) {
        if std::mem::replace(&mut self.visited[index], true) {
            return;
        }

        if let Some(test) = &self.stencil {
            let stored = self.canvas.stencil[index] as u32;
            let passed = compare(
                test.face.compare,
                test.reference & test.read_mask,
                stored & test.read_mask,
            );
            let operation = if passed {
                test.face.pass_op
            } else {
                test.face.fail_op
            };
            let updated = apply(operation, stored, test.reference);
            let keep = stored & !test.write_mask;
            self.canvas.stencil[index] = ((updated & test.write_mask) | keep) as u8;
            if !passed {
                return;
            }
        }

        if !self.color_write {
            return;
        }
        let target = &mut self.canvas.color[index];
        match self.shading {
            Shading::Picking { .. } => *target = color,
            Shading::Color => {
                let alpha = color[3];
                for channel in 0..3 {
                    target[channel] = color[channel] * alpha + target[channel] * (1.0 - alpha);
                }
                target[3] = alpha + target[3] * (1.0 - alpha);
            }
        }
    }
}

fn edge(a: ScreenVertex, b: ScreenVertex, x: f64, y: f64) -> f64 {
    (b.x - a.x) * (y - a.y) - (b.y - a.y) * (x - a.x)
}

fn compare(function: wgpu::CompareFunction, reference: u32, stored: u32) -> bool {
    use wgpu::CompareFunction::*;
    match function {
        Never => false,
        Less => reference < stored,
        Equal => reference == stored,
        LessEqual => reference <= stored,
        Greater => reference > stored,
        NotEqual => reference != stored,
        GreaterEqual => reference >= stored,
        Always => true,
    }
}

fn apply(operation: wgpu::StencilOperation, stored: u32, reference: u32) -> u32 {
    use wgpu::StencilOperation::*;
    match operation {
        Keep => stored,
        Zero => 0,
        Replace => reference,
        Invert => !stored & 0xff,
        IncrementClamp => (stored + 1).min(0xff),
        DecrementClamp => stored.saturating_sub(1),
        IncrementWrap => (stored + 1) & 0xff,
        DecrementWrap => stored.wrapping_sub(1) & 0xff,
    }
}

fn attribute_value(mesh: &Mesh, name: &str, vertex: usize, component: usize) -> Option<f64> {
    let attribute = mesh.buffer.attribute(name)?;
    attribute.data.get(vertex * attribute.width + component)
}

/// Color of a vertex from attributes where the mesh defines them, from uniforms otherwise.
fn material_color(mesh: &Mesh, vertex: usize) -> [f32; 4] {
    let (color_uniform, opacity_uniform, default_color) = match mesh.shader {
        ShaderKind::Fill => ("polygonFill", "polygonOpacity", [1.0; 4]),
        ShaderKind::Line => ("lineColor", "lineOpacity", [0.0, 0.0, 0.0, 1.0]),
    };

    let color = if mesh.has_define(defines::HAS_COLOR) {
        let mut color = [0.0; 4];
        for (component, channel) in color.iter_mut().enumerate() {
            *channel = attribute_value(mesh, A_COLOR, vertex, component).unwrap_or(255.0) / 255.0;
        }
        color
    } else {
        mesh.material.vec4(color_uniform).unwrap_or(default_color)
    };
    let opacity = if mesh.has_define(defines::HAS_OPACITY) {
        attribute_value(mesh, A_OPACITY, vertex, 0).unwrap_or(255.0) / 255.0
    } else {
        mesh.material.float(opacity_uniform).unwrap_or(1.0)
    };
    let fade = mesh.material.float("fadeOpacity").unwrap_or(1.0);

    [
        color[0] as f32,
        color[1] as f32,
        color[2] as f32,
        (color[3] * opacity * fade) as f32,
    ]
}

#[cfg(test)]
mod tests {
    use cgmath::{Matrix4, SquareMatrix};

    use crate::render::{
        backend::{
            DrawCommand, DrawGeometry, FrameUniforms, GpuBackend, RenderTarget, Shading,
            StencilTest,
        },
        headless::HeadlessBackend,
    };

    /// Maps `[0, 4]²` onto the whole 4x4 pixel viewport, y pointing down.
    fn frame() -> FrameUniforms {
        FrameUniforms {
            proj_view: Matrix4::from_translation(cgmath::Vector3::new(-1.0, 1.0, 0.0))
                * Matrix4::from_nonuniform_scale(0.5, -0.5, 1.0),
            viewport: [4, 4],
            gl_zoom: 0.0,
            z_scale: 1.0,
        }
    }

    fn quad<'a>(frame: &'a FrameUniforms, extent: f64, stencil: Option<StencilTest>, color_write: bool) -> DrawCommand<'a> {
        DrawCommand {
            target: RenderTarget::Screen,
            geometry: DrawGeometry::TileQuad {
                transform: Matrix4::identity(),
                extent,
            },
            frame,
            stencil,
            color_write,
            shading: Shading::Color,
        }
    }

    #[test]
    fn test_quad_covers_pixels() {
        let frame = frame();
        let mut backend = HeadlessBackend::new(4, 4);
        backend.submit_draw(&quad(&frame, 2.0, None, true)).unwrap();

        let pixels = backend.read_pixels(RenderTarget::Screen, 0, 0, 4, 4).unwrap();
        let covered = pixels.chunks_exact(4).filter(|p| p[3] == 255).count();
        assert_eq!(covered, 4);
        assert_eq!(&pixels[0..4], &[255, 255, 255, 255]);
        assert_eq!(&pixels[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_stencil_mask_and_test() {
        let frame = frame();
        let mut backend = HeadlessBackend::new(4, 4);
        backend
            .submit_draw(&quad(&frame, 2.0, Some(StencilTest::mask(7)), false))
            .unwrap();
        assert_eq!(backend.stencil_at(RenderTarget::Screen, 0, 0).unwrap(), 7);
        assert_eq!(backend.stencil_at(RenderTarget::Screen, 3, 3).unwrap(), 0);

        backend
            .submit_draw(&quad(&frame, 4.0, Some(StencilTest::equal(7)), true))
            .unwrap();
        let pixels = backend.read_pixels(RenderTarget::Screen, 0, 0, 4, 4).unwrap();
        assert_eq!(pixels.chunks_exact(4).filter(|p| p[3] == 255).count(), 4);
    }

    #[test]
    fn test_targets() {
        let mut backend = HeadlessBackend::new(4, 4);
        let id = backend.create_render_target(2, 2);
        backend
            .clear(RenderTarget::Offscreen(id), Some([1.0, 0.0, 0.0, 1.0]), Some(0))
            .unwrap();
        assert_eq!(
            backend.read_pixels(RenderTarget::Offscreen(id), 1, 1, 1, 1).unwrap(),
            vec![255, 0, 0, 255]
        );
        assert!(backend.read_pixels(RenderTarget::Offscreen(id), 2, 0, 1, 1).is_err());

        backend.destroy_render_target(id);
        assert!(backend.clear(RenderTarget::Offscreen(id), None, Some(0)).is_err());
    }
}
