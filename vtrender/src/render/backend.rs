//! The boundary between the renderer and a graphics device.

use cgmath::Matrix4;
use thiserror::Error;

use crate::render::mesh::Mesh;

pub type TargetId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    Screen,
    Offscreen(TargetId),
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("render target {0:?} does not exist")]
    UnknownTarget(RenderTarget),
    #[error("region {x},{y} {width}x{height} is outside of the render target")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    #[error("mesh has no usable `{0}` attribute")]
    MissingAttribute(&'static str),
}

/// Stencil state of a draw call, the same for front and back faces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StencilTest {
    pub face: wgpu::StencilFaceState,
    pub reference: u32,
    pub read_mask: u32,
    pub write_mask: u32,
}

impl StencilTest {
    /// Unconditionally writes `reference`.
    pub fn mask(reference: u32) -> Self {
        Self {
            face: wgpu::StencilFaceState {
                compare: wgpu::CompareFunction::Always,
                fail_op: wgpu::StencilOperation::Keep,
                depth_fail_op: wgpu::StencilOperation::Keep,
                pass_op: wgpu::StencilOperation::Replace,
            },
            reference,
            read_mask: 0xff,
            write_mask: 0xff,
        }
    }

    /// Passes where the stencil holds `reference`, leaves the stencil untouched.
    pub fn equal(reference: u32) -> Self {
        Self {
            face: wgpu::StencilFaceState {
                compare: wgpu::CompareFunction::Equal,
                fail_op: wgpu::StencilOperation::Keep,
                depth_fail_op: wgpu::StencilOperation::Keep,
                pass_op: wgpu::StencilOperation::Keep,
            },
            reference,
            read_mask: 0xff,
            write_mask: 0xff,
        }
    }
}

/// Per-frame uniforms shared by all draw calls.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameUniforms {
    pub proj_view: Matrix4<f64>,
    /// Size of the render target in pixels.
    pub viewport: [u32; 2],
    pub gl_zoom: f64,
    pub z_scale: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shading {
    /// Colors from the material.
    Color,
    /// Writes `base_id + aPickingId + 1`, little endian into RGBA.
    Picking { base_id: u32 },
}

#[derive(Clone, Copy, Debug)]
pub enum DrawGeometry<'a> {
    Mesh(&'a Mesh),
    /// The square `[0, extent]²` of a tile, used for stencil masks.
    TileQuad {
        transform: Matrix4<f64>,
        extent: f64,
    },
}

#[derive(Clone, Copy, Debug)]
pub struct DrawCommand<'a> {
    pub target: RenderTarget,
    pub geometry: DrawGeometry<'a>,
    pub frame: &'a FrameUniforms,
    pub stencil: Option<StencilTest>,
    pub color_write: bool,
    pub shading: Shading,
}

/// A graphics device. Draw calls are executed in submission order.
pub trait GpuBackend {
    fn create_render_target(&mut self, width: u32, height: u32) -> TargetId;

    fn resize_render_target(
        &mut self,
        target: RenderTarget,
        width: u32,
        height: u32,
    ) -> Result<(), BackendError>;

    fn destroy_render_target(&mut self, target: TargetId);

    /// Clears the color and/or the stencil of a target.
    fn clear(
        &mut self,
        target: RenderTarget,
        color: Option<[f32; 4]>,
        stencil: Option<u32>,
    ) -> Result<(), BackendError>;

    fn submit_draw(&mut self, command: &DrawCommand<'_>) -> Result<(), BackendError>;

    /// RGBA8 pixels of a region, rows from top to bottom.
    fn read_pixels(
        &self,
        target: RenderTarget,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, BackendError>;
}
