//! Draw-ready tile geometry.

use std::collections::{BTreeMap, BTreeSet};

use cgmath::{Matrix4, SquareMatrix};

use crate::pack::PackedTileBuffer;

/// Value of a shader uniform.
#[derive(Clone, Debug, PartialEq)]
pub enum UniformValue {
    Float(f64),
    Vec2([f64; 2]),
    Vec4([f64; 4]),
    Array(Vec<f64>),
    Text(String),
}

impl UniformValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            UniformValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_vec4(&self) -> Option<[f64; 4]> {
        match self {
            UniformValue::Vec4(value) => Some(*value),
            _ => None,
        }
    }
}

/// Uniforms of a mesh by name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Material {
    pub uniforms: BTreeMap<&'static str, UniformValue>,
}

impl Material {
    pub fn set(&mut self, name: &'static str, value: UniformValue) {
        self.uniforms.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.get(name)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(UniformValue::as_f64)
    }

    pub fn vec4(&self, name: &str) -> Option<[f64; 4]> {
        self.get(name).and_then(UniformValue::as_vec4)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderKind {
    Fill,
    Line,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    pub shader: ShaderKind,
    /// Style rule the geometry was packed for.
    pub symbol_index: usize,
    pub buffer: PackedTileBuffer,
    pub material: Material,
    /// Tile-local to world transform.
    pub local_transform: Matrix4<f64>,
    pub defines: BTreeSet<&'static str>,
}

impl Mesh {
    pub fn new(shader: ShaderKind, symbol_index: usize, buffer: PackedTileBuffer) -> Self {
        Self {
            shader,
            symbol_index,
            buffer,
            material: Material::default(),
            local_transform: Matrix4::identity(),
            defines: BTreeSet::new(),
        }
    }

    pub fn has_define(&self, define: &str) -> bool {
        self.defines.contains(define)
    }
}

/// Shader define flags, one per optional attribute or feature.
pub mod defines {
    pub const HAS_COLOR: &str = "HAS_COLOR";
    pub const HAS_OPACITY: &str = "HAS_OPACITY";
    pub const HAS_UV_SCALE: &str = "HAS_UV_SCALE";
    pub const HAS_UV_OFFSET: &str = "HAS_UV_OFFSET";
    pub const HAS_PATTERN: &str = "HAS_PATTERN";
    pub const HAS_LINE_WIDTH: &str = "HAS_LINE_WIDTH";
    /// Geometry comes from a vector tile and is clipped by the stencil.
    pub const IS_VT: &str = "IS_VT";
}
