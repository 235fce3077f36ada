use crate::layout::AttributeBinding;
use crate::shaders::{COLOR_SLOT, NORMAL_SLOT, POSITION_SLOT};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Vertex for the lit program.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LitVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub normal: [f32; 3],
}

impl LitVertex {
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;

    pub const fn bindings() -> [AttributeBinding; 3] {
        [
            AttributeBinding::float32(POSITION_SLOT, 3, Self::STRIDE, 0),
            AttributeBinding::float32(COLOR_SLOT, 3, Self::STRIDE, 12),
            AttributeBinding::float32(NORMAL_SLOT, 3, Self::STRIDE, 24),
        ]
    }
}

/// Vertex for the unlit light-marker program.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ColorVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl ColorVertex {
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;

    pub const fn bindings() -> [AttributeBinding; 2] {
        [
            AttributeBinding::float32(POSITION_SLOT, 3, Self::STRIDE, 0),
            AttributeBinding::float32(COLOR_SLOT, 3, Self::STRIDE, 12),
        ]
    }
}

/// Face normal and its four corners on the unit cube, counter-clockwise
/// seen from outside.
#[rustfmt::skip]
const FACES: [([f32; 3], [[f32; 3]; 4]); 6] = [
    ([ 0.0,  0.0,  1.0], [[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 1.0], [0.0, 1.0, 1.0]]),
    ([ 0.0,  0.0, -1.0], [[1.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]]),
    ([ 1.0,  0.0,  0.0], [[1.0, 0.0, 1.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [1.0, 1.0, 1.0]]),
    ([-1.0,  0.0,  0.0], [[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 1.0], [0.0, 1.0, 0.0]]),
    ([ 0.0,  1.0,  0.0], [[0.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]]),
    ([ 0.0, -1.0,  0.0], [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 1.0], [0.0, 0.0, 1.0]]),
];

/// Axis-aligned box with a flat color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxMesh {
    pub min: Vec3,
    pub max: Vec3,
    pub color: Vec3,
}

impl BoxMesh {
    pub fn new(min: Vec3, max: Vec3, color: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
            color,
        }
    }

    /// Cube of edge `size` centred on `center`.
    pub fn cube(center: Vec3, size: f32, color: Vec3) -> Self {
        let half = Vec3::splat(size / 2.0);
        Self::new(center - half, center + half, color)
    }

    fn corners(&self) -> impl Iterator<Item = (Vec3, Vec3)> + '_ {
        let extent = self.max - self.min;
        FACES.iter().flat_map(move |(normal, corners)| {
            corners
                .iter()
                .map(move |c| (self.min + Vec3::from(*c) * extent, Vec3::from(*normal)))
        })
    }

    /// 24 vertices, four per face, with flat face normals.
    pub fn lit_vertices(&self) -> Vec<LitVertex> {
        self.corners()
            .map(|(position, normal)| LitVertex {
                position: position.to_array(),
                color: self.color.to_array(),
                normal: normal.to_array(),
            })
            .collect()
    }

    /// Same corners as [`Self::lit_vertices`] without normals.
    pub fn color_vertices(&self) -> Vec<ColorVertex> {
        self.corners()
            .map(|(position, _)| ColorVertex {
                position: position.to_array(),
                color: self.color.to_array(),
            })
            .collect()
    }

    /// Triangle-list indices for the vertices above: two triangles per face.
    pub fn indices() -> Vec<u32> {
        (0..FACES.len() as u32)
            .flat_map(|face| {
                let base = face * 4;
                [base, base + 1, base + 2, base + 2, base + 3, base]
            })
            .collect()
    }
}
