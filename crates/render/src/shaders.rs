//! Built-in WGSL sources and their declared interfaces.
//!
//! Both programs bind the same uniform struct at `@group(0) @binding(0)`:
//!
//! ```text
//! struct Uniforms {
//!     view_proj: mat4x4<f32>,
//!     light_direction: vec3<f32>,
//!     light_intensity: f32,
//! };
//! ```

use crate::device::AttributeFormat;
use crate::program::{ProgramInterface, UniformKind};

pub const SCENE_VERTEX: &str = include_str!("../shaders/scene.vert.wgsl");
pub const SCENE_FRAGMENT: &str = include_str!("../shaders/scene.frag.wgsl");
pub const LIGHT_VERTEX: &str = include_str!("../shaders/light.vert.wgsl");
pub const LIGHT_FRAGMENT: &str = include_str!("../shaders/light.frag.wgsl");

pub const VIEW_PROJ: &str = "view_proj";
pub const LIGHT_DIRECTION: &str = "light_direction";
pub const LIGHT_INTENSITY: &str = "light_intensity";

pub const POSITION_SLOT: u32 = 0;
pub const COLOR_SLOT: u32 = 1;
pub const NORMAL_SLOT: u32 = 2;

fn frame_uniforms(interface: ProgramInterface) -> ProgramInterface {
    interface
        .uniform(VIEW_PROJ, UniformKind::Mat4)
        .uniform(LIGHT_DIRECTION, UniformKind::Vec3)
        .uniform(LIGHT_INTENSITY, UniformKind::Float)
}

/// Lit program: position, color and normal inputs.
pub fn scene_interface() -> ProgramInterface {
    frame_uniforms(
        ProgramInterface::new()
            .attribute(POSITION_SLOT, AttributeFormat::float32(3))
            .attribute(COLOR_SLOT, AttributeFormat::float32(3))
            .attribute(NORMAL_SLOT, AttributeFormat::float32(3)),
    )
}

/// Unlit program for the light marker: position and color inputs.
pub fn light_interface() -> ProgramInterface {
    frame_uniforms(
        ProgramInterface::new()
            .attribute(POSITION_SLOT, AttributeFormat::float32(3))
            .attribute(COLOR_SLOT, AttributeFormat::float32(3)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_have_entry_points() {
        for src in [SCENE_VERTEX, LIGHT_VERTEX] {
            assert!(src.contains("@vertex"));
            assert!(src.contains("var<uniform>"));
        }
        for src in [SCENE_FRAGMENT, LIGHT_FRAGMENT] {
            assert!(src.contains("@fragment"));
        }
    }

    #[test]
    fn shared_block_layout() {
        for iface in [scene_interface(), light_interface()] {
            assert_eq!(iface.uniform_field(VIEW_PROJ).unwrap().offset, 0);
            assert_eq!(iface.uniform_field(LIGHT_DIRECTION).unwrap().offset, 64);
            assert_eq!(iface.uniform_field(LIGHT_INTENSITY).unwrap().offset, 76);
            assert_eq!(iface.uniform_block_size(), 80);
        }
        assert_eq!(scene_interface().attributes().len(), 3);
        assert_eq!(light_interface().attributes().len(), 2);
    }
}
