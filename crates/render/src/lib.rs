//! Backend-agnostic render resources.
//!
//! # Invariants
//! - Every device object has exactly one owner and is destroyed on drop.
//! - Layouts reference vertex buffers weakly; drawables own their layout,
//!   index buffer and program through `Rc`.
//! - Bind state is process-wide (one layout, one program) and is only
//!   changed through scoped guards that restore it.
//!
//! Backends implement [`RenderDevice`]. [`RecordingDevice`] is the headless
//! implementation used by tests and the command-line tool; the wgpu backend
//! lives in `boxlight-render-wgpu`.

mod buffer;
mod camera;
mod demo;
mod device;
mod error;
mod frame;
mod layout;
mod light;
mod mesh;
mod program;
mod recording;
mod scene;
pub mod shaders;

pub use buffer::GpuBuffer;
pub use camera::{Camera, aspect_ratio};
pub use demo::{DemoScene, LIGHT_MARKER_SIZE, demo_boxes};
pub use device::{
    AttributeFormat, BindState, BindingDesc, BufferId, BufferUsage, ComponentType,
    HandleAllocator, LayoutId, MAX_VERTEX_ATTRIBUTES, ProgramDesc, ProgramId, RenderDevice,
};
pub use error::{RenderError, ShaderStage};
pub use frame::{FrameReport, RenderLoop};
pub use layout::{AttributeBinding, LayoutBinding, VertexLayout};
pub use light::DirectionalLight;
pub use mesh::{BoxMesh, ColorVertex, LitVertex};
pub use program::{
    ProgramAttribute, ProgramBinding, ProgramInterface, ShaderProgram, UniformField, UniformKind,
    UniformValue, read_shader_source,
};
pub use recording::{DeviceCall, DrawSubmission, RecordingDevice};
pub use scene::{Drawable, Scene};

pub fn crate_info() -> &'static str {
    "boxlight-render v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("render"));
    }

    #[test]
    fn binding_past_stride_is_rejected_before_any_draw() {
        let recording = Rc::new(RecordingDevice::new());
        let device: Rc<dyn RenderDevice> = recording.clone();
        let vertices =
            Rc::new(GpuBuffer::from_slice(&device, BufferUsage::Vertex, &[0.0_f32; 18]).unwrap());
        let mut layout = VertexLayout::new(&device).unwrap();
        let err = layout
            .add_binding(AttributeBinding::float32(1, 3, 24, 16), &vertices)
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidBinding { slot: 1, .. }));
        assert!(recording.draws().is_empty());
        assert!(recording.layout_bindings(layout.id()).unwrap().is_empty());
    }
}
