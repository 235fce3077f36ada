use crate::buffer::GpuBuffer;
use crate::device::{BufferUsage, RenderDevice};
use crate::error::RenderError;
use crate::layout::{AttributeBinding, VertexLayout};
use crate::mesh::{BoxMesh, ColorVertex, LitVertex};
use crate::program::{ProgramInterface, ShaderProgram};
use crate::scene::{Drawable, Scene};
use crate::shaders;
use boxlight_common::{AppConfig, StagePaths};
use glam::Vec3;
use std::rc::Rc;

/// Edge length of the light marker cube.
pub const LIGHT_MARKER_SIZE: f32 = 0.15;

/// The lit boxes of the demo: a gray cube resting on a red slab.
pub fn demo_boxes() -> [BoxMesh; 2] {
    [
        BoxMesh::new(Vec3::ZERO, Vec3::splat(0.5), Vec3::splat(0.5)),
        BoxMesh::new(
            Vec3::new(-0.25, -0.3, -0.25),
            Vec3::new(0.75, 0.0, 0.75),
            Vec3::new(0.5, 0.0, 0.0),
        ),
    ]
}

/// The demo scene and every resource it draws from.
///
/// Layouts only hold weak references to their vertex buffers, so the buffers
/// are kept here for as long as the scene lives.
#[derive(Debug)]
pub struct DemoScene {
    pub scene: Scene,
    pub scene_program: Rc<ShaderProgram>,
    pub light_program: Rc<ShaderProgram>,
    vertex_buffers: Vec<Rc<GpuBuffer>>,
}

impl DemoScene {
    /// Compile both programs, upload the boxes and the light marker, and
    /// assemble the drawables: lit boxes first, marker last.
    pub fn build(device: &Rc<dyn RenderDevice>, config: &AppConfig) -> Result<Self, RenderError> {
        let scene_program = Rc::new(load_program(
            device,
            "scene",
            config.shaders.scene.as_ref(),
            (shaders::SCENE_VERTEX, shaders::SCENE_FRAGMENT),
            shaders::scene_interface(),
        )?);
        let light_program = Rc::new(load_program(
            device,
            "light",
            config.shaders.light.as_ref(),
            (shaders::LIGHT_VERTEX, shaders::LIGHT_FRAGMENT),
            shaders::light_interface(),
        )?);

        // Every box uses the same 24-vertex face layout.
        let indices = Rc::new(GpuBuffer::indices(device, &BoxMesh::indices())?);

        let mut scene = Scene::new();
        let mut vertex_buffers = Vec::new();
        for mesh in demo_boxes() {
            let vertices = Rc::new(GpuBuffer::from_slice(
                device,
                BufferUsage::Vertex,
                &mesh.lit_vertices(),
            )?);
            let layout = layout_for(device, &LitVertex::bindings(), &vertices)?;
            scene.push(Drawable::with_all_indices(
                layout,
                Rc::clone(&indices),
                Rc::clone(&scene_program),
            )?);
            vertex_buffers.push(vertices);
        }

        let marker = BoxMesh::cube(config.light.position, LIGHT_MARKER_SIZE, Vec3::ONE);
        let vertices = Rc::new(GpuBuffer::from_slice(
            device,
            BufferUsage::Vertex,
            &marker.color_vertices(),
        )?);
        let layout = layout_for(device, &ColorVertex::bindings(), &vertices)?;
        scene.push(Drawable::with_all_indices(
            layout,
            indices,
            Rc::clone(&light_program),
        )?);
        vertex_buffers.push(vertices);

        tracing::info!(
            drawables = scene.len(),
            backend = device.backend_name(),
            "demo scene ready"
        );
        Ok(Self {
            scene,
            scene_program,
            light_program,
            vertex_buffers,
        })
    }

    pub fn vertex_buffers(&self) -> &[Rc<GpuBuffer>] {
        &self.vertex_buffers
    }
}

fn load_program(
    device: &Rc<dyn RenderDevice>,
    label: &str,
    paths: Option<&StagePaths>,
    (vertex, fragment): (&str, &str),
    interface: ProgramInterface,
) -> Result<ShaderProgram, RenderError> {
    match paths {
        Some(paths) => {
            tracing::info!(
                label,
                vertex = %paths.vertex.display(),
                fragment = %paths.fragment.display(),
                "loading shader sources"
            );
            ShaderProgram::from_files(device, label, &paths.vertex, &paths.fragment, interface)
        }
        None => ShaderProgram::new(device, label, vertex, fragment, interface),
    }
}

fn layout_for(
    device: &Rc<dyn RenderDevice>,
    bindings: &[AttributeBinding],
    source: &Rc<GpuBuffer>,
) -> Result<Rc<VertexLayout>, RenderError> {
    let mut layout = VertexLayout::new(device)?;
    for binding in bindings {
        layout.add_binding(*binding, source)?;
    }
    Ok(Rc::new(layout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RenderLoop;
    use crate::recording::RecordingDevice;
    use boxlight_input::{Action, KeyState};

    fn recording() -> (Rc<RecordingDevice>, Rc<dyn RenderDevice>) {
        let recording = Rc::new(RecordingDevice::new());
        let device: Rc<dyn RenderDevice> = recording.clone();
        (recording, device)
    }

    #[test]
    fn builds_three_drawables() {
        let (recording, device) = recording();
        let demo = DemoScene::build(&device, &AppConfig::default()).unwrap();
        assert_eq!(demo.scene.len(), 3);
        assert_eq!(demo.scene.programs().len(), 2);
        assert_eq!(demo.vertex_buffers().len(), 3);
        assert_eq!(recording.live_programs(), 2);
        // Three vertex buffers plus the shared index buffer.
        assert_eq!(recording.live_buffers(), 4);
        for d in demo.scene.drawables() {
            assert_eq!(d.index_count(), 36);
        }
        assert!(format!("{demo:?}").starts_with("DemoScene"));
    }

    #[test]
    fn demo_frames_draw_every_box() {
        let (recording, device) = recording();
        let config = AppConfig::default();
        let demo = DemoScene::build(&device, &config).unwrap();
        let mut render_loop = RenderLoop::from_config(Rc::clone(&device), &config);

        let keys: KeyState = [Action::RotateLeft, Action::LightDown].into_iter().collect();
        for _ in 0..3 {
            let report = render_loop.frame(&demo.scene, &keys).unwrap();
            assert_eq!(report.draws, 3);
            assert_eq!(report.triangles, 36);
            assert_eq!(report.skipped, 0);
        }
        assert_eq!(recording.frames_presented(), 3);
        assert_eq!(recording.draws().len(), 9);

        let programs: Vec<_> = recording.draws().iter().take(3).map(|d| d.program).collect();
        assert_eq!(
            programs,
            vec![
                demo.scene_program.id(),
                demo.scene_program.id(),
                demo.light_program.id()
            ]
        );
    }

    #[test]
    fn dropping_demo_releases_everything() {
        let (recording, device) = recording();
        let demo = DemoScene::build(&device, &AppConfig::default()).unwrap();
        drop(demo);
        assert_eq!(recording.live_buffers(), 0);
        assert_eq!(recording.live_layouts(), 0);
        assert_eq!(recording.live_programs(), 0);
    }

    #[test]
    fn shader_paths_override_builtins() {
        let (_, device) = recording();
        let dir = tempfile::tempdir().unwrap();
        let vertex = dir.path().join("light.vert.wgsl");
        let fragment = dir.path().join("light.frag.wgsl");
        std::fs::write(&vertex, shaders::LIGHT_VERTEX).unwrap();
        std::fs::write(&fragment, "// no entry point\n").unwrap();

        let mut config = AppConfig::default();
        config.shaders.light = Some(StagePaths { vertex, fragment });
        let err = DemoScene::build(&device, &config).unwrap_err();
        assert!(matches!(err, RenderError::Compile { .. }));
    }

    #[test]
    fn allocation_failure_is_fatal_at_setup() {
        let device: Rc<dyn RenderDevice> =
            Rc::new(RecordingDevice::new().with_memory_budget(256));
        let err = DemoScene::build(&device, &AppConfig::default()).unwrap_err();
        assert!(matches!(err, RenderError::Device(_)));
    }
}
