use crate::buffer::GpuBuffer;
use crate::device::{BufferUsage, RenderDevice};
use crate::error::RenderError;
use crate::layout::VertexLayout;
use crate::program::ShaderProgram;
use std::rc::Rc;

/// One indexed draw: a layout, its index buffer, and the program to draw with.
///
/// Resources are shared, so several drawables may reuse one program or one
/// index buffer.
#[derive(Debug, Clone)]
pub struct Drawable {
    layout: Rc<VertexLayout>,
    index_buffer: Rc<GpuBuffer>,
    index_count: u32,
    program: Rc<ShaderProgram>,
}

impl Drawable {
    /// Check the draw is well formed before it ever reaches the device.
    ///
    /// The index count must be a positive multiple of 3 that fits in the
    /// index buffer, and the layout must feed every vertex input of the
    /// program with a matching format.
    pub fn new(
        layout: Rc<VertexLayout>,
        index_buffer: Rc<GpuBuffer>,
        index_count: u32,
        program: Rc<ShaderProgram>,
    ) -> Result<Self, RenderError> {
        if index_buffer.usage() != BufferUsage::Index {
            return Err(RenderError::InvalidDrawable(format!(
                "buffer {:?} is not an index buffer",
                index_buffer.id()
            )));
        }
        if index_count == 0 || !index_count.is_multiple_of(3) {
            return Err(RenderError::InvalidDrawable(format!(
                "index count {index_count} is not a positive multiple of 3"
            )));
        }
        let available = index_buffer.byte_len() / 4;
        if u64::from(index_count) > available {
            return Err(RenderError::InvalidDrawable(format!(
                "index count {index_count} exceeds the {available} indices in buffer {:?}",
                index_buffer.id()
            )));
        }
        for input in program.interface().attributes() {
            match layout.binding(input.slot) {
                Some(b) if b.format == input.format => {}
                Some(b) => {
                    return Err(RenderError::binding(
                        input.slot,
                        format!(
                            "program `{}` reads {} but the layout provides {}",
                            program.label(),
                            input.format,
                            b.format
                        ),
                    ));
                }
                None => {
                    return Err(RenderError::binding(
                        input.slot,
                        format!("program `{}` input is not bound", program.label()),
                    ));
                }
            }
        }
        Ok(Self {
            layout,
            index_buffer,
            index_count,
            program,
        })
    }

    /// Draw every index in `index_buffer`.
    pub fn with_all_indices(
        layout: Rc<VertexLayout>,
        index_buffer: Rc<GpuBuffer>,
        program: Rc<ShaderProgram>,
    ) -> Result<Self, RenderError> {
        let count = u32::try_from(index_buffer.byte_len() / 4).map_err(|_| {
            RenderError::InvalidDrawable("index buffer holds too many indices".into())
        })?;
        Self::new(layout, index_buffer, count, program)
    }

    pub fn layout(&self) -> &Rc<VertexLayout> {
        &self.layout
    }

    pub fn index_buffer(&self) -> &Rc<GpuBuffer> {
        &self.index_buffer
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn triangles(&self) -> u32 {
        self.index_count / 3
    }

    pub fn program(&self) -> &Rc<ShaderProgram> {
        &self.program
    }

    /// Activate the program, upload pending uniforms, bind the layout and
    /// issue the draw. Bindings are restored before returning.
    pub fn draw(&self, device: &dyn RenderDevice) -> Result<(), RenderError> {
        self.layout.check_sources()?;
        let _program = self.program.activate();
        self.program.flush_uniforms()?;
        let _layout = self.layout.bind();
        device.draw_indexed(self.index_buffer.id(), self.index_count)
    }
}

/// Ordered list of drawables. Draw order is insertion order.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    drawables: Vec<Drawable>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, drawable: Drawable) {
        self.drawables.push(drawable);
    }

    pub fn drawables(&self) -> &[Drawable] {
        &self.drawables
    }

    pub fn len(&self) -> usize {
        self.drawables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drawables.is_empty()
    }

    /// Distinct programs in first-use order.
    pub fn programs(&self) -> Vec<Rc<ShaderProgram>> {
        let mut programs: Vec<Rc<ShaderProgram>> = Vec::new();
        for d in &self.drawables {
            if !programs.iter().any(|p| Rc::ptr_eq(p, &d.program)) {
                programs.push(Rc::clone(&d.program));
            }
        }
        programs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::AttributeFormat;
    use crate::layout::AttributeBinding;
    use crate::program::{ProgramInterface, UniformKind};
    use crate::recording::RecordingDevice;
    use crate::shaders;

    struct Fixture {
        recording: Rc<RecordingDevice>,
        device: Rc<dyn RenderDevice>,
        vertices: Rc<GpuBuffer>,
        program: Rc<ShaderProgram>,
    }

    /// Position + color program and an 8-vertex buffer with stride 24.
    fn fixture() -> Fixture {
        let recording = Rc::new(RecordingDevice::new());
        let device: Rc<dyn RenderDevice> = recording.clone();
        let vertices = Rc::new(
            GpuBuffer::from_slice(&device, BufferUsage::Vertex, &[0.0_f32; 48]).unwrap(),
        );
        let program = Rc::new(
            ShaderProgram::new(
                &device,
                "light",
                shaders::LIGHT_VERTEX,
                shaders::LIGHT_FRAGMENT,
                shaders::light_interface(),
            )
            .unwrap(),
        );
        Fixture {
            recording,
            device,
            vertices,
            program,
        }
    }

    fn position_color_layout(f: &Fixture) -> Rc<VertexLayout> {
        let mut layout = VertexLayout::new(&f.device).unwrap();
        layout
            .add_binding(AttributeBinding::float32(0, 3, 24, 0), &f.vertices)
            .unwrap();
        layout
            .add_binding(AttributeBinding::float32(1, 3, 24, 12), &f.vertices)
            .unwrap();
        Rc::new(layout)
    }

    #[test]
    fn twelve_indices_draw_four_triangles() {
        let f = fixture();
        let layout = position_color_layout(&f);
        let indices = Rc::new(
            GpuBuffer::indices(&f.device, &[0, 1, 2, 2, 3, 0, 4, 5, 6, 6, 7, 4]).unwrap(),
        );
        let drawable =
            Drawable::with_all_indices(layout, Rc::clone(&indices), Rc::clone(&f.program))
                .unwrap();

        f.device.begin_frame([0.0; 4]).unwrap();
        drawable.draw(f.device.as_ref()).unwrap();
        f.device.present().unwrap();

        let draws = f.recording.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].index_count, 12);
        assert_eq!(draws[0].triangles(), 4);
        assert_eq!(draws[0].index_buffer, indices.id());
        assert_eq!(draws[0].program, f.program.id());

        // Guards restored the empty bound state.
        assert_eq!(f.recording.bound_vertex_layout(), None);
        assert_eq!(f.recording.active_program(), None);
    }

    #[test]
    fn bad_index_counts_are_rejected() {
        let f = fixture();
        let layout = position_color_layout(&f);
        let indices = Rc::new(GpuBuffer::indices(&f.device, &[0, 1, 2, 2, 3, 0]).unwrap());
        for count in [0, 4, 9, 24] {
            let err = Drawable::new(
                Rc::clone(&layout),
                Rc::clone(&indices),
                count,
                Rc::clone(&f.program),
            )
            .unwrap_err();
            assert!(matches!(err, RenderError::InvalidDrawable(_)), "count {count}");
        }
        assert!(
            Drawable::new(layout, indices, 3, Rc::clone(&f.program)).is_ok(),
            "a prefix of the buffer may be drawn"
        );
    }

    #[test]
    fn vertex_buffer_is_not_an_index_buffer() {
        let f = fixture();
        let layout = position_color_layout(&f);
        let err = Drawable::new(layout, Rc::clone(&f.vertices), 3, Rc::clone(&f.program))
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidDrawable(_)));
    }

    #[test]
    fn missing_or_mismatched_input_is_invalid_binding() {
        let f = fixture();
        let indices = Rc::new(GpuBuffer::indices(&f.device, &[0, 1, 2]).unwrap());

        let mut only_position = VertexLayout::new(&f.device).unwrap();
        only_position
            .add_binding(AttributeBinding::float32(0, 3, 24, 0), &f.vertices)
            .unwrap();
        let err = Drawable::new(
            Rc::new(only_position),
            Rc::clone(&indices),
            3,
            Rc::clone(&f.program),
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::InvalidBinding { slot: 1, .. }));

        let mut wide_color = VertexLayout::new(&f.device).unwrap();
        wide_color
            .add_binding(AttributeBinding::float32(0, 3, 24, 0), &f.vertices)
            .unwrap();
        wide_color
            .add_binding(AttributeBinding::float32(1, 2, 24, 12), &f.vertices)
            .unwrap();
        let err = Drawable::new(Rc::new(wide_color), indices, 3, Rc::clone(&f.program))
            .unwrap_err();
        assert!(err.to_string().contains("vec3<f32>"));
        assert!(f.recording.draws().is_empty());
    }

    #[test]
    fn pending_uniforms_upload_before_draw() {
        let f = fixture();
        let layout = position_color_layout(&f);
        let indices = Rc::new(GpuBuffer::indices(&f.device, &[0, 1, 2]).unwrap());
        let drawable = Drawable::with_all_indices(layout, indices, Rc::clone(&f.program)).unwrap();
        f.program.set_uniform(shaders::LIGHT_INTENSITY, 0.5_f32);

        f.recording.clear_calls();
        f.device.begin_frame([0.0; 4]).unwrap();
        drawable.draw(f.device.as_ref()).unwrap();
        let calls = f.recording.calls();
        let upload = calls
            .iter()
            .position(|c| matches!(c, crate::recording::DeviceCall::WriteUniforms { .. }))
            .unwrap();
        let draw = calls
            .iter()
            .position(|c| matches!(c, crate::recording::DeviceCall::Draw(_)))
            .unwrap();
        assert!(upload < draw);
    }

    #[test]
    fn dropped_vertex_buffer_fails_draw() {
        let f = fixture();
        let layout = position_color_layout(&f);
        let indices = Rc::new(GpuBuffer::indices(&f.device, &[0, 1, 2]).unwrap());
        let drawable =
            Drawable::with_all_indices(layout, indices, Rc::clone(&f.program)).unwrap();
        let Fixture {
            recording,
            device,
            vertices,
            ..
        } = f;
        drop(vertices);

        device.begin_frame([0.0; 4]).unwrap();
        assert!(matches!(
            drawable.draw(device.as_ref()),
            Err(RenderError::Device(_))
        ));
        assert!(recording.draws().is_empty());
    }

    #[test]
    fn programs_are_deduplicated() {
        let f = fixture();
        let layout = position_color_layout(&f);
        let indices = Rc::new(GpuBuffer::indices(&f.device, &[0, 1, 2]).unwrap());
        let other = Rc::new(
            ShaderProgram::new(
                &f.device,
                "other",
                shaders::LIGHT_VERTEX,
                shaders::LIGHT_FRAGMENT,
                ProgramInterface::new()
                    .attribute(0, AttributeFormat::float32(3))
                    .uniform(shaders::VIEW_PROJ, UniformKind::Mat4),
            )
            .unwrap(),
        );

        let mut scene = Scene::new();
        for program in [&f.program, &other, &f.program] {
            scene.push(
                Drawable::with_all_indices(
                    Rc::clone(&layout),
                    Rc::clone(&indices),
                    Rc::clone(program),
                )
                .unwrap(),
            );
        }
        let programs = scene.programs();
        assert_eq!(scene.len(), 3);
        assert_eq!(programs.len(), 2);
        assert!(Rc::ptr_eq(&programs[0], &f.program));
        assert!(Rc::ptr_eq(&programs[1], &other));
    }
}
