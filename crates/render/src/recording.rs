use crate::device::{
    BindState, BindingDesc, BufferId, BufferUsage, HandleAllocator, LayoutId, ProgramDesc,
    ProgramId, RenderDevice,
};
use crate::error::{RenderError, ShaderStage};
use std::cell::RefCell;
use std::collections::HashMap;

/// One indexed draw as seen by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawSubmission {
    pub frame: u64,
    pub layout: LayoutId,
    pub program: ProgramId,
    pub index_buffer: BufferId,
    pub index_count: u32,
}

impl DrawSubmission {
    pub fn triangles(&self) -> u32 {
        self.index_count / 3
    }
}

/// A device call in the order it was issued.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateBuffer {
        id: BufferId,
        usage: BufferUsage,
        len: u64,
    },
    DestroyBuffer(BufferId),
    CreateLayout(LayoutId),
    SetBindings {
        layout: LayoutId,
        bindings: Vec<BindingDesc>,
    },
    DestroyLayout(LayoutId),
    BindLayout(Option<LayoutId>),
    CreateProgram {
        id: ProgramId,
        label: String,
    },
    DestroyProgram(ProgramId),
    UseProgram(Option<ProgramId>),
    WriteUniforms {
        program: ProgramId,
        len: usize,
    },
    BeginFrame {
        clear_color: [f32; 4],
    },
    Draw(DrawSubmission),
    Present,
    Resize {
        width: u32,
        height: u32,
    },
}

#[derive(Default)]
struct Recorder {
    calls: Vec<DeviceCall>,
    buffers: HashMap<BufferId, (BufferUsage, u64)>,
    layouts: HashMap<LayoutId, Vec<BindingDesc>>,
    programs: HashMap<ProgramId, Vec<u8>>,
    allocated: u64,
    in_frame: bool,
    frames_presented: u64,
    size: (u32, u32),
}

/// Headless device that validates and records every call.
///
/// Stands in for a GPU backend in tests and the command-line tools. Stage
/// compilation checks for the WGSL entry-point attribute, and linking checks
/// that a declared uniform block is actually bound by one of the stages.
pub struct RecordingDevice {
    ids: HandleAllocator,
    bound: BindState,
    memory_budget: Option<u64>,
    state: RefCell<Recorder>,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self {
            ids: HandleAllocator::new(),
            bound: BindState::new(),
            memory_budget: None,
            state: RefCell::new(Recorder {
                size: (800, 600),
                ..Recorder::default()
            }),
        }
    }

    /// Fail buffer allocations once `bytes` of buffer memory are live.
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// All draw submissions, in order.
    pub fn draws(&self) -> Vec<DrawSubmission> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::Draw(d) => Some(*d),
                _ => None,
            })
            .collect()
    }

    pub fn frames_presented(&self) -> u64 {
        self.state.borrow().frames_presented
    }

    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    pub fn live_layouts(&self) -> usize {
        self.state.borrow().layouts.len()
    }

    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }

    /// Live buffer memory in bytes.
    pub fn allocated_bytes(&self) -> u64 {
        self.state.borrow().allocated
    }

    pub fn layout_bindings(&self, id: LayoutId) -> Option<Vec<BindingDesc>> {
        self.state.borrow().layouts.get(&id).cloned()
    }

    /// Last uniform block uploaded for a program.
    pub fn uniform_bytes(&self, id: ProgramId) -> Option<Vec<u8>> {
        self.state.borrow().programs.get(&id).cloned()
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.state.borrow().size
    }

    fn record(&self, call: DeviceCall) {
        self.state.borrow_mut().calls.push(call);
    }
}

fn check_entry_point(label: &str, stage: ShaderStage, source: &str) -> Result<(), RenderError> {
    let marker = match stage {
        ShaderStage::Vertex => "@vertex",
        ShaderStage::Fragment => "@fragment",
    };
    if source.contains(marker) {
        Ok(())
    } else {
        Err(RenderError::Compile {
            label: label.to_string(),
            stage,
            log: format!("no {marker} entry point"),
        })
    }
}

impl RenderDevice for RecordingDevice {
    fn backend_name(&self) -> &'static str {
        "recording"
    }

    fn create_buffer(&self, usage: BufferUsage, contents: &[u8]) -> Result<BufferId, RenderError> {
        let len = contents.len() as u64;
        let mut state = self.state.borrow_mut();
        if let Some(budget) = self.memory_budget
            && state.allocated + len > budget
        {
            return Err(RenderError::Device(format!(
                "out of device memory: {len} bytes requested, {} of {budget} in use",
                state.allocated
            )));
        }
        let id = self.ids.next_buffer();
        state.allocated += len;
        state.buffers.insert(id, (usage, len));
        state.calls.push(DeviceCall::CreateBuffer { id, usage, len });
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) {
        let mut state = self.state.borrow_mut();
        if let Some((_, len)) = state.buffers.remove(&id) {
            state.allocated -= len;
        }
        state.calls.push(DeviceCall::DestroyBuffer(id));
    }

    fn create_vertex_layout(&self) -> Result<LayoutId, RenderError> {
        let id = self.ids.next_layout();
        let mut state = self.state.borrow_mut();
        state.layouts.insert(id, Vec::new());
        state.calls.push(DeviceCall::CreateLayout(id));
        Ok(id)
    }

    fn set_vertex_bindings(
        &self,
        id: LayoutId,
        bindings: &[BindingDesc],
    ) -> Result<(), RenderError> {
        let mut state = self.state.borrow_mut();
        if let Some(b) = bindings.iter().find(|b| !state.buffers.contains_key(&b.buffer)) {
            return Err(RenderError::Device(format!(
                "slot {} references unknown buffer {:?}",
                b.slot, b.buffer
            )));
        }
        let Some(entry) = state.layouts.get_mut(&id) else {
            return Err(RenderError::Device(format!("unknown vertex layout {id:?}")));
        };
        *entry = bindings.to_vec();
        state.calls.push(DeviceCall::SetBindings {
            layout: id,
            bindings: bindings.to_vec(),
        });
        Ok(())
    }

    fn destroy_vertex_layout(&self, id: LayoutId) {
        self.bound.forget_layout(id);
        let mut state = self.state.borrow_mut();
        state.layouts.remove(&id);
        state.calls.push(DeviceCall::DestroyLayout(id));
    }

    fn bind_vertex_layout(&self, id: Option<LayoutId>) {
        self.bound.set_layout(id);
        self.record(DeviceCall::BindLayout(id));
    }

    fn bound_vertex_layout(&self) -> Option<LayoutId> {
        self.bound.layout()
    }

    fn create_program(&self, desc: &ProgramDesc<'_>) -> Result<ProgramId, RenderError> {
        check_entry_point(desc.label, ShaderStage::Vertex, desc.vertex_source)?;
        check_entry_point(desc.label, ShaderStage::Fragment, desc.fragment_source)?;

        let binds_uniforms = [desc.vertex_source, desc.fragment_source]
            .iter()
            .any(|s| s.contains("var<uniform>"));
        let declared = desc.interface.uniforms().len();
        if declared > 0 && !binds_uniforms {
            return Err(RenderError::Link {
                label: desc.label.to_string(),
                log: format!("{declared} uniforms declared but no stage binds a uniform buffer"),
            });
        }
        if declared == 0 && binds_uniforms {
            return Err(RenderError::Link {
                label: desc.label.to_string(),
                log: "a stage binds a uniform buffer but the program declares no uniforms".into(),
            });
        }

        let id = self.ids.next_program();
        let mut state = self.state.borrow_mut();
        state
            .programs
            .insert(id, vec![0; desc.interface.uniform_block_size()]);
        state.calls.push(DeviceCall::CreateProgram {
            id,
            label: desc.label.to_string(),
        });
        Ok(id)
    }

    fn destroy_program(&self, id: ProgramId) {
        self.bound.forget_program(id);
        let mut state = self.state.borrow_mut();
        state.programs.remove(&id);
        state.calls.push(DeviceCall::DestroyProgram(id));
    }

    fn use_program(&self, id: Option<ProgramId>) {
        self.bound.set_program(id);
        self.record(DeviceCall::UseProgram(id));
    }

    fn active_program(&self) -> Option<ProgramId> {
        self.bound.program()
    }

    fn write_uniforms(&self, id: ProgramId, data: &[u8]) -> Result<(), RenderError> {
        let mut state = self.state.borrow_mut();
        let Some(block) = state.programs.get_mut(&id) else {
            return Err(RenderError::Device(format!("unknown program {id:?}")));
        };
        if block.len() != data.len() {
            return Err(RenderError::Device(format!(
                "uniform block is {} bytes, got {}",
                block.len(),
                data.len()
            )));
        }
        block.copy_from_slice(data);
        state.calls.push(DeviceCall::WriteUniforms {
            program: id,
            len: data.len(),
        });
        Ok(())
    }

    fn begin_frame(&self, clear_color: [f32; 4]) -> Result<(), RenderError> {
        let mut state = self.state.borrow_mut();
        if state.in_frame {
            return Err(RenderError::Device("frame already in progress".into()));
        }
        state.in_frame = true;
        state.calls.push(DeviceCall::BeginFrame { clear_color });
        Ok(())
    }

    fn draw_indexed(&self, index_buffer: BufferId, index_count: u32) -> Result<(), RenderError> {
        let layout = self
            .bound
            .layout()
            .ok_or_else(|| RenderError::Device("draw with no vertex layout bound".into()))?;
        let program = self
            .bound
            .program()
            .ok_or_else(|| RenderError::Device("draw with no active program".into()))?;

        let mut state = self.state.borrow_mut();
        if !state.in_frame {
            return Err(RenderError::Device("draw outside of a frame".into()));
        }
        if !state.programs.contains_key(&program) {
            return Err(RenderError::Device(format!("unknown program {program:?}")));
        }
        let Some(bindings) = state.layouts.get(&layout) else {
            return Err(RenderError::Device(format!("unknown vertex layout {layout:?}")));
        };
        if let Some(b) = bindings.iter().find(|b| !state.buffers.contains_key(&b.buffer)) {
            return Err(RenderError::Device(format!(
                "vertex buffer for slot {} was destroyed",
                b.slot
            )));
        }
        match state.buffers.get(&index_buffer) {
            Some((BufferUsage::Index, len)) if u64::from(index_count) * 4 <= *len => {}
            Some((BufferUsage::Index, len)) => {
                return Err(RenderError::Device(format!(
                    "{index_count} indices overrun a {len}-byte index buffer"
                )));
            }
            Some((usage, _)) => {
                return Err(RenderError::Device(format!(
                    "buffer {index_buffer:?} has {usage:?} usage, not Index"
                )));
            }
            None => {
                return Err(RenderError::Device(format!(
                    "unknown index buffer {index_buffer:?}"
                )));
            }
        }

        let frame = state.frames_presented;
        state.calls.push(DeviceCall::Draw(DrawSubmission {
            frame,
            layout,
            program,
            index_buffer,
            index_count,
        }));
        Ok(())
    }

    fn present(&self) -> Result<(), RenderError> {
        let mut state = self.state.borrow_mut();
        if !state.in_frame {
            return Err(RenderError::Device("present without begin_frame".into()));
        }
        state.in_frame = false;
        state.frames_presented += 1;
        state.calls.push(DeviceCall::Present);
        Ok(())
    }

    fn resize(&self, width: u32, height: u32) {
        let mut state = self.state.borrow_mut();
        state.size = (width, height);
        state.calls.push(DeviceCall::Resize { width, height });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{ProgramInterface, UniformKind};

    #[test]
    fn empty_buffer_is_allocated() {
        let device = RecordingDevice::new().with_memory_budget(0);
        device.create_buffer(BufferUsage::Vertex, &[]).unwrap();
        assert_eq!(device.live_buffers(), 1);
        assert_eq!(device.allocated_bytes(), 0);
    }

    #[test]
    fn memory_budget_limits_allocation() {
        let device = RecordingDevice::new().with_memory_budget(16);
        let a = device.create_buffer(BufferUsage::Vertex, &[0; 12]).unwrap();
        assert!(device.create_buffer(BufferUsage::Vertex, &[0; 8]).is_err());
        device.destroy_buffer(a);
        assert_eq!(device.allocated_bytes(), 0);
        assert!(device.create_buffer(BufferUsage::Vertex, &[0; 8]).is_ok());
    }

    #[test]
    fn missing_entry_point_fails_compile() {
        let device = RecordingDevice::new();
        let iface = ProgramInterface::new();
        let err = device
            .create_program(&ProgramDesc {
                label: "p",
                vertex_source: "fn main() {}",
                fragment_source: "@fragment fn fs() {}",
                interface: &iface,
            })
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::Compile {
                stage: ShaderStage::Vertex,
                ..
            }
        ));
    }

    #[test]
    fn unbound_uniform_block_fails_link() {
        let device = RecordingDevice::new();
        let iface = ProgramInterface::new().uniform("view_proj", UniformKind::Mat4);
        let err = device
            .create_program(&ProgramDesc {
                label: "p",
                vertex_source: "@vertex fn vs() {}",
                fragment_source: "@fragment fn fs() {}",
                interface: &iface,
            })
            .unwrap_err();
        assert!(matches!(err, RenderError::Link { .. }));
    }

    #[test]
    fn draw_requires_frame_and_bindings() {
        let device = RecordingDevice::new();
        let indices = device.create_buffer(BufferUsage::Index, &[0; 12]).unwrap();
        assert!(device.draw_indexed(indices, 3).is_err());

        let layout = device.create_vertex_layout().unwrap();
        device.bind_vertex_layout(Some(layout));
        assert!(device.draw_indexed(indices, 3).is_err());
        assert!(device.draws().is_empty());
    }

    #[test]
    fn present_without_frame_is_error() {
        let device = RecordingDevice::new();
        assert!(device.present().is_err());
        device.begin_frame([0.0; 4]).unwrap();
        assert!(device.begin_frame([0.0; 4]).is_err());
        device.present().unwrap();
        assert_eq!(device.frames_presented(), 1);
    }

    #[test]
    fn destroying_bound_layout_clears_slot() {
        let device = RecordingDevice::new();
        let layout = device.create_vertex_layout().unwrap();
        device.bind_vertex_layout(Some(layout));
        device.destroy_vertex_layout(layout);
        assert_eq!(device.bound_vertex_layout(), None);
        assert_eq!(device.live_layouts(), 0);
    }
}
