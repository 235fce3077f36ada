use crate::error::RenderError;
use crate::program::ProgramInterface;
use std::cell::Cell;
use std::fmt;

/// Maximum vertex attribute slots a layout may address.
pub const MAX_VERTEX_ATTRIBUTES: u32 = 16;

/// Handle to a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

/// Handle to a vertex layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayoutId(pub u32);

/// Handle to a linked shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
}

/// Scalar type of a vertex attribute component. All are 4 bytes wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Float32,
    Uint32,
    Sint32,
}

impl ComponentType {
    pub const fn size(self) -> u32 {
        4
    }

    fn scalar_name(self) -> &'static str {
        match self {
            ComponentType::Float32 => "f32",
            ComponentType::Uint32 => "u32",
            ComponentType::Sint32 => "i32",
        }
    }
}

/// Component count and type of one vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeFormat {
    pub components: u8,
    pub ty: ComponentType,
}

impl AttributeFormat {
    pub const fn float32(components: u8) -> Self {
        Self {
            components,
            ty: ComponentType::Float32,
        }
    }

    /// Size in bytes of one attribute value.
    pub const fn size(self) -> u32 {
        self.components as u32 * self.ty.size()
    }
}

impl fmt::Display for AttributeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.components {
            1 => f.write_str(self.ty.scalar_name()),
            n => write!(f, "vec{n}<{}>", self.ty.scalar_name()),
        }
    }
}

/// A validated attribute binding as handed to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingDesc {
    pub slot: u32,
    pub format: AttributeFormat,
    pub stride: u32,
    pub offset: u32,
    pub buffer: BufferId,
}

/// Everything a backend needs to compile and link a program.
#[derive(Debug, Clone, Copy)]
pub struct ProgramDesc<'a> {
    pub label: &'a str,
    pub vertex_source: &'a str,
    pub fragment_source: &'a str,
    pub interface: &'a ProgramInterface,
}

/// Backend-agnostic device interface.
///
/// Mirrors an immediate-mode graphics API: objects are created and destroyed
/// through handles, and draws read the *currently bound* layout and program,
/// which are process-wide slots holding at most one object of each kind.
/// All methods take `&self`; implementations are single-threaded and use
/// interior mutability.
///
/// Resource wrappers ([`crate::GpuBuffer`], [`crate::VertexLayout`],
/// [`crate::ShaderProgram`]) are the intended callers; they pair every
/// create with a destroy and every bind with a restore.
pub trait RenderDevice {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    fn create_buffer(&self, usage: BufferUsage, contents: &[u8]) -> Result<BufferId, RenderError>;
    fn destroy_buffer(&self, id: BufferId);

    fn create_vertex_layout(&self) -> Result<LayoutId, RenderError>;
    /// Replace the full binding list of a layout.
    fn set_vertex_bindings(&self, id: LayoutId, bindings: &[BindingDesc])
    -> Result<(), RenderError>;
    fn destroy_vertex_layout(&self, id: LayoutId);
    fn bind_vertex_layout(&self, id: Option<LayoutId>);
    fn bound_vertex_layout(&self) -> Option<LayoutId>;

    fn create_program(&self, desc: &ProgramDesc<'_>) -> Result<ProgramId, RenderError>;
    fn destroy_program(&self, id: ProgramId);
    fn use_program(&self, id: Option<ProgramId>);
    fn active_program(&self) -> Option<ProgramId>;
    /// Upload a program's complete uniform block.
    fn write_uniforms(&self, id: ProgramId, data: &[u8]) -> Result<(), RenderError>;

    /// Start a frame; color and depth are cleared when the frame is presented.
    fn begin_frame(&self, clear_color: [f32; 4]) -> Result<(), RenderError>;
    /// Draw `index_count` indices as a triangle list using the bound layout
    /// and active program.
    fn draw_indexed(&self, index_buffer: BufferId, index_count: u32) -> Result<(), RenderError>;
    fn present(&self) -> Result<(), RenderError>;
    fn resize(&self, width: u32, height: u32);
}

/// Monotonic handle allocation shared by the backends.
#[derive(Debug, Default)]
pub struct HandleAllocator {
    next: Cell<u32>,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_buffer(&self) -> BufferId {
        BufferId(self.bump())
    }

    pub fn next_layout(&self) -> LayoutId {
        LayoutId(self.bump())
    }

    pub fn next_program(&self) -> ProgramId {
        ProgramId(self.bump())
    }

    fn bump(&self) -> u32 {
        let id = self.next.get() + 1;
        self.next.set(id);
        id
    }
}

/// The process-wide "currently bound" slots.
#[derive(Debug, Default)]
pub struct BindState {
    layout: Cell<Option<LayoutId>>,
    program: Cell<Option<ProgramId>>,
}

impl BindState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layout(&self) -> Option<LayoutId> {
        self.layout.get()
    }

    pub fn set_layout(&self, id: Option<LayoutId>) {
        self.layout.set(id);
    }

    pub fn program(&self) -> Option<ProgramId> {
        self.program.get()
    }

    pub fn set_program(&self, id: Option<ProgramId>) {
        self.program.set(id);
    }

    /// Clear the layout slot if it refers to a destroyed layout.
    pub fn forget_layout(&self, id: LayoutId) {
        if self.layout.get() == Some(id) {
            self.layout.set(None);
        }
    }

    /// Clear the program slot if it refers to a destroyed program.
    pub fn forget_program(&self, id: ProgramId) {
        if self.program.get() == Some(id) {
            self.program.set(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_unique_across_kinds() {
        let ids = HandleAllocator::new();
        let b = ids.next_buffer();
        let l = ids.next_layout();
        let p = ids.next_program();
        assert_ne!(b.0, l.0);
        assert_ne!(l.0, p.0);
    }

    #[test]
    fn attribute_format_size_and_name() {
        let f = AttributeFormat::float32(3);
        assert_eq!(f.size(), 12);
        assert_eq!(f.to_string(), "vec3<f32>");
        let u = AttributeFormat {
            components: 1,
            ty: ComponentType::Uint32,
        };
        assert_eq!(u.to_string(), "u32");
    }

    #[test]
    fn forget_only_clears_matching_slot() {
        let state = BindState::new();
        state.set_layout(Some(LayoutId(3)));
        state.forget_layout(LayoutId(4));
        assert_eq!(state.layout(), Some(LayoutId(3)));
        state.forget_layout(LayoutId(3));
        assert_eq!(state.layout(), None);
    }
}
