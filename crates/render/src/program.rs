use crate::device::{AttributeFormat, MAX_VERTEX_ATTRIBUTES, ProgramDesc, ProgramId, RenderDevice};
use crate::error::{RenderError, ShaderStage};
use glam::{Mat4, Vec2, Vec3, Vec4};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::rc::Rc;

/// Type of a uniform block member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Int,
    Uint,
    /// Stored as a `u32` (0 or 1); WGSL has no host-shareable bool.
    Bool,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

impl UniformKind {
    /// Alignment and size in the uniform address space.
    pub const fn align_and_size(self) -> (usize, usize) {
        match self {
            UniformKind::Float | UniformKind::Int | UniformKind::Uint | UniformKind::Bool => (4, 4),
            UniformKind::Vec2 => (8, 8),
            UniformKind::Vec3 => (16, 12),
            UniformKind::Vec4 => (16, 16),
            UniformKind::Mat4 => (16, 64),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            UniformKind::Float => "f32",
            UniformKind::Int => "i32",
            UniformKind::Uint => "u32",
            UniformKind::Bool => "bool",
            UniformKind::Vec2 => "vec2<f32>",
            UniformKind::Vec3 => "vec3<f32>",
            UniformKind::Vec4 => "vec4<f32>",
            UniformKind::Mat4 => "mat4x4<f32>",
        }
    }
}

/// A value for a named uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Uint(u32),
    Bool(bool),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Int(_) => UniformKind::Int,
            UniformValue::Uint(_) => UniformKind::Uint,
            UniformValue::Bool(_) => UniformKind::Bool,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Mat4(_) => UniformKind::Mat4,
        }
    }

    /// Write the value's bytes into `dst`, which must be exactly its size.
    fn write_to(&self, dst: &mut [u8]) {
        match self {
            UniformValue::Float(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Int(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Uint(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Bool(v) => dst.copy_from_slice(bytemuck::bytes_of(&u32::from(*v))),
            UniformValue::Vec2(v) => dst.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Vec3(v) => dst.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Vec4(v) => dst.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Mat4(m) => dst.copy_from_slice(bytemuck::cast_slice(&m.to_cols_array())),
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for UniformValue {
            fn from(v: $ty) -> Self {
                UniformValue::$variant(v)
            }
        })*
    };
}

impl_from_value! {
    f32 => Float,
    i32 => Int,
    u32 => Uint,
    bool => Bool,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    Mat4 => Mat4,
}

/// One member of a program's uniform block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformField {
    pub name: String,
    pub kind: UniformKind,
    pub offset: usize,
}

/// A vertex input the program's vertex stage consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramAttribute {
    pub slot: u32,
    pub format: AttributeFormat,
}

/// Declared vertex inputs and uniform block of a program.
///
/// Uniform members are laid out in declaration order following the WGSL
/// uniform address-space rules, so the block matches a WGSL struct with the
/// same member order bound at `@group(0) @binding(0)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramInterface {
    attributes: Vec<ProgramAttribute>,
    uniforms: Vec<UniformField>,
    end: usize,
}

impl ProgramInterface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, slot: u32, format: AttributeFormat) -> Self {
        self.attributes.push(ProgramAttribute { slot, format });
        self
    }

    pub fn uniform(mut self, name: impl Into<String>, kind: UniformKind) -> Self {
        let (align, size) = kind.align_and_size();
        let offset = self.end.next_multiple_of(align);
        self.uniforms.push(UniformField {
            name: name.into(),
            kind,
            offset,
        });
        self.end = offset + size;
        self
    }

    pub fn attributes(&self) -> &[ProgramAttribute] {
        &self.attributes
    }

    pub fn uniforms(&self) -> &[UniformField] {
        &self.uniforms
    }

    pub fn uniform_field(&self, name: &str) -> Option<&UniformField> {
        self.uniforms.iter().find(|f| f.name == name)
    }

    /// Size in bytes of the uniform block, rounded up to 16. Zero when the
    /// program declares no uniforms.
    pub fn uniform_block_size(&self) -> usize {
        self.end.next_multiple_of(16)
    }

    /// Check the declaration is internally consistent; failures are link errors.
    pub fn validate(&self) -> Result<(), String> {
        let mut slots = HashSet::new();
        for attr in &self.attributes {
            if attr.slot >= MAX_VERTEX_ATTRIBUTES {
                return Err(format!(
                    "vertex input slot {} exceeds the limit of {MAX_VERTEX_ATTRIBUTES}",
                    attr.slot
                ));
            }
            if !(1..=4).contains(&attr.format.components) {
                return Err(format!(
                    "vertex input slot {} has {} components",
                    attr.slot, attr.format.components
                ));
            }
            if !slots.insert(attr.slot) {
                return Err(format!("vertex input slot {} declared twice", attr.slot));
            }
        }
        let mut names = HashSet::new();
        for field in &self.uniforms {
            if field.name.is_empty() {
                return Err("uniform with an empty name".into());
            }
            if !names.insert(field.name.as_str()) {
                return Err(format!("uniform `{}` declared twice", field.name));
            }
        }
        Ok(())
    }
}

/// Read a shader stage source file fully into memory.
pub fn read_shader_source(path: impl AsRef<Path>) -> Result<String, RenderError> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|source| RenderError::ShaderIo {
        path: path.to_path_buf(),
        source,
    })
}

struct UniformState {
    data: Vec<u8>,
    cache: HashMap<String, UniformValue>,
    dirty: bool,
    reported: HashSet<String>,
}

/// A compiled and linked program with a CPU-side uniform block.
///
/// The program itself is immutable after linking. Uniform values are the only
/// mutable state: setters write into a cached block which is uploaded to the
/// device before the next draw that uses the program.
pub struct ShaderProgram {
    device: Rc<dyn RenderDevice>,
    id: ProgramId,
    label: String,
    interface: ProgramInterface,
    uniforms: RefCell<UniformState>,
}

impl ShaderProgram {
    /// Compile both stages and link them against `interface`.
    pub fn new(
        device: &Rc<dyn RenderDevice>,
        label: &str,
        vertex_source: &str,
        fragment_source: &str,
        interface: ProgramInterface,
    ) -> Result<Self, RenderError> {
        for (stage, source) in [
            (ShaderStage::Vertex, vertex_source),
            (ShaderStage::Fragment, fragment_source),
        ] {
            if source.trim().is_empty() {
                return Err(RenderError::Compile {
                    label: label.to_string(),
                    stage,
                    log: "empty shader source".into(),
                });
            }
        }
        interface.validate().map_err(|log| RenderError::Link {
            label: label.to_string(),
            log,
        })?;

        let id = device.create_program(&ProgramDesc {
            label,
            vertex_source,
            fragment_source,
            interface: &interface,
        })?;
        tracing::debug!(?id, label, uniforms = interface.uniforms().len(), "program linked");

        let block_size = interface.uniform_block_size();
        Ok(Self {
            device: Rc::clone(device),
            id,
            label: label.to_string(),
            interface,
            uniforms: RefCell::new(UniformState {
                data: vec![0; block_size],
                cache: HashMap::new(),
                dirty: false,
                reported: HashSet::new(),
            }),
        })
    }

    /// Load the two stage files, then compile and link.
    pub fn from_files(
        device: &Rc<dyn RenderDevice>,
        label: &str,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
        interface: ProgramInterface,
    ) -> Result<Self, RenderError> {
        let vertex = read_shader_source(vertex_path)?;
        let fragment = read_shader_source(fragment_path)?;
        Self::new(device, label, &vertex, &fragment, interface)
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn interface(&self) -> &ProgramInterface {
        &self.interface
    }

    /// Make this the active program until the returned guard is dropped.
    pub fn activate(&self) -> ProgramBinding<'_> {
        let previous = self.device.active_program();
        if previous != Some(self.id) {
            self.device.use_program(Some(self.id));
        }
        ProgramBinding {
            program: self,
            previous,
            released: false,
        }
    }

    /// Set a uniform by name.
    ///
    /// Unknown names and kind mismatches are tolerated: the call is ignored
    /// and a warning is logged the first time each name fails.
    pub fn set_uniform(&self, name: &str, value: impl Into<UniformValue>) {
        if let Err(err) = self.try_set_uniform(name, value) {
            let mut state = self.uniforms.borrow_mut();
            if state.reported.insert(name.to_string()) {
                tracing::warn!(program = %self.label, "{err}");
            }
        }
    }

    /// Set a uniform by name, returning the error instead of logging it.
    pub fn try_set_uniform(
        &self,
        name: &str,
        value: impl Into<UniformValue>,
    ) -> Result<(), RenderError> {
        let value = value.into();
        let field = self
            .interface
            .uniform_field(name)
            .ok_or_else(|| RenderError::UniformNotFound(name.to_string()))?;
        if field.kind != value.kind() {
            return Err(RenderError::UniformKind {
                name: name.to_string(),
                expected: field.kind.name(),
                found: value.kind().name(),
            });
        }

        let mut state = self.uniforms.borrow_mut();
        if state.cache.get(name) == Some(&value) {
            return Ok(());
        }
        let (_, size) = field.kind.align_and_size();
        value.write_to(&mut state.data[field.offset..field.offset + size]);
        state.cache.insert(name.to_string(), value);
        state.dirty = true;
        Ok(())
    }

    /// Last value set for `name`.
    pub fn uniform_value(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.borrow().cache.get(name).copied()
    }

    /// Names whose set calls failed and were logged.
    pub fn rejected_uniforms(&self) -> Vec<String> {
        let mut names: Vec<String> = self.uniforms.borrow().reported.iter().cloned().collect();
        names.sort();
        names
    }

    /// Whether there are uniform changes not yet uploaded.
    pub fn has_pending_uniforms(&self) -> bool {
        self.uniforms.borrow().dirty
    }

    /// Upload the uniform block if anything changed since the last upload.
    pub fn flush_uniforms(&self) -> Result<(), RenderError> {
        let mut state = self.uniforms.borrow_mut();
        if !state.dirty {
            return Ok(());
        }
        self.device.write_uniforms(self.id, &state.data)?;
        state.dirty = false;
        tracing::trace!(program = %self.label, bytes = state.data.len(), "uniforms uploaded");
        Ok(())
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        self.device.destroy_program(self.id);
        tracing::debug!(id = ?self.id, label = %self.label, "program destroyed");
    }
}

impl fmt::Debug for ShaderProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("interface", &self.interface)
            .finish_non_exhaustive()
    }
}

/// Scoped activation of a [`ShaderProgram`]. Restores the previously active
/// program when dropped.
#[must_use = "the program is deactivated when the binding is dropped"]
pub struct ProgramBinding<'a> {
    program: &'a ShaderProgram,
    previous: Option<ProgramId>,
    released: bool,
}

impl ProgramBinding<'_> {
    pub fn program(&self) -> &ShaderProgram {
        self.program
    }

    /// Leave no program active instead of restoring the previous one.
    pub fn unbind(mut self) {
        self.program.device.use_program(None);
        self.released = true;
    }
}

impl Drop for ProgramBinding<'_> {
    fn drop(&mut self) {
        if !self.released && self.previous != Some(self.program.id) {
            self.program.device.use_program(self.previous);
        }
    }
}
