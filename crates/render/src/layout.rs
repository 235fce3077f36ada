use crate::buffer::GpuBuffer;
use crate::device::{
    AttributeFormat, BindingDesc, BufferId, BufferUsage, LayoutId, MAX_VERTEX_ATTRIBUTES,
    RenderDevice,
};
use crate::error::RenderError;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Where one attribute slot reads its data from within a vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeBinding {
    pub slot: u32,
    pub format: AttributeFormat,
    /// Bytes between consecutive vertices.
    pub stride: u32,
    /// Byte offset of the attribute within a vertex.
    pub offset: u32,
}

impl AttributeBinding {
    pub const fn float32(slot: u32, components: u8, stride: u32, offset: u32) -> Self {
        Self {
            slot,
            format: AttributeFormat::float32(components),
            stride,
            offset,
        }
    }
}

struct SourcedBinding {
    binding: AttributeBinding,
    buffer: BufferId,
    source: Weak<GpuBuffer>,
}

/// Maps byte ranges of vertex buffers to attribute slots.
///
/// The layout does not own its source buffers: it keeps weak references, so
/// callers must keep the buffers alive for as long as the layout is drawn.
/// A dead source is reported at draw time instead of reading freed memory.
pub struct VertexLayout {
    device: Rc<dyn RenderDevice>,
    id: LayoutId,
    bindings: BTreeMap<u32, SourcedBinding>,
}

impl VertexLayout {
    /// Allocate an empty layout.
    pub fn new(device: &Rc<dyn RenderDevice>) -> Result<Self, RenderError> {
        let id = device.create_vertex_layout()?;
        tracing::debug!(?id, "vertex layout created");
        Ok(Self {
            device: Rc::clone(device),
            id,
            bindings: BTreeMap::new(),
        })
    }

    pub fn id(&self) -> LayoutId {
        self.id
    }

    /// Bind `binding.slot` to a range of `source`. A later call for the same
    /// slot replaces the earlier one.
    pub fn add_binding(
        &mut self,
        binding: AttributeBinding,
        source: &Rc<GpuBuffer>,
    ) -> Result<(), RenderError> {
        self.validate(&binding, source)?;

        let previous = self.bindings.insert(
            binding.slot,
            SourcedBinding {
                binding,
                buffer: source.id(),
                source: Rc::downgrade(source),
            },
        );
        if let Err(err) = self.device.set_vertex_bindings(self.id, &self.descs()) {
            match previous {
                Some(prev) => self.bindings.insert(binding.slot, prev),
                None => self.bindings.remove(&binding.slot),
            };
            return Err(err);
        }
        tracing::trace!(layout = ?self.id, ?binding, buffer = ?source.id(), "binding set");
        Ok(())
    }

    fn validate(&self, binding: &AttributeBinding, source: &GpuBuffer) -> Result<(), RenderError> {
        let slot = binding.slot;
        if source.usage() != BufferUsage::Vertex {
            return Err(RenderError::binding(
                slot,
                format!("source buffer {:?} is not a vertex buffer", source.id()),
            ));
        }
        if slot >= MAX_VERTEX_ATTRIBUTES {
            return Err(RenderError::binding(
                slot,
                format!("slot exceeds the limit of {MAX_VERTEX_ATTRIBUTES} attributes"),
            ));
        }
        if !(1..=4).contains(&binding.format.components) {
            return Err(RenderError::binding(
                slot,
                format!("{} components, expected 1 to 4", binding.format.components),
            ));
        }
        if binding.stride == 0
            || !binding.stride.is_multiple_of(4)
            || !binding.offset.is_multiple_of(4)
        {
            return Err(RenderError::binding(
                slot,
                format!(
                    "stride {} and offset {} must be non-zero multiples of 4",
                    binding.stride, binding.offset
                ),
            ));
        }
        let end = u64::from(binding.offset) + u64::from(binding.format.size());
        if end > u64::from(binding.stride) {
            return Err(RenderError::binding(
                slot,
                format!(
                    "offset {} + size {} exceeds stride {}",
                    binding.offset,
                    binding.format.size(),
                    binding.stride
                ),
            ));
        }
        if u64::from(binding.stride) > source.byte_len() {
            return Err(RenderError::binding(
                slot,
                format!(
                    "stride {} exceeds buffer length {}",
                    binding.stride,
                    source.byte_len()
                ),
            ));
        }
        let conflicting = self.bindings.values().find(|other| {
            other.binding.slot != slot
                && other.buffer == source.id()
                && other.binding.stride != binding.stride
        });
        if let Some(other) = conflicting {
            return Err(RenderError::binding(
                slot,
                format!(
                    "stride {} disagrees with stride {} of slot {} reading the same buffer",
                    binding.stride, other.binding.stride, other.binding.slot
                ),
            ));
        }
        Ok(())
    }

    fn descs(&self) -> Vec<BindingDesc> {
        self.bindings
            .values()
            .map(|b| BindingDesc {
                slot: b.binding.slot,
                format: b.binding.format,
                stride: b.binding.stride,
                offset: b.binding.offset,
                buffer: b.buffer,
            })
            .collect()
    }

    /// Bindings ordered by slot.
    pub fn bindings(&self) -> Vec<AttributeBinding> {
        self.bindings.values().map(|b| b.binding).collect()
    }

    pub fn binding(&self, slot: u32) -> Option<AttributeBinding> {
        self.bindings.get(&slot).map(|b| b.binding)
    }

    /// Error if any source buffer has been dropped.
    pub fn check_sources(&self) -> Result<(), RenderError> {
        match self.bindings.values().find(|b| b.source.strong_count() == 0) {
            Some(dead) => Err(RenderError::Device(format!(
                "vertex buffer {:?} for slot {} of layout {:?} was destroyed",
                dead.buffer, dead.binding.slot, self.id
            ))),
            None => Ok(()),
        }
    }

    /// Make this the bound layout until the returned guard is dropped.
    pub fn bind(&self) -> LayoutBinding<'_> {
        let previous = self.device.bound_vertex_layout();
        if previous != Some(self.id) {
            self.device.bind_vertex_layout(Some(self.id));
        }
        LayoutBinding {
            layout: self,
            previous,
            released: false,
        }
    }
}

impl Drop for VertexLayout {
    fn drop(&mut self) {
        self.device.destroy_vertex_layout(self.id);
        tracing::debug!(id = ?self.id, "vertex layout destroyed");
    }
}

impl fmt::Debug for VertexLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VertexLayout")
            .field("id", &self.id)
            .field("bindings", &self.bindings())
            .finish_non_exhaustive()
    }
}

/// Scoped binding of a [`VertexLayout`]. Restores the previously bound
/// layout when dropped, so binds are always paired.
#[must_use = "the layout is unbound when the binding is dropped"]
pub struct LayoutBinding<'a> {
    layout: &'a VertexLayout,
    previous: Option<LayoutId>,
    released: bool,
}

impl LayoutBinding<'_> {
    pub fn layout(&self) -> &VertexLayout {
        self.layout
    }

    /// Leave no layout bound instead of restoring the previous one.
    pub fn unbind(mut self) {
        self.layout.device.bind_vertex_layout(None);
        self.released = true;
    }
}

impl Drop for LayoutBinding<'_> {
    fn drop(&mut self) {
        if !self.released && self.previous != Some(self.layout.id) {
            self.layout.device.bind_vertex_layout(self.previous);
        }
    }
}
