use crate::device::{BufferId, BufferUsage, RenderDevice};
use crate::error::RenderError;
use std::fmt;
use std::rc::Rc;

/// An immutable device buffer holding vertex or index data.
///
/// The payload is uploaded once at construction; there is no partial update.
/// The buffer is the single owner of its device handle and releases it on
/// drop.
pub struct GpuBuffer {
    device: Rc<dyn RenderDevice>,
    id: BufferId,
    byte_len: u64,
    usage: BufferUsage,
}

impl GpuBuffer {
    /// Upload raw bytes.
    pub fn new(
        device: &Rc<dyn RenderDevice>,
        usage: BufferUsage,
        contents: &[u8],
    ) -> Result<Self, RenderError> {
        let id = device.create_buffer(usage, contents)?;
        tracing::debug!(?id, ?usage, bytes = contents.len(), "buffer created");
        Ok(Self {
            device: Rc::clone(device),
            id,
            byte_len: contents.len() as u64,
            usage,
        })
    }

    /// Upload a slice of plain-old-data values.
    pub fn from_slice<T: bytemuck::Pod>(
        device: &Rc<dyn RenderDevice>,
        usage: BufferUsage,
        data: &[T],
    ) -> Result<Self, RenderError> {
        Self::new(device, usage, bytemuck::cast_slice(data))
    }

    /// Upload `u32` triangle-list indices.
    pub fn indices(device: &Rc<dyn RenderDevice>, indices: &[u32]) -> Result<Self, RenderError> {
        Self::from_slice(device, BufferUsage::Index, indices)
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn byte_len(&self) -> u64 {
        self.byte_len
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        self.device.destroy_buffer(self.id);
        tracing::debug!(id = ?self.id, "buffer destroyed");
    }
}

impl fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("id", &self.id)
            .field("byte_len", &self.byte_len)
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{AttributeBinding, VertexLayout};
    use crate::recording::RecordingDevice;

    #[test]
    fn reports_exact_byte_length() {
        let device: Rc<dyn RenderDevice> = Rc::new(RecordingDevice::new());
        let buffer = GpuBuffer::new(&device, BufferUsage::Vertex, &[7u8; 37]).unwrap();
        assert_eq!(buffer.byte_len(), 37);
        assert_eq!(buffer.usage(), BufferUsage::Vertex);

        let floats = [1.0_f32; 18];
        let buffer = GpuBuffer::from_slice(&device, BufferUsage::Vertex, &floats).unwrap();
        assert_eq!(buffer.byte_len(), 72);
    }

    #[test]
    fn empty_buffer_reports_zero() {
        let device: Rc<dyn RenderDevice> = Rc::new(RecordingDevice::new());
        let buffer = GpuBuffer::new(&device, BufferUsage::Vertex, &[]).unwrap();
        assert_eq!(buffer.byte_len(), 0);

        let mut layout = VertexLayout::new(&device).unwrap();
        let buffer = Rc::new(buffer);
        let err = layout
            .add_binding(AttributeBinding::float32(0, 3, 12, 0), &buffer)
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidBinding { slot: 0, .. }));
    }

    #[test]
    fn allocation_failure_is_device_error() {
        let device: Rc<dyn RenderDevice> =
            Rc::new(RecordingDevice::new().with_memory_budget(64));
        let err = GpuBuffer::new(&device, BufferUsage::Vertex, &[0u8; 128]).unwrap_err();
        assert!(matches!(err, RenderError::Device(_)));
    }

    #[test]
    fn destroyed_exactly_once_on_drop() {
        let recording = Rc::new(RecordingDevice::new());
        let device: Rc<dyn RenderDevice> = recording.clone();
        let buffer = GpuBuffer::indices(&device, &[0, 1, 2]).unwrap();
        let id = buffer.id();
        assert_eq!(recording.live_buffers(), 1);
        drop(buffer);
        assert_eq!(recording.live_buffers(), 0);

        let destroys = recording
            .calls()
            .into_iter()
            .filter(|c| *c == crate::recording::DeviceCall::DestroyBuffer(id))
            .count();
        assert_eq!(destroys, 1);
    }
}
