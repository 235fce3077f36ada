use boxlight_render::{AttributeFormat, BindingDesc, BufferId, ComponentType, ProgramInterface};

/// wgpu vertex format for an attribute, if one exists.
pub fn vertex_format(format: AttributeFormat) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as F;
    let f = match (format.ty, format.components) {
        (ComponentType::Float32, 1) => F::Float32,
        (ComponentType::Float32, 2) => F::Float32x2,
        (ComponentType::Float32, 3) => F::Float32x3,
        (ComponentType::Float32, 4) => F::Float32x4,
        (ComponentType::Uint32, 1) => F::Uint32,
        (ComponentType::Uint32, 2) => F::Uint32x2,
        (ComponentType::Uint32, 3) => F::Uint32x3,
        (ComponentType::Uint32, 4) => F::Uint32x4,
        (ComponentType::Sint32, 1) => F::Sint32,
        (ComponentType::Sint32, 2) => F::Sint32x2,
        (ComponentType::Sint32, 3) => F::Sint32x3,
        (ComponentType::Sint32, 4) => F::Sint32x4,
        _ => return None,
    };
    Some(f)
}

/// One vertex buffer slot of a pipeline: a stride and the attributes read
/// from it.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexBufferSpec {
    pub stride: u64,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

impl VertexBufferSpec {
    pub fn layout(&self) -> wgpu::VertexBufferLayout<'_> {
        wgpu::VertexBufferLayout {
            array_stride: self.stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &self.attributes,
        }
    }
}

fn attribute(slot: u32, format: AttributeFormat, offset: u32) -> Result<wgpu::VertexAttribute, String> {
    let format = vertex_format(format)
        .ok_or_else(|| format!("slot {slot}: {format} has no vertex format"))?;
    Ok(wgpu::VertexAttribute {
        format,
        offset: u64::from(offset),
        shader_location: slot,
    })
}

/// Group a layout's bindings into one pipeline vertex buffer per source
/// buffer, in order of each buffer's lowest slot. The position in the
/// returned list is the index passed to `set_vertex_buffer`.
pub fn group_bindings(
    bindings: &[BindingDesc],
) -> Result<Vec<(BufferId, VertexBufferSpec)>, String> {
    let mut sorted: Vec<&BindingDesc> = bindings.iter().collect();
    sorted.sort_by_key(|b| b.slot);

    let mut groups: Vec<(BufferId, VertexBufferSpec)> = Vec::new();
    for b in sorted {
        let attr = attribute(b.slot, b.format, b.offset)?;
        match groups.iter_mut().find(|(id, _)| *id == b.buffer) {
            Some((_, spec)) if spec.stride == u64::from(b.stride) => spec.attributes.push(attr),
            Some((_, spec)) => {
                return Err(format!(
                    "slot {} reads buffer {:?} with stride {}, expected {}",
                    b.slot, b.buffer, b.stride, spec.stride
                ));
            }
            None => groups.push((
                b.buffer,
                VertexBufferSpec {
                    stride: u64::from(b.stride),
                    attributes: vec![attr],
                },
            )),
        }
    }
    Ok(groups)
}

/// Tightly packed buffers for a program's declared inputs, one per input.
/// Used to validate a program before any real layout exists.
pub fn packed_inputs(interface: &ProgramInterface) -> Result<Vec<VertexBufferSpec>, String> {
    interface
        .attributes()
        .iter()
        .map(|input| {
            Ok(VertexBufferSpec {
                stride: u64::from(input.format.size()),
                attributes: vec![attribute(input.slot, input.format, 0)?],
            })
        })
        .collect()
}

pub fn clear_color(c: [f32; 4]) -> wgpu::Color {
    wgpu::Color {
        r: f64::from(c[0]),
        g: f64::from(c[1]),
        b: f64::from(c[2]),
        a: f64::from(c[3]),
    }
}
