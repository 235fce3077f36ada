//! wgpu backend for the boxlight render device.
//!
//! Programs are compiled per stage inside validation error scopes and
//! linked by building a probe pipeline from their declared interface.
//! Real pipelines are created lazily per (program, layout) pair and cached
//! until either side changes.
//!
//! # Invariants
//! - Nothing here panics on a GPU error: validation failures surface as
//!   `RenderError`s and uncaptured errors are logged.
//! - A frame is encoded as one render pass at `present()`.

mod format;
mod gpu;

pub use format::{VertexBufferSpec, clear_color, group_bindings, packed_inputs, vertex_format};
pub use gpu::WgpuDevice;
