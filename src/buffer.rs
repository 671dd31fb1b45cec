//! Framebuffer memory service
//!
//! The output manager never allocates scanout memory itself; it asks an
//! injected [`FramebufferAllocator`] for backing memory sized to a mode and
//! hands the opaque handle back when the framebuffer is superseded.
//! `DumbBufferAllocator` is the bundled implementation, backed by kernel
//! dumb buffers on a shared [`DrmCard`].

use std::collections::HashMap;
use std::io;
use std::num::NonZeroU32;

use drm::buffer::Buffer;
use drm::control::dumbbuffer::DumbBuffer;
use drm::control::Device as ControlDevice;
use log::{debug, warn};
use parking_lot::Mutex;

use crate::device::{scanout_format, DrmCard};

/// Result of a framebuffer memory allocation.
#[derive(Debug, Clone, Copy)]
pub struct FramebufferAllocation {
    /// Opaque memory handle; pass back to [`FramebufferAllocator::free`]
    pub memory: u32,
    /// Row stride in bytes chosen by the allocator
    pub stride: u32,
}

/// External buffer service: single-call request/response, no further
/// interaction. Implementations are shared across threads behind an `Arc`.
pub trait FramebufferAllocator: Send + Sync {
    /// Allocate scanout memory for a `width` x `height` framebuffer.
    fn allocate(&self, width: u32, height: u32) -> io::Result<FramebufferAllocation>;

    /// Release previously allocated memory. Unknown handles are ignored
    /// (logged), matching the fire-and-forget contract of the service.
    fn free(&self, memory: u32);
}

/// Allocator backed by kernel dumb buffers.
///
/// Dumb buffers are plain CPU-accessible scanout memory, the minimum the
/// KMS API guarantees; the kernel picks the stride. Live buffers are kept
/// by handle so `free` can return them.
pub struct DumbBufferAllocator {
    card: DrmCard,
    depth: u32,
    bpp: u32,
    live: Mutex<HashMap<u32, DumbBuffer>>,
}

impl DumbBufferAllocator {
    pub fn new(card: DrmCard, depth: u32, bpp: u32) -> Self {
        Self {
            card,
            depth,
            bpp,
            live: Mutex::new(HashMap::new()),
        }
    }
}

impl FramebufferAllocator for DumbBufferAllocator {
    fn allocate(&self, width: u32, height: u32) -> io::Result<FramebufferAllocation> {
        let format = scanout_format(self.depth, self.bpp);
        let buffer = self.card.create_dumb_buffer((width, height), format, self.bpp)?;
        let memory = NonZeroU32::from(buffer.handle()).get();
        let stride = buffer.pitch();
        debug!("allocated {width}x{height} dumb buffer, handle {memory}, stride {stride}");
        self.live.lock().insert(memory, buffer);
        Ok(FramebufferAllocation { memory, stride })
    }

    fn free(&self, memory: u32) {
        let Some(buffer) = self.live.lock().remove(&memory) else {
            warn!("ignoring free of unknown memory handle {memory}");
            return;
        };
        if let Err(err) = self.card.destroy_dumb_buffer(buffer) {
            warn!("failed to destroy dumb buffer {memory}: {err}");
        }
    }
}
