//! KMS display output management
//!
//! Discovers the display pipeline topology (connector → encoder → CRTC) on
//! a kernel mode-setting device, applies display timings, and manages the
//! framebuffer object bound to each active output.

pub mod buffer;
pub mod config;
pub mod device;
pub mod error;
pub mod mode;
pub mod output;

// Re-export commonly used types
pub use buffer::{DumbBufferAllocator, FramebufferAllocation, FramebufferAllocator};
pub use config::{ConfigError, OutputTopology, PlatformConfig};
pub use device::{ConnectorKind, DrmCard, EncoderKind, ModeSetDevice};
pub use error::OutputError;
pub use mode::{DisplayMode, ModeFlags, ModeKind};
pub use output::{OutputId, OutputManager, PowerMode};
