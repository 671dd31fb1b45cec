//! Output slots and per-output state
//!
//! The manager drives a fixed table of logical output slots. `OutputId`
//! names a slot; `OutputState` is everything the manager holds for it
//! between detection cycles.

mod manager;

pub use manager::OutputManager;

use std::fmt;

use crate::device::{ConnectorDesc, CrtcDesc, EncoderDesc};
use crate::error::OutputError;
use crate::mode::DisplayMode;

/// Logical output slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputId {
    /// Internal panel
    Primary,
    /// External connector
    External,
}

impl OutputId {
    /// Number of output slots the manager tracks.
    pub const COUNT: usize = 2;

    /// All slots, in table order.
    pub const ALL: [OutputId; Self::COUNT] = [OutputId::Primary, OutputId::External];

    /// Resolve a raw device id (as used by configuration or IPC callers)
    /// to an output slot.
    pub fn from_raw(raw: u32) -> Result<Self, OutputError> {
        match raw {
            0 => Ok(OutputId::Primary),
            1 => Ok(OutputId::External),
            other => Err(OutputError::InvalidDevice(other)),
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            OutputId::Primary => 0,
            OutputId::External => 1,
        }
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputId::Primary => f.write_str("primary"),
            OutputId::External => f.write_str("external"),
        }
    }
}

/// Display power state for [`OutputManager::set_power_mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    On,
    Off,
}

/// A registered framebuffer object together with its backing memory.
///
/// The two handles only ever exist as a pair: a framebuffer registration
/// always has backing memory and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BoundFramebuffer {
    /// Framebuffer object id registered with the device
    pub id: u32,
    /// Backing memory handle owned by the allocator
    pub memory: u32,
}

/// Per-slot output state.
///
/// Reset to the empty state at construction, after every failed or
/// superseded detection, and at teardown. Once populated, only
/// `active_mode` and `framebuffer` change until the next detect.
#[derive(Debug, Default)]
pub(crate) struct OutputState {
    pub connected: bool,
    pub connector: Option<ConnectorDesc>,
    pub encoder: Option<EncoderDesc>,
    pub crtc: Option<CrtcDesc>,
    pub active_mode: DisplayMode,
    pub framebuffer: Option<BoundFramebuffer>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_ids_map_to_slots() {
        assert_eq!(OutputId::from_raw(0).unwrap(), OutputId::Primary);
        assert_eq!(OutputId::from_raw(1).unwrap(), OutputId::External);
        assert!(matches!(
            OutputId::from_raw(7),
            Err(OutputError::InvalidDevice(7))
        ));
    }

    #[test]
    fn slot_labels() {
        assert_eq!(OutputId::Primary.to_string(), "primary");
        assert_eq!(OutputId::External.to_string(), "external");
    }
}
