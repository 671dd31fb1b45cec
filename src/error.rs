//! Crate error taxonomy
//!
//! Every failure is surfaced as a value: a missing or misbehaving display is
//! an expected, recoverable runtime condition, not a programming error.
//! Kernel-call failures carry the underlying I/O error as their source.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::output::OutputId;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("mode-setting device is not initialized")]
    NotInitialized,

    #[error("failed to open mode-setting device {}", path.display())]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no output slot mapped for device id {0}")]
    InvalidDevice(u32),

    #[error("device resource enumeration failed")]
    ResourceQuery(#[source] io::Error),

    #[error("no matching connector present for the {0} output")]
    ConnectorNotFound(OutputId),

    #[error("no matching encoder or CRTC for the connected {0} output")]
    TopologyResolution(OutputId),

    #[error("{0} output is not connected")]
    NotConnected(OutputId),

    #[error("{0} connector offers no modes")]
    NoModes(OutputId),

    #[error("mode selection is not supported on the {0} output")]
    UnsupportedOutput(OutputId),

    #[error("framebuffer allocation failed")]
    FramebufferAlloc(#[source] io::Error),

    #[error("framebuffer registration failed")]
    FramebufferRegister(#[source] io::Error),

    #[error("CRTC mode programming failed")]
    ModeSet(#[source] io::Error),

    #[error("driver command payload is empty")]
    EmptyPayload,

    #[error("driver command {cmd:#x} failed")]
    Ioctl {
        cmd: u32,
        #[source]
        source: io::Error,
    },

    #[error("display power control is not available")]
    PowerControlUnavailable,
}
