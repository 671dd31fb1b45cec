//! Mode-setting device abstraction
//!
//! `ModeSetDevice` is the seam between the output manager and the kernel:
//! resource enumeration, connector/encoder/CRTC descriptors, framebuffer
//! registration, CRTC programming, and raw driver-command passthrough.
//! `DrmCard` implements it over a real `/dev/dri/card*` node; tests drive
//! the manager against an in-memory fake.

mod card;

pub use card::DrmCard;
pub(crate) use card::scanout_format;

use std::io;

use serde::{Deserialize, Serialize};

use crate::mode::DisplayMode;

/// Physical connector type, mirroring the kernel connector enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectorKind {
    Unknown,
    Vga,
    DviI,
    DviD,
    DviA,
    Composite,
    SVideo,
    Lvds,
    Component,
    NinePinDin,
    DisplayPort,
    HdmiA,
    HdmiB,
    Tv,
    Edp,
    Virtual,
    Dsi,
    Dpi,
}

impl ConnectorKind {
    /// Human-readable connector type name.
    pub fn name(self) -> &'static str {
        match self {
            ConnectorKind::Unknown => "Unknown",
            ConnectorKind::Vga => "VGA",
            ConnectorKind::DviI => "DVI-I",
            ConnectorKind::DviD => "DVI-D",
            ConnectorKind::DviA => "DVI-A",
            ConnectorKind::Composite => "Composite",
            ConnectorKind::SVideo => "S-Video",
            ConnectorKind::Lvds => "LVDS",
            ConnectorKind::Component => "Component",
            ConnectorKind::NinePinDin => "DIN",
            ConnectorKind::DisplayPort => "DP",
            ConnectorKind::HdmiA => "HDMI-A",
            ConnectorKind::HdmiB => "HDMI-B",
            ConnectorKind::Tv => "TV",
            ConnectorKind::Edp => "eDP",
            ConnectorKind::Virtual => "Virtual",
            ConnectorKind::Dsi => "DSI",
            ConnectorKind::Dpi => "DPI",
        }
    }
}

/// Signal encoder type, mirroring the kernel encoder enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncoderKind {
    None,
    Dac,
    Tmds,
    Lvds,
    TvDac,
    Virtual,
    Dsi,
    DpMst,
    Dpi,
}

/// Connection state reported by a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Unknown,
}

/// Resource id lists returned by device enumeration.
#[derive(Debug, Clone, Default)]
pub struct ResourceIds {
    pub connectors: Vec<u32>,
    pub encoders: Vec<u32>,
    pub crtcs: Vec<u32>,
}

/// Snapshot of a connector: capabilities, supported modes, physical size.
#[derive(Debug, Clone)]
pub struct ConnectorDesc {
    pub id: u32,
    pub kind: ConnectorKind,
    pub state: ConnectionState,
    /// Supported timing list, in the connector's reported order
    pub modes: Vec<DisplayMode>,
    /// Physical size in millimeters (0,0 when unknown)
    pub size_mm: (u32, u32),
    /// Encoder currently attached to the connector, if any
    pub encoder_id: Option<u32>,
}

/// Snapshot of a signal encoder.
#[derive(Debug, Clone)]
pub struct EncoderDesc {
    pub id: u32,
    pub kind: EncoderKind,
    /// CRTC currently bound to the encoder, if any
    pub crtc_id: Option<u32>,
}

/// Snapshot of a CRTC (timing generator).
#[derive(Debug, Clone)]
pub struct CrtcDesc {
    pub id: u32,
    /// Framebuffer currently scanned out, if any; `None` marks a spare CRTC
    pub framebuffer_id: Option<u32>,
    /// Mode currently programmed by the kernel, if any
    pub mode: Option<DisplayMode>,
}

/// Parameters for registering a framebuffer object.
#[derive(Debug, Clone, Copy)]
pub struct FramebufferRequest {
    pub width: u32,
    pub height: u32,
    /// Row stride in bytes, as reported by the allocator
    pub stride: u32,
    /// Backing memory handle
    pub memory: u32,
    /// Color depth in bits
    pub depth: u32,
    /// Bits per pixel
    pub bpp: u32,
}

/// Synchronous interface to a kernel mode-setting device.
///
/// Every call is a single request/response against the open device; none
/// suspend cooperatively. Implementations report failures as plain
/// `io::Error` values and leave retry/teardown policy to the caller.
pub trait ModeSetDevice: Send {
    /// Enumerate the device's connector, encoder, and CRTC ids.
    fn resource_ids(&self) -> io::Result<ResourceIds>;

    /// Fetch the full descriptor for one connector.
    fn connector(&self, id: u32) -> io::Result<ConnectorDesc>;

    /// Fetch the descriptor for one encoder.
    fn encoder(&self, id: u32) -> io::Result<EncoderDesc>;

    /// Fetch the descriptor for one CRTC.
    fn crtc(&self, id: u32) -> io::Result<CrtcDesc>;

    /// Register a framebuffer object over allocated memory, returning its id.
    fn register_framebuffer(&self, request: &FramebufferRequest) -> io::Result<u32>;

    /// Remove a previously registered framebuffer object.
    fn release_framebuffer(&self, fb_id: u32) -> io::Result<()>;

    /// Program a CRTC: scan out `fb_id` through `connector_id` at offset
    /// (0,0) with the given mode timings.
    fn set_crtc(&self, crtc_id: u32, fb_id: u32, connector_id: u32, mode: &DisplayMode)
        -> io::Result<()>;

    /// Forward a driver-private command with a write-only payload.
    fn command_write(&self, cmd: u32, payload: &[u8]) -> io::Result<()>;

    /// Forward a driver-private command, reading the payload back.
    fn command_write_read(&self, cmd: u32, payload: &mut [u8]) -> io::Result<()>;
}
