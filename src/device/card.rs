//! DRM card device
//!
//! `DrmCard` wraps an open `/dev/dri/card*` node and maps the
//! [`ModeSetDevice`] operations onto the legacy KMS control API. Driver
//! private commands bypass the typed API and go straight through
//! `libc::ioctl` with the command-region request encoding.

use std::fs::{File, OpenOptions};
use std::io;
use std::num::NonZeroU32;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::path::Path;
use std::sync::Arc;

use drm::buffer::{Buffer, DrmFourcc, Handle as BufferHandle};
use drm::control::{connector, crtc, encoder, framebuffer, Device as ControlDevice, Mode,
    ResourceHandle};
use drm::Device as BasicDevice;
use log::info;

use super::{ConnectionState, ConnectorDesc, ConnectorKind, CrtcDesc, EncoderDesc, EncoderKind,
    FramebufferRequest, ModeSetDevice, ResourceIds};
use crate::mode::{DisplayMode, ModeFlags, ModeKind};

// Driver-private commands live in the command region of the device ioctl
// space: 'd' type, numbers offset by DRM_COMMAND_BASE.
const DRM_IOCTL_BASE: u64 = 0x64;
const DRM_COMMAND_BASE: u64 = 0x40;

/// An open DRM card device node.
///
/// Cheap to clone; clones share the same open file description, which lets
/// the dumb-buffer allocator and the output manager drive one card.
#[derive(Debug, Clone)]
pub struct DrmCard {
    file: Arc<File>,
}

// Trait implementations required by the drm crate
impl AsFd for DrmCard {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl BasicDevice for DrmCard {}
impl ControlDevice for DrmCard {}

impl DrmCard {
    /// Open the mode-setting device node read/write.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        info!("opened mode-setting device {}", path.display());
        Ok(Self {
            file: Arc::new(file),
        })
    }

    /// Forward a raw ioctl, retrying on signal interruption.
    fn forward_ioctl(&self, request: libc::c_ulong, data: *mut libc::c_void) -> io::Result<()> {
        loop {
            let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), request, data) };
            if ret == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(code) if code == libc::EINTR || code == libc::EAGAIN => continue,
                _ => return Err(err),
            }
        }
    }
}

/// Convert a raw resource id into a typed drm handle.
fn resource_handle<T: ResourceHandle>(id: u32) -> io::Result<T> {
    NonZeroU32::new(id)
        .map(T::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "zero resource id"))
}

fn connector_kind(interface: connector::Interface) -> ConnectorKind {
    match interface {
        connector::Interface::VGA => ConnectorKind::Vga,
        connector::Interface::DVII => ConnectorKind::DviI,
        connector::Interface::DVID => ConnectorKind::DviD,
        connector::Interface::DVIA => ConnectorKind::DviA,
        connector::Interface::Composite => ConnectorKind::Composite,
        connector::Interface::SVideo => ConnectorKind::SVideo,
        connector::Interface::LVDS => ConnectorKind::Lvds,
        connector::Interface::Component => ConnectorKind::Component,
        connector::Interface::DisplayPort => ConnectorKind::DisplayPort,
        connector::Interface::HDMIA => ConnectorKind::HdmiA,
        connector::Interface::HDMIB => ConnectorKind::HdmiB,
        connector::Interface::TV => ConnectorKind::Tv,
        connector::Interface::EmbeddedDisplayPort => ConnectorKind::Edp,
        connector::Interface::Virtual => ConnectorKind::Virtual,
        connector::Interface::DSI => ConnectorKind::Dsi,
        connector::Interface::DPI => ConnectorKind::Dpi,
        _ => ConnectorKind::Unknown,
    }
}

fn encoder_kind(kind: encoder::Kind) -> EncoderKind {
    match kind {
        encoder::Kind::DAC => EncoderKind::Dac,
        encoder::Kind::TMDS => EncoderKind::Tmds,
        encoder::Kind::LVDS => EncoderKind::Lvds,
        encoder::Kind::TVDAC => EncoderKind::TvDac,
        encoder::Kind::Virtual => EncoderKind::Virtual,
        encoder::Kind::DSI => EncoderKind::Dsi,
        encoder::Kind::DPMST => EncoderKind::DpMst,
        encoder::Kind::DPI => EncoderKind::Dpi,
        _ => EncoderKind::None,
    }
}

fn connection_state(state: connector::State) -> ConnectionState {
    match state {
        connector::State::Connected => ConnectionState::Connected,
        connector::State::Disconnected => ConnectionState::Disconnected,
        connector::State::Unknown => ConnectionState::Unknown,
    }
}

fn display_mode(mode: &Mode) -> DisplayMode {
    let (hdisplay, vdisplay) = mode.size();
    let (hsync_start, hsync_end, htotal) = mode.hsync();
    let (vsync_start, vsync_end, vtotal) = mode.vsync();
    DisplayMode {
        clock: mode.clock(),
        hdisplay,
        hsync_start,
        hsync_end,
        htotal,
        hskew: mode.hskew(),
        vdisplay,
        vsync_start,
        vsync_end,
        vtotal,
        vscan: mode.vscan(),
        vrefresh: mode.vrefresh(),
        flags: ModeFlags::from_bits_truncate(mode.flags().bits()),
        kind: ModeKind::from_bits_truncate(mode.mode_type().bits()),
        name: mode.name().to_string_lossy().into_owned(),
    }
}

/// Legacy AddFB pixel format for a depth/bpp pair.
pub(crate) fn scanout_format(depth: u32, bpp: u32) -> DrmFourcc {
    match (depth, bpp) {
        (8, 8) => DrmFourcc::C8,
        (15, 16) => DrmFourcc::Xrgb1555,
        (16, 16) => DrmFourcc::Rgb565,
        (30, 32) => DrmFourcc::Xrgb2101010,
        (32, 32) => DrmFourcc::Argb8888,
        _ => DrmFourcc::Xrgb8888,
    }
}

/// Scanout memory already held by the allocator, described well enough for
/// framebuffer registration.
struct GemScanout {
    size: (u32, u32),
    pitch: u32,
    handle: BufferHandle,
    format: DrmFourcc,
}

impl Buffer for GemScanout {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn format(&self) -> DrmFourcc {
        self.format
    }

    fn pitch(&self) -> u32 {
        self.pitch
    }

    fn handle(&self) -> BufferHandle {
        self.handle
    }
}

impl ModeSetDevice for DrmCard {
    fn resource_ids(&self) -> io::Result<ResourceIds> {
        let handles = self.resource_handles()?;
        Ok(ResourceIds {
            connectors: handles.connectors().iter().map(|h| u32::from(*h)).collect(),
            encoders: handles.encoders().iter().map(|h| u32::from(*h)).collect(),
            crtcs: handles.crtcs().iter().map(|h| u32::from(*h)).collect(),
        })
    }

    fn connector(&self, id: u32) -> io::Result<ConnectorDesc> {
        let handle: connector::Handle = resource_handle(id)?;
        let info = self.get_connector(handle, false)?;
        Ok(ConnectorDesc {
            id,
            kind: connector_kind(info.interface()),
            state: connection_state(info.state()),
            modes: info.modes().iter().map(display_mode).collect(),
            size_mm: info.size().unwrap_or((0, 0)),
            encoder_id: info.current_encoder().map(u32::from),
        })
    }

    fn encoder(&self, id: u32) -> io::Result<EncoderDesc> {
        let handle: encoder::Handle = resource_handle(id)?;
        let info = self.get_encoder(handle)?;
        Ok(EncoderDesc {
            id,
            kind: encoder_kind(info.kind()),
            crtc_id: info.crtc().map(u32::from),
        })
    }

    fn crtc(&self, id: u32) -> io::Result<CrtcDesc> {
        let handle: crtc::Handle = resource_handle(id)?;
        let info = self.get_crtc(handle)?;
        Ok(CrtcDesc {
            id,
            framebuffer_id: info.framebuffer().map(u32::from),
            mode: info.mode().as_ref().map(display_mode),
        })
    }

    fn register_framebuffer(&self, request: &FramebufferRequest) -> io::Result<u32> {
        let scanout = GemScanout {
            size: (request.width, request.height),
            pitch: request.stride,
            handle: BufferHandle::from(NonZeroU32::new(request.memory).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "zero memory handle")
            })?),
            format: scanout_format(request.depth, request.bpp),
        };
        let fb = self.add_framebuffer(&scanout, request.depth, request.bpp)?;
        Ok(u32::from(fb))
    }

    fn release_framebuffer(&self, fb_id: u32) -> io::Result<()> {
        let handle: framebuffer::Handle = resource_handle(fb_id)?;
        self.destroy_framebuffer(handle)
    }

    fn set_crtc(
        &self,
        crtc_id: u32,
        fb_id: u32,
        connector_id: u32,
        mode: &DisplayMode,
    ) -> io::Result<()> {
        let crtc_handle: crtc::Handle = resource_handle(crtc_id)?;
        let fb_handle: framebuffer::Handle = resource_handle(fb_id)?;
        let conn_handle: connector::Handle = resource_handle(connector_id)?;

        // Every mode this crate programs was selected from the connector's
        // own timing list, so the kernel record can be recovered from there
        // instead of being rebuilt from raw parts.
        let info = self.get_connector(conn_handle, false)?;
        let native = info
            .modes()
            .iter()
            .find(|m| {
                m.size() == (mode.hdisplay, mode.vdisplay)
                    && m.vrefresh() == mode.vrefresh
                    && m.flags().bits() == mode.flags.bits()
                    && m.clock() == mode.clock
            })
            .copied()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "requested mode is not offered by the connector",
                )
            })?;

        ControlDevice::set_crtc(
            self,
            crtc_handle,
            Some(fb_handle),
            (0, 0),
            &[conn_handle],
            Some(native),
        )
    }

    fn command_write(&self, cmd: u32, payload: &[u8]) -> io::Result<()> {
        let request = nix::request_code_write!(
            DRM_IOCTL_BASE,
            DRM_COMMAND_BASE + u64::from(cmd),
            payload.len()
        ) as libc::c_ulong;
        self.forward_ioctl(request, payload.as_ptr() as *mut libc::c_void)
    }

    fn command_write_read(&self, cmd: u32, payload: &mut [u8]) -> io::Result<()> {
        let request = nix::request_code_readwrite!(
            DRM_IOCTL_BASE,
            DRM_COMMAND_BASE + u64::from(cmd),
            payload.len()
        ) as libc::c_ulong;
        self.forward_ioctl(request, payload.as_mut_ptr() as *mut libc::c_void)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_formats_map_from_depth_and_bpp() {
        assert_eq!(scanout_format(24, 32), DrmFourcc::Xrgb8888);
        assert_eq!(scanout_format(32, 32), DrmFourcc::Argb8888);
        assert_eq!(scanout_format(16, 16), DrmFourcc::Rgb565);
        // Unrecognized pairs fall back to the 24/32 default.
        assert_eq!(scanout_format(12, 48), DrmFourcc::Xrgb8888);
    }
}
