//! Display output manager
//!
//! Owns the mode-setting device handle and a fixed table of output slots.
//! `detect` re-synchronizes one slot with the hardware topology
//! (connector → encoder → CRTC), the mode-set entry points re-bind the
//! slot's framebuffer, and one mutex serializes everything.

use std::sync::Arc;

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use super::{BoundFramebuffer, OutputId, OutputState, PowerMode};
use crate::buffer::FramebufferAllocator;
use crate::config::PlatformConfig;
use crate::device::{ConnectionState, DrmCard, FramebufferRequest, ModeSetDevice};
use crate::error::OutputError;
use crate::mode::DisplayMode;

struct ManagerState {
    /// Open device; `None` until `initialize`
    device: Option<Box<dyn ModeSetDevice>>,
    outputs: [OutputState; OutputId::COUNT],
}

/// Manages the lifecycle of the physical display outputs on one
/// mode-setting device.
///
/// All operations are fully serialized through an internal mutex; callers
/// may invoke them from any thread. Device queries are synchronous kernel
/// calls and may block the calling thread.
pub struct OutputManager {
    config: PlatformConfig,
    allocator: Arc<dyn FramebufferAllocator>,
    state: Mutex<ManagerState>,
}

impl OutputManager {
    /// Create a manager over the given platform description and buffer
    /// service. No device access happens until [`initialize`].
    ///
    /// [`initialize`]: OutputManager::initialize
    pub fn new(config: PlatformConfig, allocator: Arc<dyn FramebufferAllocator>) -> Self {
        Self {
            config,
            allocator,
            state: Mutex::new(ManagerState {
                device: None,
                outputs: Default::default(),
            }),
        }
    }

    /// Open the configured mode-setting device. Idempotent: a second call
    /// on an initialized manager logs and succeeds without reopening.
    pub fn initialize(&self) -> Result<(), OutputError> {
        let path = self.config.device_path.clone();
        let mut state = self.state.lock();
        if state.device.is_some() {
            warn!("output manager is already initialized");
            return Ok(());
        }
        let card = DrmCard::open(&path).map_err(|source| {
            error!("failed to open {}: {source}", path.display());
            OutputError::DeviceOpen { path, source }
        })?;
        state.outputs = Default::default();
        state.device = Some(Box::new(card));
        Ok(())
    }

    /// Adopt an already-open device instead of opening the configured node.
    /// Used when the device is shared with other collaborators (such as the
    /// bundled dumb-buffer allocator) and by tests. Same idempotence
    /// contract as [`initialize`]: a second call drops `device` unused.
    ///
    /// [`initialize`]: OutputManager::initialize
    pub fn initialize_with(&self, device: Box<dyn ModeSetDevice>) -> Result<(), OutputError> {
        let mut state = self.state.lock();
        if state.device.is_some() {
            warn!("output manager is already initialized");
            return Ok(());
        }
        state.outputs = Default::default();
        state.device = Some(device);
        Ok(())
    }

    /// Tear down every output slot and close the device. Safe to call
    /// repeatedly; a second call is a no-op.
    pub fn deinitialize(&self) {
        let mut state = self.state.lock();
        let ManagerState { device, outputs } = &mut *state;
        let Some(dev) = device.as_deref() else {
            return;
        };
        for output in outputs.iter_mut() {
            Self::reset_output(output, dev, self.allocator.as_ref());
        }
        *device = None;
        info!("mode-setting device closed");
    }

    /// Re-synchronize one output slot with the current hardware topology.
    ///
    /// On success the slot is either populated (connector, encoder, and
    /// CRTC resolved, active mode known) or deliberately left empty: a
    /// matching connector without a display plugged in, or a non-primary
    /// output whose connector is absent altogether. Any failure leaves the
    /// slot fully reset.
    pub fn detect(&self, id: OutputId) -> Result<(), OutputError> {
        let mut state = self.state.lock();
        let ManagerState { device, outputs } = &mut *state;
        let device = device.as_deref().ok_or(OutputError::NotInitialized)?;
        let output = &mut outputs[id.index()];

        // Discovery always starts from a clean slate; a populated slot is
        // never mutated in place.
        Self::reset_output(output, device, self.allocator.as_ref());

        let resources = device.resource_ids().map_err(|source| {
            error!("resource enumeration failed: {source}");
            OutputError::ResourceQuery(source)
        })?;
        let topology = self.config.topology(id);

        // The first connector of the expected type is the one, whatever its
        // connection state.
        let mut connector = None;
        for &connector_id in &resources.connectors {
            let desc = match device.connector(connector_id) {
                Ok(desc) => desc,
                Err(err) => {
                    warn!("skipping connector {connector_id}: {err}");
                    continue;
                }
            };
            if desc.kind != topology.connector {
                continue;
            }
            connector = Some(desc);
            break;
        }

        let Some(connector) = connector else {
            if id == OutputId::Primary {
                error!(
                    "no {} connector present for the primary output",
                    topology.connector.name()
                );
                return Err(OutputError::ConnectorNotFound(id));
            }
            // A secondary output that simply is not there is not an error.
            info!("{id} output absent");
            return Ok(());
        };

        if connector.state != ConnectionState::Connected {
            info!("{id} output is not connected");
            return Ok(());
        }

        // Prefer the encoder the connector is already attached to.
        let mut encoder = None;
        if let Some(encoder_id) = connector.encoder_id {
            match device.encoder(encoder_id) {
                Ok(desc) => encoder = Some(desc),
                Err(err) => warn!("attached encoder {encoder_id} unavailable: {err}"),
            }
        }
        if encoder.is_none() {
            debug!("scanning encoders for the {id} output");
            for &encoder_id in &resources.encoders {
                let desc = match device.encoder(encoder_id) {
                    Ok(desc) => desc,
                    Err(err) => {
                        warn!("skipping encoder {encoder_id}: {err}");
                        continue;
                    }
                };
                if desc.kind == topology.encoder {
                    encoder = Some(desc);
                    break;
                }
            }
        }
        let Some(encoder) = encoder else {
            error!("no {:?} encoder for the connected {id} output", topology.encoder);
            return Err(OutputError::TopologyResolution(id));
        };

        // Prefer the CRTC already bound to the encoder, else take a spare.
        let mut crtc = None;
        if let Some(crtc_id) = encoder.crtc_id {
            match device.crtc(crtc_id) {
                Ok(desc) => crtc = Some(desc),
                Err(err) => warn!("attached CRTC {crtc_id} unavailable: {err}"),
            }
        }
        if crtc.is_none() {
            debug!("scanning for a spare CRTC for the {id} output");
            for &crtc_id in &resources.crtcs {
                let desc = match device.crtc(crtc_id) {
                    Ok(desc) => desc,
                    Err(err) => {
                        warn!("skipping CRTC {crtc_id}: {err}");
                        continue;
                    }
                };
                if desc.framebuffer_id.is_none() {
                    crtc = Some(desc);
                    break;
                }
            }
        }
        let Some(crtc) = crtc else {
            error!("no usable CRTC for the connected {id} output");
            return Err(OutputError::TopologyResolution(id));
        };

        let kernel_mode = crtc.mode.clone();
        output.connector = Some(connector);
        output.encoder = Some(encoder);
        output.crtc = Some(crtc);
        output.connected = true;

        let result = match kernel_mode {
            Some(mode) if mode.is_valid() => {
                // The kernel already drives this pipe; adopt its mode
                // without touching the framebuffer.
                debug!("{id} output already has a kernel-set mode");
                output.active_mode = mode;
                Ok(())
            }
            _ => Self::init_preferred_mode(device, self.allocator.as_ref(), &self.config, id, output),
        };

        match result {
            Ok(()) => {
                info!("{id} output mode is {}", output.active_mode);
                Ok(())
            }
            Err(err) => {
                Self::reset_output(output, device, self.allocator.as_ref());
                Err(err)
            }
        }
    }

    /// Select and apply a mode on the external output.
    ///
    /// The requested value is matched against the connector's supported
    /// modes; when nothing matches, the connector's preferred entry wins.
    pub fn set_mode(&self, id: OutputId, mode: &DisplayMode) -> Result<(), OutputError> {
        let mut state = self.state.lock();
        let ManagerState { device, outputs } = &mut *state;
        let device = device.as_deref().ok_or(OutputError::NotInitialized)?;
        if id != OutputId::External {
            warn!("rejecting mode selection on the {id} output");
            return Err(OutputError::UnsupportedOutput(id));
        }
        let output = &mut outputs[id.index()];
        let selected = Self::select_mode(output, id, |candidate| candidate.matches(mode))?;
        Self::apply_mode(device, self.allocator.as_ref(), &self.config, id, output, &selected)
    }

    /// Switch the external output to `hz` at its current resolution,
    /// falling back to the connector's preferred mode when the connector
    /// offers no such timing.
    pub fn set_refresh_rate(&self, id: OutputId, hz: u32) -> Result<(), OutputError> {
        let mut state = self.state.lock();
        let ManagerState { device, outputs } = &mut *state;
        let device = device.as_deref().ok_or(OutputError::NotInitialized)?;
        if id != OutputId::External {
            warn!("rejecting refresh-rate selection on the {id} output");
            return Err(OutputError::UnsupportedOutput(id));
        }
        let output = &mut outputs[id.index()];
        let active = output.active_mode.clone();
        let selected = Self::select_mode(output, id, |candidate| {
            candidate.hdisplay == active.hdisplay
                && candidate.vdisplay == active.vdisplay
                && candidate.vrefresh == hz
        })?;
        Self::apply_mode(device, self.allocator.as_ref(), &self.config, id, output, &selected)
    }

    /// Active mode of a connected output, or `None` when the slot is
    /// unresolved, unconnected, or reports a zero-sized mode.
    pub fn mode_info(&self, id: OutputId) -> Option<DisplayMode> {
        let state = self.state.lock();
        let output = &state.outputs[id.index()];
        if !output.connected {
            debug!("{id} output is not connected");
            return None;
        }
        if !output.active_mode.is_valid() {
            debug!("{id} output has no valid mode");
            return None;
        }
        Some(output.active_mode.clone())
    }

    /// Physical size of a connected display in millimeters.
    pub fn physical_size(&self, id: OutputId) -> Option<(u32, u32)> {
        let state = self.state.lock();
        let output = &state.outputs[id.index()];
        if !output.connected {
            return None;
        }
        output.connector.as_ref().map(|connector| connector.size_mm)
    }

    /// Whether the last detection cycle found a connected display.
    pub fn is_connected(&self, id: OutputId) -> bool {
        self.state.lock().outputs[id.index()].connected
    }

    /// Display power toggle. Not wired up: the DPMS property path never
    /// shipped, so this consistently fails without touching the device.
    pub fn set_power_mode(&self, id: OutputId, mode: PowerMode) -> Result<(), OutputError> {
        warn!("ignoring {mode:?} power request for the {id} output");
        Err(OutputError::PowerControlUnavailable)
    }

    /// Forward a driver-private command with a write-only payload.
    pub fn command_write(&self, cmd: u32, payload: &[u8]) -> Result<(), OutputError> {
        let state = self.state.lock();
        let device = state.device.as_deref().ok_or(OutputError::NotInitialized)?;
        if payload.is_empty() {
            return Err(OutputError::EmptyPayload);
        }
        device.command_write(cmd, payload).map_err(|source| {
            warn!("driver command {cmd:#x} failed: {source}");
            OutputError::Ioctl { cmd, source }
        })
    }

    /// Forward a driver-private command and read the payload back.
    pub fn command_write_read(&self, cmd: u32, payload: &mut [u8]) -> Result<(), OutputError> {
        let state = self.state.lock();
        let device = state.device.as_deref().ok_or(OutputError::NotInitialized)?;
        if payload.is_empty() {
            return Err(OutputError::EmptyPayload);
        }
        device.command_write_read(cmd, payload).map_err(|source| {
            warn!("driver command {cmd:#x} failed: {source}");
            OutputError::Ioctl { cmd, source }
        })
    }

    /// Pick an entry from the connector's mode list: the first one
    /// `matches` accepts, else the preferred entry seen so far, else the
    /// first entry.
    fn select_mode<F>(
        output: &OutputState,
        id: OutputId,
        matches: F,
    ) -> Result<DisplayMode, OutputError>
    where
        F: Fn(&DisplayMode) -> bool,
    {
        if !output.connected {
            return Err(OutputError::NotConnected(id));
        }
        let connector = output
            .connector
            .as_ref()
            .ok_or(OutputError::NotConnected(id))?;
        if connector.modes.is_empty() {
            error!("{id} connector reports no modes");
            return Err(OutputError::NoModes(id));
        }
        let mut index = 0;
        for (i, candidate) in connector.modes.iter().enumerate() {
            if candidate.is_preferred() {
                index = i;
            }
            if matches(candidate) {
                index = i;
                break;
            }
        }
        Ok(connector.modes[index].clone())
    }

    /// Program the connector's preferred mode (first entry carrying the
    /// preferred bit, else entry 0). Used when detection finds an idle CRTC.
    fn init_preferred_mode(
        device: &dyn ModeSetDevice,
        allocator: &dyn FramebufferAllocator,
        config: &PlatformConfig,
        id: OutputId,
        output: &mut OutputState,
    ) -> Result<(), OutputError> {
        let preferred = {
            let connector = output
                .connector
                .as_ref()
                .ok_or(OutputError::NotConnected(id))?;
            if connector.modes.is_empty() {
                error!("{id} connector reports no modes");
                return Err(OutputError::NoModes(id));
            }
            connector
                .modes
                .iter()
                .find(|mode| mode.is_preferred())
                .unwrap_or(&connector.modes[0])
                .clone()
        };
        debug!("programming preferred mode {preferred} on the {id} output");
        Self::apply_mode(device, allocator, config, id, output, &preferred)
    }

    /// Bind `mode` as the slot's active timing and framebuffer, or confirm
    /// it already is.
    ///
    /// The old framebuffer pair stays bound until the replacement is
    /// registered, and is released only after the CRTC bind attempt;
    /// swapping before releasing avoids a visible blank frame. When the
    /// bind itself fails the new framebuffer is kept as the slot's
    /// reference point and the error is surfaced to the caller.
    fn apply_mode(
        device: &dyn ModeSetDevice,
        allocator: &dyn FramebufferAllocator,
        config: &PlatformConfig,
        id: OutputId,
        output: &mut OutputState,
        mode: &DisplayMode,
    ) -> Result<(), OutputError> {
        if output.active_mode.matches(mode) {
            debug!("{id} output already drives {mode}, skipping re-bind");
            return Ok(());
        }

        let connector_id = output
            .connector
            .as_ref()
            .map(|connector| connector.id)
            .ok_or(OutputError::NotConnected(id))?;
        let crtc_id = output
            .crtc
            .as_ref()
            .map(|crtc| crtc.id)
            .ok_or(OutputError::NotConnected(id))?;

        let width = u32::from(mode.hdisplay);
        let height = u32::from(mode.vdisplay);
        let allocation = allocator.allocate(width, height).map_err(|source| {
            error!("framebuffer allocation failed for the {id} output: {source}");
            OutputError::FramebufferAlloc(source)
        })?;

        let request = FramebufferRequest {
            width,
            height,
            stride: allocation.stride,
            memory: allocation.memory,
            depth: config.fb_depth,
            bpp: config.fb_bpp,
        };
        let fb_id = match device.register_framebuffer(&request) {
            Ok(fb_id) => fb_id,
            Err(source) => {
                error!("framebuffer registration failed for the {id} output: {source}");
                allocator.free(allocation.memory);
                return Err(OutputError::FramebufferRegister(source));
            }
        };

        // Swap in the new pair first; the superseded one is released only
        // after the bind attempt.
        let superseded = output.framebuffer.replace(BoundFramebuffer {
            id: fb_id,
            memory: allocation.memory,
        });

        let bind = device.set_crtc(crtc_id, fb_id, connector_id, mode);
        match &bind {
            Ok(()) => {
                output.active_mode = mode.clone();
                info!("{id} output mode set: {mode}");
            }
            Err(err) => error!("CRTC bind failed on the {id} output: {err}"),
        }

        if let Some(old) = superseded {
            if let Err(err) = device.release_framebuffer(old.id) {
                warn!("failed to release framebuffer {}: {err}", old.id);
            }
            allocator.free(old.memory);
        }

        bind.map_err(OutputError::ModeSet)
    }

    /// Return one slot to the empty state, releasing any bound framebuffer
    /// and its backing memory.
    fn reset_output(
        output: &mut OutputState,
        device: &dyn ModeSetDevice,
        allocator: &dyn FramebufferAllocator,
    ) {
        output.connected = false;
        output.active_mode = DisplayMode::default();
        output.connector = None;
        output.encoder = None;
        output.crtc = None;
        if let Some(framebuffer) = output.framebuffer.take() {
            if let Err(err) = device.release_framebuffer(framebuffer.id) {
                warn!("failed to release framebuffer {}: {err}", framebuffer.id);
            }
            allocator.free(framebuffer.memory);
        }
    }
}
