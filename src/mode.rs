//! Display timing descriptors
//!
//! A `DisplayMode` mirrors the kernel's mode record: active/sync/total
//! timings for both axes, pixel clock, refresh rate, and the flag/type
//! bitmasks. Modes are plain values; they are copied out of connector and
//! CRTC descriptors and never own anything.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Mode flags, bit-compatible with the kernel's DRM_MODE_FLAG_* values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ModeFlags: u32 {
        const PHSYNC = 1 << 0;
        const NHSYNC = 1 << 1;
        const PVSYNC = 1 << 2;
        const NVSYNC = 1 << 3;
        const INTERLACE = 1 << 4;
        const DBLSCAN = 1 << 5;
        const CSYNC = 1 << 6;
        const PCSYNC = 1 << 7;
        const NCSYNC = 1 << 8;
        const HSKEW = 1 << 9;
        const DBLCLK = 1 << 12;
        const CLKDIV2 = 1 << 13;
    }
}

bitflags! {
    /// Mode type markers, bit-compatible with the kernel's DRM_MODE_TYPE_*
    /// values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ModeKind: u32 {
        const BUILTIN = 1 << 0;
        const PREFERRED = 1 << 3;
        const DEFAULT = 1 << 4;
        const USERDEF = 1 << 5;
        const DRIVER = 1 << 6;
    }
}

/// A display timing descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisplayMode {
    /// Pixel clock in kHz
    pub clock: u32,
    /// Horizontal active pixels
    pub hdisplay: u16,
    /// Horizontal sync start
    pub hsync_start: u16,
    /// Horizontal sync end
    pub hsync_end: u16,
    /// Horizontal total (including blanking)
    pub htotal: u16,
    /// Horizontal skew
    pub hskew: u16,
    /// Vertical active lines
    pub vdisplay: u16,
    /// Vertical sync start
    pub vsync_start: u16,
    /// Vertical sync end
    pub vsync_end: u16,
    /// Vertical total (including blanking)
    pub vtotal: u16,
    /// Vertical scan repetition
    pub vscan: u16,
    /// Refresh rate in Hz
    pub vrefresh: u32,
    /// Mode flags (sync polarity, interlace, ...)
    pub flags: ModeFlags,
    /// Mode type markers (preferred, driver, ...)
    pub kind: ModeKind,
    /// Mode name, e.g. "1920x1080"
    pub name: String,
}

impl DisplayMode {
    /// True when the mode describes a non-empty scanout area.
    pub fn is_valid(&self) -> bool {
        self.hdisplay != 0 && self.vdisplay != 0
    }

    /// True when the connector marked this entry as its preferred timing.
    pub fn is_preferred(&self) -> bool {
        self.kind.contains(ModeKind::PREFERRED)
    }

    /// Mode equality as the hardware sees it: same active area, same refresh
    /// rate, and every flag of `candidate` also set on `self`. A candidate
    /// that passes is already being driven by this mode, so re-binding it
    /// would only cause a visible flicker.
    pub fn matches(&self, candidate: &DisplayMode) -> bool {
        self.hdisplay == candidate.hdisplay
            && self.vdisplay == candidate.vdisplay
            && self.vrefresh == candidate.vrefresh
            && (self.flags & candidate.flags) == candidate.flags
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}Hz", self.hdisplay, self.vdisplay, self.vrefresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(width: u16, height: u16, hz: u32, flags: ModeFlags) -> DisplayMode {
        DisplayMode {
            hdisplay: width,
            vdisplay: height,
            vrefresh: hz,
            flags,
            name: format!("{}x{}", width, height),
            ..DisplayMode::default()
        }
    }

    #[test]
    fn zeroed_mode_is_invalid() {
        assert!(!DisplayMode::default().is_valid());
        assert!(mode(1920, 1080, 60, ModeFlags::empty()).is_valid());
    }

    #[test]
    fn matches_requires_equal_timings() {
        let base = mode(1920, 1080, 60, ModeFlags::PHSYNC);
        assert!(base.matches(&mode(1920, 1080, 60, ModeFlags::PHSYNC)));
        assert!(!base.matches(&mode(1920, 1080, 50, ModeFlags::PHSYNC)));
        assert!(!base.matches(&mode(1280, 720, 60, ModeFlags::PHSYNC)));
    }

    #[test]
    fn matches_treats_candidate_flags_as_subset() {
        let base = mode(1920, 1080, 60, ModeFlags::PHSYNC | ModeFlags::PVSYNC);
        // Candidate with fewer flags still matches...
        assert!(base.matches(&mode(1920, 1080, 60, ModeFlags::PHSYNC)));
        assert!(base.matches(&mode(1920, 1080, 60, ModeFlags::empty())));
        // ...but extra candidate flags do not.
        assert!(!base.matches(&mode(1920, 1080, 60, ModeFlags::INTERLACE)));
    }

    #[test]
    fn preferred_bit_is_detected() {
        let mut preferred = mode(1920, 1080, 60, ModeFlags::empty());
        preferred.kind = ModeKind::PREFERRED | ModeKind::DRIVER;
        assert!(preferred.is_preferred());
        assert!(!mode(1920, 1080, 60, ModeFlags::empty()).is_preferred());
    }

    #[test]
    fn display_formats_resolution_and_refresh() {
        let m = mode(1920, 1080, 60, ModeFlags::empty());
        assert_eq!(m.to_string(), "1920x1080@60Hz");
    }
}
