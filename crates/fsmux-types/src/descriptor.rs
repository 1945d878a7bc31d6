//! The global descriptor namespace.
//!
//! Raw integers only exist at the POSIX boundary. Everything behind it
//! carries a [`DescriptorHandle`], produced once from a raw value by
//! [`DescriptorLayout::resolve`] or by a routed `open`.

use std::fmt;

use crate::config::ConfigError;

/// A backend-native descriptor (always non-negative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NativeFd(pub u32);

impl NativeFd {
    /// The raw native value.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NativeFd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which backend a raw descriptor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorClass {
    /// Console pseudo-backend (stdin, stdout, stderr).
    Sys,
    /// General store.
    General,
    /// Secure store.
    Secure,
    /// Outside every range.
    Invalid,
}

/// A descriptor tagged with its owning backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DescriptorHandle {
    /// Console stream `0..N_SYS`.
    Console(u8),
    /// General-store native descriptor.
    General(NativeFd),
    /// Secure-store native descriptor.
    Secure(NativeFd),
}

impl DescriptorHandle {
    /// Standard input.
    pub const STDIN: Self = DescriptorHandle::Console(0);
    /// Standard output.
    pub const STDOUT: Self = DescriptorHandle::Console(1);
    /// Standard error.
    pub const STDERR: Self = DescriptorHandle::Console(2);

    /// The backend class of this handle.
    pub fn class(&self) -> DescriptorClass {
        match self {
            DescriptorHandle::Console(_) => DescriptorClass::Sys,
            DescriptorHandle::General(_) => DescriptorClass::General,
            DescriptorHandle::Secure(_) => DescriptorClass::Secure,
        }
    }
}

/// Static partition of the descriptor space.
///
/// Ranges never overlap: `general_base >= sys_fds` and
/// `secure_base >= general_base + general_max`, checked by [`DescriptorLayout::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorLayout {
    sys_fds: u8,
    general_base: i32,
    general_max: u32,
    secure_base: i32,
    secure_max: u32,
}

impl Default for DescriptorLayout {
    fn default() -> Self {
        Self {
            sys_fds: 3,
            general_base: 10,
            general_max: 8,
            secure_base: 100,
            secure_max: 8,
        }
    }
}

impl DescriptorLayout {
    /// Build a validated layout.
    pub fn new(
        sys_fds: u8,
        general_base: i32,
        general_max: u32,
        secure_base: i32,
        secure_max: u32,
    ) -> Result<Self, ConfigError> {
        if general_max == 0 || secure_max == 0 {
            return Err(ConfigError::ZeroLimit);
        }
        let general_end = i64::from(general_base) + i64::from(general_max);
        let secure_end = i64::from(secure_base) + i64::from(secure_max);
        if general_base < i32::from(sys_fds) {
            return Err(ConfigError::overlap("general", "console"));
        }
        if i64::from(secure_base) < general_end {
            return Err(ConfigError::overlap("secure", "general"));
        }
        if secure_end > i64::from(i32::MAX) {
            return Err(ConfigError::overlap("secure", "i32 range"));
        }
        Ok(Self {
            sys_fds,
            general_base,
            general_max,
            secure_base,
            secure_max,
        })
    }

    /// Number of console descriptors.
    pub fn sys_fds(&self) -> u8 {
        self.sys_fds
    }

    /// Maximum simultaneously open general-store descriptors.
    pub fn general_max(&self) -> u32 {
        self.general_max
    }

    /// Maximum simultaneously open secure-store descriptors.
    pub fn secure_max(&self) -> u32 {
        self.secure_max
    }

    /// Classify a raw descriptor by range.
    pub fn classify(&self, raw: i32) -> DescriptorClass {
        if raw >= 0 && raw < i32::from(self.sys_fds) {
            return DescriptorClass::Sys;
        }
        if Self::in_range(raw, self.general_base, self.general_max) {
            return DescriptorClass::General;
        }
        if Self::in_range(raw, self.secure_base, self.secure_max) {
            return DescriptorClass::Secure;
        }
        DescriptorClass::Invalid
    }

    /// Turn a raw descriptor into a tagged handle (`native = global - base`).
    pub fn resolve(&self, raw: i32) -> Option<DescriptorHandle> {
        match self.classify(raw) {
            DescriptorClass::Sys => Some(DescriptorHandle::Console(raw as u8)),
            DescriptorClass::General => Some(DescriptorHandle::General(NativeFd(
                (raw - self.general_base) as u32,
            ))),
            DescriptorClass::Secure => Some(DescriptorHandle::Secure(NativeFd(
                (raw - self.secure_base) as u32,
            ))),
            DescriptorClass::Invalid => None,
        }
    }

    /// True when a native descriptor fits its backend's range.
    pub fn admits(&self, handle: DescriptorHandle) -> bool {
        match handle {
            DescriptorHandle::Console(fd) => fd < self.sys_fds,
            DescriptorHandle::General(native) => native.0 < self.general_max,
            DescriptorHandle::Secure(native) => native.0 < self.secure_max,
        }
    }

    /// The raw value of a handle (`global = base + native`).
    ///
    /// Returns `None` for a native descriptor outside its range; offsetting
    /// it would alias another backend's descriptors.
    pub fn to_raw(&self, handle: DescriptorHandle) -> Option<i32> {
        if !self.admits(handle) {
            return None;
        }
        Some(match handle {
            DescriptorHandle::Console(fd) => i32::from(fd),
            DescriptorHandle::General(native) => self.general_base + native.0 as i32,
            DescriptorHandle::Secure(native) => self.secure_base + native.0 as i32,
        })
    }

    fn in_range(raw: i32, base: i32, max: u32) -> bool {
        raw >= base && i64::from(raw) < i64::from(base) + i64::from(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ranges() {
        let layout = DescriptorLayout::default();
        assert_eq!(layout.classify(0), DescriptorClass::Sys);
        assert_eq!(layout.classify(2), DescriptorClass::Sys);
        assert_eq!(layout.classify(3), DescriptorClass::Invalid);
        assert_eq!(layout.classify(10), DescriptorClass::General);
        assert_eq!(layout.classify(17), DescriptorClass::General);
        assert_eq!(layout.classify(18), DescriptorClass::Invalid);
        assert_eq!(layout.classify(100), DescriptorClass::Secure);
        assert_eq!(layout.classify(107), DescriptorClass::Secure);
        assert_eq!(layout.classify(108), DescriptorClass::Invalid);
        assert_eq!(layout.classify(-1), DescriptorClass::Invalid);
    }

    #[test]
    fn test_every_descriptor_has_exactly_one_class() {
        let layout = DescriptorLayout::default();
        for raw in -5..200 {
            let class = layout.classify(raw);
            let matches = [
                (0..3).contains(&raw),
                (10..18).contains(&raw),
                (100..108).contains(&raw),
            ];
            let hits = matches.iter().filter(|m| **m).count();
            assert!(hits <= 1, "ranges overlap at {raw}");
            if hits == 0 {
                assert_eq!(class, DescriptorClass::Invalid);
            } else {
                assert_ne!(class, DescriptorClass::Invalid);
            }
        }
    }

    #[test]
    fn test_resolve_and_to_raw_are_inverse() {
        let layout = DescriptorLayout::default();
        for raw in [0, 1, 2, 10, 13, 17, 100, 105, 107] {
            let handle = layout.resolve(raw).unwrap();
            assert_eq!(layout.to_raw(handle), Some(raw));
        }
        assert_eq!(
            layout.resolve(12),
            Some(DescriptorHandle::General(NativeFd(2)))
        );
        assert_eq!(
            layout.resolve(101),
            Some(DescriptorHandle::Secure(NativeFd(1)))
        );
        assert!(layout.resolve(50).is_none());
    }

    #[test]
    fn test_out_of_range_native_is_not_offset() {
        let layout = DescriptorLayout::default();
        assert_eq!(layout.to_raw(DescriptorHandle::General(NativeFd(8))), None);
        assert_eq!(layout.to_raw(DescriptorHandle::Secure(NativeFd(99))), None);
    }

    #[test]
    fn test_overlapping_layouts_rejected() {
        assert!(matches!(
            DescriptorLayout::new(3, 2, 8, 100, 8),
            Err(ConfigError::Overlap { .. })
        ));
        assert!(matches!(
            DescriptorLayout::new(3, 10, 8, 15, 8),
            Err(ConfigError::Overlap { .. })
        ));
        assert!(matches!(
            DescriptorLayout::new(3, 10, 0, 100, 8),
            Err(ConfigError::ZeroLimit)
        ));
        assert!(DescriptorLayout::new(3, 3, 8, 11, 4).is_ok());
    }

    #[test]
    fn test_handle_class() {
        assert_eq!(DescriptorHandle::STDOUT.class(), DescriptorClass::Sys);
        assert_eq!(
            DescriptorHandle::Secure(NativeFd(0)).class(),
            DescriptorClass::Secure
        );
    }
}
