//! Backend-native status domains.
//!
//! Each backend reports failures in its own integer code space. Codes are
//! kept as open newtypes rather than enums: a backend may return any value,
//! and the translator must map the ones it does not know to a generic error.

use std::fmt;

/// General-store status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeneralStatus(pub i32);

impl GeneralStatus {
    pub const OK: Self = Self(0);
    /// Returned by calls that leave the cause in the last-error slot.
    pub const GENERIC: Self = Self(-1);
    pub const NOT_MOUNTED: Self = Self(-10000);
    pub const FULL: Self = Self(-10001);
    pub const NOT_FOUND: Self = Self(-10002);
    pub const END_OF_OBJECT: Self = Self(-10003);
    pub const FILE_CLOSED: Self = Self(-10008);
    pub const BAD_DESCRIPTOR: Self = Self(-10010);
    pub const NOT_WRITABLE: Self = Self(-10021);
    pub const NOT_READABLE: Self = Self(-10022);
    pub const NOT_A_FS: Self = Self(-10025);
    pub const FILE_EXISTS: Self = Self(-10030);
    pub const NAME_TOO_LONG: Self = Self(-10036);
    /// The container object backing the image could not be accessed.
    pub const CONTAINER_IO: Self = Self(-10090);
}

impl fmt::Display for GeneralStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::OK => "OK",
            Self::GENERIC => "GENERIC",
            Self::NOT_MOUNTED => "NOT_MOUNTED",
            Self::FULL => "FULL",
            Self::NOT_FOUND => "NOT_FOUND",
            Self::END_OF_OBJECT => "END_OF_OBJECT",
            Self::FILE_CLOSED => "FILE_CLOSED",
            Self::BAD_DESCRIPTOR => "BAD_DESCRIPTOR",
            Self::NOT_WRITABLE => "NOT_WRITABLE",
            Self::NOT_READABLE => "NOT_READABLE",
            Self::NOT_A_FS => "NOT_A_FS",
            Self::FILE_EXISTS => "FILE_EXISTS",
            Self::NAME_TOO_LONG => "NAME_TOO_LONG",
            Self::CONTAINER_IO => "CONTAINER_IO",
            _ => return write!(f, "general status {}", self.0),
        };
        write!(f, "{name} ({})", self.0)
    }
}

/// Secure-store status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SecureStatus(pub i32);

impl SecureStatus {
    pub const OK: Self = Self(0);
    /// Returned by calls that leave the cause in the last-error slot.
    pub const GENERIC: Self = Self(-1);
    pub const NO_SPACE: Self = Self(-10);
    pub const FILE_NOT_EXISTS: Self = Self(-11);
    pub const ACCESS_DENIED: Self = Self(-12);
    /// The object was open for writing when power was lost.
    pub const NOT_CLOSED_CORRECTLY: Self = Self(-14);
    pub const INVALID_HANDLE: Self = Self(-15);
    pub const MAX_SIZE_EXCEEDED: Self = Self(-16);
    pub const FILE_EXISTS: Self = Self(-17);
    pub const INVALID_ARGS: Self = Self(-18);
}

impl fmt::Display for SecureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::OK => "OK",
            Self::GENERIC => "GENERIC",
            Self::NO_SPACE => "NO_SPACE",
            Self::FILE_NOT_EXISTS => "FILE_NOT_EXISTS",
            Self::ACCESS_DENIED => "ACCESS_DENIED",
            Self::NOT_CLOSED_CORRECTLY => "NOT_CLOSED_CORRECTLY",
            Self::INVALID_HANDLE => "INVALID_HANDLE",
            Self::MAX_SIZE_EXCEEDED => "MAX_SIZE_EXCEEDED",
            Self::FILE_EXISTS => "FILE_EXISTS",
            Self::INVALID_ARGS => "INVALID_ARGS",
            _ => return write!(f, "secure status {}", self.0),
        };
        write!(f, "{name} ({})", self.0)
    }
}
