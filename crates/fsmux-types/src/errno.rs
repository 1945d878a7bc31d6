//! The caller-visible error domain.

use strum::{AsRefStr, EnumIter, IntoStaticStr};
use thiserror::Error;

/// POSIX errno values surfaced by the dispatcher.
///
/// Numeric values follow Linux so that host tooling and on-device callers
/// agree on the encoding of negative returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, AsRefStr, EnumIter, IntoStaticStr)]
#[repr(i32)]
#[allow(clippy::upper_case_acronyms)]
pub enum Errno {
    /// No such file or directory.
    #[error("no such file or directory")]
    ENOENT = 2,

    /// Generic I/O failure (unrecognised backend status).
    #[error("no such device or address")]
    ENXIO = 6,

    /// Descriptor outside every known range, or not open.
    #[error("bad file descriptor")]
    EBADF = 9,

    /// Permission denied.
    #[error("permission denied")]
    EACCES = 13,

    /// File exists.
    #[error("file exists")]
    EEXIST = 17,

    /// Not a directory.
    #[error("not a directory")]
    ENOTDIR = 20,

    /// Invalid argument.
    #[error("invalid argument")]
    EINVAL = 22,

    /// No space left on device.
    #[error("no space left on device")]
    ENOSPC = 28,

    /// Illegal seek.
    #[error("illegal seek")]
    ESPIPE = 29,

    /// Operation not supported.
    #[error("operation not supported")]
    ENOTSUP = 95,
}

impl Errno {
    /// Positive numeric errno value.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// The negative return value used at the POSIX boundary.
    pub fn as_return(self) -> i32 {
        -self.code()
    }

    /// Look up an errno by its positive numeric value.
    pub fn from_code(code: i32) -> Option<Self> {
        use strum::IntoEnumIterator;
        Self::iter().find(|e| e.code() == code)
    }

    /// The symbolic name, e.g. `"ENOENT"`.
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Result type used by every typed fsmux operation.
pub type FsResult<T> = Result<T, Errno>;
