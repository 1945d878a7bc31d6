//! Backend status to errno translation.
//!
//! Both backends may report a failure with the generic sentinel and leave
//! the real cause in their last-error slot. [`resolve`] picks the effective
//! status before mapping it.

use fsmux_types::{Errno, FsResult};

use crate::native::{GeneralStatus, SecureStatus};

/// A backend-native status domain.
pub trait NativeStatus: Copy + Eq + std::fmt::Debug {
    /// The "generic failure, see last error" sentinel.
    const GENERIC: Self;

    /// `Ok` for the success code, the mapped errno otherwise.
    fn translate(self) -> FsResult<()>;
}

impl NativeStatus for GeneralStatus {
    const GENERIC: Self = GeneralStatus::GENERIC;

    fn translate(self) -> FsResult<()> {
        match self {
            GeneralStatus::OK => Ok(()),
            GeneralStatus::FULL => Err(Errno::ENOSPC),
            GeneralStatus::NOT_FOUND => Err(Errno::ENOENT),
            GeneralStatus::NOT_WRITABLE | GeneralStatus::NOT_READABLE => Err(Errno::EACCES),
            _ => Err(Errno::ENXIO),
        }
    }
}

impl NativeStatus for SecureStatus {
    const GENERIC: Self = SecureStatus::GENERIC;

    fn translate(self) -> FsResult<()> {
        match self {
            SecureStatus::OK => Ok(()),
            SecureStatus::NO_SPACE | SecureStatus::MAX_SIZE_EXCEEDED => Err(Errno::ENOSPC),
            SecureStatus::FILE_NOT_EXISTS => Err(Errno::ENOENT),
            SecureStatus::ACCESS_DENIED => Err(Errno::EACCES),
            _ => Err(Errno::ENXIO),
        }
    }
}

/// Map a general-store status to errno.
pub fn general_errno(status: GeneralStatus) -> FsResult<()> {
    status.translate()
}

/// Map a secure-store status to errno.
pub fn secure_errno(status: SecureStatus) -> FsResult<()> {
    status.translate()
}

/// The status that actually describes a failure.
pub fn effective<S: NativeStatus>(returned: S, last: S) -> S {
    if returned == S::GENERIC { last } else { returned }
}

/// Errno for a failed call.
///
/// A failure whose effective status is the success code still fails, with
/// the generic errno.
pub fn resolve<S: NativeStatus>(returned: S, last: S) -> Errno {
    match effective(returned, last).translate() {
        Err(errno) => errno,
        Ok(()) => Errno::ENXIO,
    }
}
