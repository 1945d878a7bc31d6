//! Native backend interfaces.
//!
//! These traits describe the two storage engines exactly as the dispatcher
//! consumes them: native descriptors, native flag sets and native status
//! codes. Nothing here speaks errno; the adapters in [`crate::adapter`] own
//! that translation.

mod status;

pub use status::{GeneralStatus, SecureStatus};

use bitflags::bitflags;
use fsmux_types::{NativeFd, Whence};
use thiserror::Error;

bitflags! {
    /// General-store open mode. Read and write are independent bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GeneralMode: u8 {
        const RDONLY = 1 << 0;
        const WRONLY = 1 << 1;
        const RDWR = Self::RDONLY.bits() | Self::WRONLY.bits();
        const CREAT = 1 << 2;
        const TRUNC = 1 << 3;
        const APPEND = 1 << 4;
        const EXCL = 1 << 5;
    }
}

/// Metadata of one general-store object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralObject {
    /// Stable object id.
    pub id: u32,
    pub name: String,
    pub size: u32,
}

/// Directory cursor over the general store's flat namespace.
///
/// Tagged with the mount epoch it was opened under; a cursor from an older
/// mount is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralDir {
    pub epoch: u32,
    pub cursor: usize,
}

/// Secure-store open access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecureAccess {
    Read,
    Write,
    /// Create if missing (reserving `max_size` bytes), then open for write.
    Create { max_size: u32 },
}

impl SecureAccess {
    pub fn is_write(self) -> bool {
        !matches!(self, SecureAccess::Read)
    }
}

/// Metadata of one secure-store object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecureInfo {
    /// Object token, stable for the object's lifetime.
    pub token: u32,
    /// Bytes written so far.
    pub size: u32,
    /// Size reserved at creation.
    pub max_size: u32,
}

/// The log-structured general store.
pub trait GeneralStore {
    /// False until the filesystem image has been mounted.
    fn is_mounted(&self) -> bool;

    // ========================================================================
    // Descriptors
    // ========================================================================

    fn open(&mut self, name: &str, mode: GeneralMode) -> Result<NativeFd, GeneralStatus>;

    fn close(&mut self, fd: NativeFd) -> Result<(), GeneralStatus>;

    /// Read at the descriptor position. Returns 0 at end of object.
    fn read(&mut self, fd: NativeFd, buf: &mut [u8]) -> Result<usize, GeneralStatus>;

    fn write(&mut self, fd: NativeFd, data: &[u8]) -> Result<usize, GeneralStatus>;

    /// Reposition; returns the new absolute offset.
    fn seek(&mut self, fd: NativeFd, offset: i64, whence: Whence) -> Result<u64, GeneralStatus>;

    fn fstat(&mut self, fd: NativeFd) -> Result<GeneralObject, GeneralStatus>;

    // ========================================================================
    // Namespace
    // ========================================================================

    fn stat(&mut self, name: &str) -> Result<GeneralObject, GeneralStatus>;

    fn rename(&mut self, from: &str, to: &str) -> Result<(), GeneralStatus>;

    fn remove(&mut self, name: &str) -> Result<(), GeneralStatus>;

    fn opendir(&mut self, name: &str) -> Result<GeneralDir, GeneralStatus>;

    /// Next entry, or `None` once the listing is exhausted.
    fn readdir(&mut self, dir: &mut GeneralDir) -> Result<Option<GeneralObject>, GeneralStatus>;

    fn closedir(&mut self, dir: GeneralDir) -> Result<(), GeneralStatus>;

    // ========================================================================
    // Container
    // ========================================================================

    /// Close the container object hosting the image, making every write
    /// issued so far durable. The next mutation reopens it.
    fn close_container(&mut self) -> Result<(), GeneralStatus>;

    /// Status recorded by the most recent failing call.
    fn last_status(&self) -> GeneralStatus;
}

/// The vendor-managed secure store.
pub trait SecureStore {
    fn open(&mut self, name: &str, access: SecureAccess) -> Result<NativeFd, SecureStatus>;

    fn close(&mut self, fd: NativeFd) -> Result<(), SecureStatus>;

    /// Read at the descriptor position. Returns 0 at end of object.
    fn read(&mut self, fd: NativeFd, buf: &mut [u8]) -> Result<usize, SecureStatus>;

    fn write(&mut self, fd: NativeFd, data: &[u8]) -> Result<usize, SecureStatus>;

    fn seek(&mut self, fd: NativeFd, offset: i64, whence: Whence) -> Result<u64, SecureStatus>;

    fn info(&mut self, name: &str) -> Result<SecureInfo, SecureStatus>;

    fn rename(&mut self, from: &str, to: &str) -> Result<(), SecureStatus>;

    fn delete(&mut self, name: &str) -> Result<(), SecureStatus>;

    /// Status recorded by the most recent failing call.
    fn last_status(&self) -> SecureStatus;
}

/// Storage for a general-store image.
pub trait Container {
    /// The stored image, or `None` if the container has never been written.
    fn load(&mut self) -> Result<Option<Vec<u8>>, ContainerError>;

    /// Replace the stored image. May leave the container open for writing.
    fn store(&mut self, image: &[u8]) -> Result<(), ContainerError>;

    /// Close the container if it is open. A no-op otherwise.
    fn close(&mut self) -> Result<(), ContainerError>;

    fn is_open(&self) -> bool;
}

/// Container access failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContainerError {
    #[error("container {name}: secure store returned {status}")]
    Secure { name: String, status: SecureStatus },

    #[error("image of {size} bytes exceeds container capacity {capacity}")]
    TooLarge { size: usize, capacity: u32 },
}

impl ContainerError {
    pub fn secure(name: impl Into<String>, status: SecureStatus) -> Self {
        Self::Secure {
            name: name.into(),
            status,
        }
    }
}
