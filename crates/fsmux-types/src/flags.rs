//! Portable open-flag and seek encodings.
//!
//! Callers speak the newlib `O_*` encoding; each backend adapter translates
//! [`OpenFlags`] into its own native flag set.

use crate::errno::{Errno, FsResult};

/// Open for reading only.
pub const O_RDONLY: i32 = 0x0000;
/// Open for writing only.
pub const O_WRONLY: i32 = 0x0001;
/// Open for reading and writing.
pub const O_RDWR: i32 = 0x0002;
/// Access-mode mask.
pub const O_ACCMODE: i32 = 0x0003;
/// Append on each write.
pub const O_APPEND: i32 = 0x0008;
/// Create if missing.
pub const O_CREAT: i32 = 0x0200;
/// Truncate to zero length.
pub const O_TRUNC: i32 = 0x0400;
/// Fail if the file exists (with `O_CREAT`).
pub const O_EXCL: i32 = 0x0800;

/// Seek relative to the start of the file.
pub const SEEK_SET: i32 = 0;
/// Seek relative to the current position.
pub const SEEK_CUR: i32 = 1;
/// Seek relative to the end of the file.
pub const SEEK_END: i32 = 2;

/// Open file flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    /// Read access requested.
    pub read: bool,
    /// Write access requested.
    pub write: bool,
    /// Append mode.
    pub append: bool,
    /// Create if not exists.
    pub create: bool,
    /// Truncate on open.
    pub truncate: bool,
    /// Exclusive create (fail if exists).
    pub exclusive: bool,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self {
            read: true,
            write: false,
            append: false,
            create: false,
            truncate: false,
            exclusive: false,
        }
    }
}

impl OpenFlags {
    /// Read-only access.
    pub fn read() -> Self {
        Self::default()
    }

    /// Write-only access.
    pub fn write_only() -> Self {
        Self {
            read: false,
            write: true,
            ..Default::default()
        }
    }

    /// Read and write access.
    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            ..Default::default()
        }
    }

    /// Create with write-only access (`O_CREAT | O_WRONLY`).
    pub fn create() -> Self {
        Self {
            create: true,
            ..Self::write_only()
        }
    }

    /// Create and truncate (`O_CREAT | O_WRONLY | O_TRUNC`).
    pub fn create_truncate() -> Self {
        Self {
            truncate: true,
            ..Self::create()
        }
    }

    /// Create exclusively (fail if exists).
    pub fn create_exclusive() -> Self {
        Self {
            exclusive: true,
            ..Self::create()
        }
    }

    /// Append to an existing or new file.
    pub fn append() -> Self {
        Self {
            append: true,
            ..Self::create()
        }
    }

    /// Decode the portable `O_*` encoding.
    ///
    /// An access mode of `3` is not a valid POSIX mode and yields `EINVAL`.
    /// Unknown high bits are ignored.
    pub fn from_bits(bits: i32) -> FsResult<Self> {
        let (read, write) = match bits & O_ACCMODE {
            O_RDONLY => (true, false),
            O_WRONLY => (false, true),
            O_RDWR => (true, true),
            _ => return Err(Errno::EINVAL),
        };
        Ok(Self {
            read,
            write,
            append: bits & O_APPEND != 0,
            create: bits & O_CREAT != 0,
            truncate: bits & O_TRUNC != 0,
            exclusive: bits & O_EXCL != 0,
        })
    }

    /// Encode back into `O_*` bits.
    pub fn bits(&self) -> i32 {
        let mut bits = match (self.read, self.write) {
            (_, false) => O_RDONLY,
            (false, true) => O_WRONLY,
            (true, true) => O_RDWR,
        };
        if self.append {
            bits |= O_APPEND;
        }
        if self.create {
            bits |= O_CREAT;
        }
        if self.truncate {
            bits |= O_TRUNC;
        }
        if self.exclusive {
            bits |= O_EXCL;
        }
        bits
    }

    /// True when write access was requested.
    pub fn is_writable(&self) -> bool {
        self.write
    }
}

/// Seek origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// From the start of the file.
    Set,
    /// From the current position.
    Current,
    /// From the end of the file.
    End,
}

impl Whence {
    /// Decode a `SEEK_*` value.
    pub fn from_raw(raw: i32) -> FsResult<Self> {
        match raw {
            SEEK_SET => Ok(Whence::Set),
            SEEK_CUR => Ok(Whence::Current),
            SEEK_END => Ok(Whence::End),
            _ => Err(Errno::EINVAL),
        }
    }

    /// Encode as a `SEEK_*` value.
    pub fn as_raw(self) -> i32 {
        match self {
            Whence::Set => SEEK_SET,
            Whence::Current => SEEK_CUR,
            Whence::End => SEEK_END,
        }
    }
}
