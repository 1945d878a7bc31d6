//! File attributes.
//!
//! A reduced `struct stat`: only the fields any backend can fill.

use serde::{Deserialize, Serialize};

/// File type mask.
pub const S_IFMT: u32 = 0o170000;
/// Directory.
pub const S_IFDIR: u32 = 0o040000;
/// Character device.
pub const S_IFCHR: u32 = 0o020000;
/// Regular file.
pub const S_IFREG: u32 = 0o100000;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Character device (console streams).
    CharDevice,
}

impl FileType {
    /// The `S_IF*` bits for this type.
    pub fn mode_bits(self) -> u32 {
        match self {
            FileType::File => S_IFREG,
            FileType::Directory => S_IFDIR,
            FileType::CharDevice => S_IFCHR,
        }
    }

    /// Decode the type from a full mode word.
    pub fn from_mode(mode: u32) -> Option<Self> {
        match mode & S_IFMT {
            S_IFREG => Some(FileType::File),
            S_IFDIR => Some(FileType::Directory),
            S_IFCHR => Some(FileType::CharDevice),
            _ => None,
        }
    }
}

/// File attributes (metadata).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    /// Inode / object id.
    pub ino: u64,
    /// Type and permission bits.
    pub mode: u32,
    /// Number of hard links.
    pub nlink: u32,
    /// Size in bytes.
    pub size: u64,
}

impl FileStat {
    /// Attributes for a regular file.
    pub fn file(ino: u64, size: u64) -> Self {
        Self {
            ino,
            mode: S_IFREG | 0o666,
            nlink: 1,
            size,
        }
    }

    /// The synthetic root directory of the flat namespace.
    pub fn root() -> Self {
        Self {
            ino: 0,
            mode: S_IFDIR | 0o777,
            nlink: 1,
            size: 0,
        }
    }

    /// A console stream, keyed by its descriptor number.
    pub fn char_device(fd: u8) -> Self {
        Self {
            ino: u64::from(fd),
            mode: S_IFCHR | 0o666,
            nlink: 0,
            size: 0,
        }
    }

    /// Decoded file type.
    pub fn kind(&self) -> Option<FileType> {
        FileType::from_mode(self.mode)
    }

    /// Permission bits only.
    pub fn perm(&self) -> u32 {
        self.mode & !S_IFMT
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind() == Some(FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind() == Some(FileType::Directory)
    }

    /// Returns true if this is a character device.
    pub fn is_char_device(&self) -> bool {
        self.kind() == Some(FileType::CharDevice)
    }
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (the flat namespace has no parent component).
    pub name: String,
    /// Object id.
    pub ino: u64,
    /// Size in bytes.
    pub size: u64,
    /// Entry type.
    pub kind: FileType,
}

impl DirEntry {
    /// Create a file entry.
    pub fn file(name: impl Into<String>, ino: u64, size: u64) -> Self {
        Self {
            name: name.into(),
            ino,
            size,
            kind: FileType::File,
        }
    }
}
