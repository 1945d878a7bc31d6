//! Shared types for fsmux.
//!
//! This crate is the leaf of the workspace: the errno domain, the portable
//! open-flag encoding, file attributes, the global descriptor namespace and
//! the runtime configuration. It has **no internal fsmux dependencies**.
//!
//! # Descriptor Namespace
//!
//! ```text
//! 0 ─── N_SYS          console (stdin, stdout, stderr)
//! BASE_GEN ─── +MAX_GEN general store (log-structured fs inside a container)
//! BASE_SEC ─── +MAX_SEC secure store (vendor-managed flat storage)
//! ```
//!
//! # Key Types
//!
//! |----------------------|---------------------------------------------|
//! | Type                 | Purpose                                     |
//! |----------------------|---------------------------------------------|
//! | [`Errno`]            | The single POSIX error domain callers see   |
//! | [`OpenFlags`]        | Portable open flags (newlib `O_*` bits)     |
//! | [`FileStat`]         | `struct stat` subset reported by backends   |
//! | [`DescriptorLayout`] | Range partition of the descriptor space     |
//! | [`DescriptorHandle`] | Tagged descriptor carried after `open`      |
//! | [`FsmuxConfig`]      | RON-loadable runtime configuration          |
//! |----------------------|---------------------------------------------|

pub mod attr;
pub mod config;
pub mod descriptor;
pub mod errno;
pub mod flags;

pub use attr::{DirEntry, FileStat, FileType};
pub use config::{ConfigError, FsmuxConfig, GeneralConfig, LayoutConfig, SecureConfig};
pub use descriptor::{DescriptorClass, DescriptorHandle, DescriptorLayout, NativeFd};
pub use errno::{Errno, FsResult};
pub use flags::{OpenFlags, Whence};

/// Literal path prefix addressing the secure store (case-sensitive, no separator).
pub const SECURE_PREFIX: &str = "SL:";
