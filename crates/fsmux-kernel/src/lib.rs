//! # fsmux-kernel
//!
//! Descriptor dispatcher for fsmux.
//!
//! One POSIX descriptor namespace is routed across three backends:
//! - the console (descriptors `0..N_SYS`)
//! - the general store, a flat log-structured filesystem whose image lives
//!   inside one object of the secure store
//! - the secure store, addressed by paths starting with `SL:`
//!
//! Backend failures are translated to errno, and the general store's
//! container is committed after every change that must survive power loss.

pub mod adapter;
pub mod backends;
pub mod commit;
pub mod console;
pub mod dispatch;
pub mod native;
pub mod posix;
pub mod route;
pub mod table;
pub mod translate;

pub use adapter::{DirHandle, GeneralStoreAdapter, SecureStoreAdapter};
pub use backends::{
    MemoryGeneralStore, MemorySecureStore, SecureContainer, SecureSnapshot, SharedSecureStore,
    memory_dispatcher, shared_secure_store,
};
pub use commit::{CommitFailure, CommitStats, CommitTrigger};
pub use console::{BufferDevice, CharDevice, Console, StderrDevice, WriterDevice};
pub use dispatch::Dispatcher;
pub use native::{
    Container, ContainerError, GeneralMode, GeneralStatus, GeneralStore, SecureAccess,
    SecureStatus, SecureStore,
};
pub use posix::PosixShim;
pub use route::{Route, classify_path, strip_relative};
