//! Backend adapters.
//!
//! Each adapter converts portable flags to the backend's native form, calls
//! the native interface and translates failures to errno.

mod general;
mod secure;

pub use general::{DirHandle, GeneralStoreAdapter};
pub use secure::SecureStoreAdapter;
