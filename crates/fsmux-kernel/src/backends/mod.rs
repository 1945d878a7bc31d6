//! In-memory backends.
//!
//! Stand-ins for the device's storage engines, used by tests and by the
//! host tool. They model the behaviour the dispatcher relies on (handle
//! limits, status reporting, torn objects) and nothing of the on-flash
//! layout.

mod container;
mod memory_general;
mod memory_secure;

pub use container::SecureContainer;
pub use memory_general::{MAX_NAME_LEN, MemoryGeneralStore};
pub use memory_secure::{
    MemorySecureStore, SecureSnapshot, SharedSecureStore, shared_secure_store,
};

use fsmux_types::{ConfigError, FsmuxConfig};
use tracing::warn;

use crate::adapter::{GeneralStoreAdapter, SecureStoreAdapter};
use crate::console::{CharDevice, Console};
use crate::dispatch::Dispatcher;
use crate::native::GeneralStore;

/// Build a dispatcher over in-memory backends.
///
/// The general store's container lives in `secure` under the configured
/// name. A container that fails to mount leaves the general store
/// unmounted; its operations then fail with `EBADF`.
pub fn memory_dispatcher(
    config: &FsmuxConfig,
    secure: SharedSecureStore,
    device: Box<dyn CharDevice>,
) -> Result<Dispatcher, ConfigError> {
    config.validate()?;
    let layout = config.descriptor_layout()?;

    let container = SecureContainer::new(
        secure.clone(),
        config.general.container_name.clone(),
        config.general.container_size,
    );
    let mut general = MemoryGeneralStore::new(container, config.general.max_open_files);
    if let Err(status) = general.mount() {
        warn!(
            %status,
            cause = %general.last_status(),
            container = %config.general.container_name,
            "general store left unmounted"
        );
    }

    Ok(Dispatcher::new(
        layout,
        Console::new(device),
        GeneralStoreAdapter::new(Box::new(general)),
        SecureStoreAdapter::new(Box::new(secure), config.secure.create_size),
    ))
}
