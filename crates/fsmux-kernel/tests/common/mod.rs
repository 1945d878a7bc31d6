//! Shared fixtures for the dispatcher integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use fsmux_kernel::native::{GeneralDir, GeneralObject};
use fsmux_kernel::{
    BufferDevice, Console, Dispatcher, GeneralMode, GeneralStatus, GeneralStore,
    GeneralStoreAdapter, MemorySecureStore, SecureStoreAdapter, SharedSecureStore,
    memory_dispatcher, shared_secure_store,
};
use fsmux_types::{FsmuxConfig, NativeFd, OpenFlags, Whence};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

/// A dispatcher over in-memory backends, with handles on its collaborators.
pub struct Fixture {
    pub fs: Dispatcher,
    pub secure: SharedSecureStore,
    pub console: BufferDevice,
    pub config: FsmuxConfig,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn fixture() -> Fixture {
    fixture_with(FsmuxConfig::default())
}

pub fn fixture_with(config: FsmuxConfig) -> Fixture {
    let secure = shared_secure_store(MemorySecureStore::new(config.secure.max_open_files));
    boot(config, secure)
}

/// Build a fresh dispatcher over an existing secure store, as after a reboot.
pub fn boot(config: FsmuxConfig, secure: SharedSecureStore) -> Fixture {
    init_tracing();
    let console = BufferDevice::new();
    let fs = memory_dispatcher(&config, secure.clone(), Box::new(console.clone()))
        .expect("default config is valid");
    Fixture {
        fs,
        secure,
        console,
        config,
    }
}

impl Fixture {
    /// Simulate power loss and boot again over the surviving secure store.
    pub fn reboot(self) -> Fixture {
        self.secure.lock().power_cycle();
        boot(self.config, self.secure)
    }
}

/// Create or replace `path` with `data`.
pub fn put(fs: &mut Dispatcher, path: &str, data: &[u8]) {
    let fd = fs.open(path, OpenFlags::create_truncate(), 0o666).unwrap();
    assert_eq!(fs.write(fd, data).unwrap(), data.len());
    fs.close(fd).unwrap();
}

/// Read the whole of `path`.
pub fn get(fs: &mut Dispatcher, path: &str) -> Vec<u8> {
    let fd = fs.open(path, OpenFlags::read(), 0).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 7];
    loop {
        match fs.read(fd, &mut buf).unwrap() {
            0 => break,
            n => out.extend_from_slice(&buf[..n]),
        }
    }
    fs.close(fd).unwrap();
    out
}

/// Config with small descriptor limits.
pub fn small_limits(general: u32, secure: u32) -> FsmuxConfig {
    let mut config = FsmuxConfig::default();
    config.general.max_open_files = general;
    config.secure.max_open_files = secure;
    config
}

/// Knobs and observations shared with a [`ScriptedGeneralStore`].
#[derive(Debug, Default)]
pub struct ScriptedState {
    /// Native descriptor handed out by the next `open`.
    pub next_fd: u32,
    /// Make every `close` fail.
    pub fail_close: bool,
    /// Descriptors passed to `close`, in order.
    pub closed: Vec<NativeFd>,
    pub container_closes: usize,
}

pub type SharedScriptedState = Arc<Mutex<ScriptedState>>;

/// General store whose descriptor numbering and close outcome are set by
/// the test. Everything else succeeds trivially.
pub struct ScriptedGeneralStore {
    state: SharedScriptedState,
    last: GeneralStatus,
}

impl ScriptedGeneralStore {
    pub fn new(state: SharedScriptedState) -> Self {
        Self {
            state,
            last: GeneralStatus::OK,
        }
    }

    fn object(name: &str) -> GeneralObject {
        GeneralObject {
            id: 1,
            name: name.to_string(),
            size: 0,
        }
    }
}

impl GeneralStore for ScriptedGeneralStore {
    fn is_mounted(&self) -> bool {
        true
    }

    fn open(&mut self, _name: &str, _mode: GeneralMode) -> Result<NativeFd, GeneralStatus> {
        let mut state = self.state.lock();
        let fd = NativeFd(state.next_fd);
        state.next_fd += 1;
        Ok(fd)
    }

    fn close(&mut self, fd: NativeFd) -> Result<(), GeneralStatus> {
        let mut state = self.state.lock();
        state.closed.push(fd);
        if state.fail_close {
            self.last = GeneralStatus::FILE_CLOSED;
            return Err(GeneralStatus::GENERIC);
        }
        Ok(())
    }

    fn read(&mut self, _fd: NativeFd, _buf: &mut [u8]) -> Result<usize, GeneralStatus> {
        Ok(0)
    }

    fn write(&mut self, _fd: NativeFd, data: &[u8]) -> Result<usize, GeneralStatus> {
        Ok(data.len())
    }

    fn seek(
        &mut self,
        _fd: NativeFd,
        _offset: i64,
        _whence: Whence,
    ) -> Result<u64, GeneralStatus> {
        Ok(0)
    }

    fn fstat(&mut self, _fd: NativeFd) -> Result<GeneralObject, GeneralStatus> {
        Ok(Self::object(""))
    }

    fn stat(&mut self, name: &str) -> Result<GeneralObject, GeneralStatus> {
        Ok(Self::object(name))
    }

    fn rename(&mut self, _from: &str, _to: &str) -> Result<(), GeneralStatus> {
        Ok(())
    }

    fn remove(&mut self, _name: &str) -> Result<(), GeneralStatus> {
        Ok(())
    }

    fn opendir(&mut self, _name: &str) -> Result<GeneralDir, GeneralStatus> {
        Ok(GeneralDir {
            epoch: 0,
            cursor: 0,
        })
    }

    fn readdir(
        &mut self,
        _dir: &mut GeneralDir,
    ) -> Result<Option<GeneralObject>, GeneralStatus> {
        Ok(None)
    }

    fn closedir(&mut self, _dir: GeneralDir) -> Result<(), GeneralStatus> {
        Ok(())
    }

    fn close_container(&mut self) -> Result<(), GeneralStatus> {
        self.state.lock().container_closes += 1;
        Ok(())
    }

    fn last_status(&self) -> GeneralStatus {
        self.last
    }
}

/// A dispatcher over a [`ScriptedGeneralStore`] and an in-memory secure
/// store, with the default layout.
pub fn scripted_dispatcher() -> (Dispatcher, SharedScriptedState) {
    init_tracing();
    let config = FsmuxConfig::default();
    let state = SharedScriptedState::default();
    let general = ScriptedGeneralStore::new(state.clone());
    let secure = shared_secure_store(MemorySecureStore::new(config.secure.max_open_files));
    let fs = Dispatcher::new(
        config.descriptor_layout().expect("default config is valid"),
        Console::new(Box::new(BufferDevice::new())),
        GeneralStoreAdapter::new(Box::new(general)),
        SecureStoreAdapter::new(Box::new(secure), config.secure.create_size),
    );
    (fs, state)
}
