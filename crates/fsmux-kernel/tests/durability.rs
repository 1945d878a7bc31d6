//! Power-loss behaviour of the general store's container.
//!
//! Each test writes through a dispatcher, drops power on the secure store
//! and boots a fresh dispatcher over whatever survived.

mod common;

use common::{boot, fixture, get, put};
use fsmux_kernel::{
    BufferDevice, CommitTrigger, Console, Container, ContainerError, Dispatcher,
    GeneralStoreAdapter, MemoryGeneralStore, MemorySecureStore, SecureContainer, SecureSnapshot,
    SecureStatus, SecureStoreAdapter, SharedSecureStore, shared_secure_store,
};
use fsmux_types::{Errno, FsmuxConfig, OpenFlags};

#[test]
fn test_closed_file_survives_power_loss() {
    let mut f = fixture();
    put(&mut f.fs, "boot.cfg", b"mode=fast");
    let container = f.config.general.container_name.clone();

    let mut f = f.reboot();
    assert!(f.fs.is_general_mounted());
    assert!(!f.secure.lock().is_torn(&container));
    assert_eq!(get(&mut f.fs, "boot.cfg"), b"mode=fast");
}

#[test]
fn test_open_writer_tears_the_container() {
    let mut f = fixture();
    put(&mut f.fs, "committed", b"1");
    let fd = f.fs.open("pending", OpenFlags::create(), 0).unwrap();
    f.fs.write(fd, b"lost").unwrap();
    let container = f.config.general.container_name.clone();

    let mut f = f.reboot();
    assert!(f.secure.lock().is_torn(&container));
    assert!(!f.fs.is_general_mounted());
    assert_eq!(f.fs.open("committed", OpenFlags::read(), 0), Err(Errno::EBADF));
    assert_eq!(f.fs.stat("committed"), Err(Errno::EBADF));

    // The secure store is unaffected.
    put(&mut f.fs, "SL:still-works", b"ok");
    assert_eq!(get(&mut f.fs, "SL:still-works"), b"ok");
}

#[test]
fn test_rename_and_unlink_survive_power_loss() {
    let mut f = fixture();
    put(&mut f.fs, "a", b"alpha");
    put(&mut f.fs, "b", b"beta");

    // A reader keeps nothing open for writing.
    let reader = f.fs.open("a", OpenFlags::read(), 0).unwrap();
    f.fs.rename("a", "renamed").unwrap();
    f.fs.unlink("b").unwrap();
    f.fs.close(reader).unwrap();

    let mut f = f.reboot();
    assert!(f.fs.is_general_mounted());
    assert_eq!(get(&mut f.fs, "renamed"), b"alpha");
    assert_eq!(f.fs.stat("a"), Err(Errno::ENOENT));
    assert_eq!(f.fs.stat("b"), Err(Errno::ENOENT));
}

#[test]
fn test_snapshot_round_trip() {
    let mut f = fixture();
    put(&mut f.fs, "keep", b"persisted");
    put(&mut f.fs, "SL:cert", b"pem");

    let bytes = f.secure.lock().snapshot().to_bytes().unwrap();
    let snapshot = SecureSnapshot::from_bytes(&bytes).unwrap();
    assert_eq!(snapshot.len(), 2);

    let secure = shared_secure_store(MemorySecureStore::from_snapshot(snapshot, 8));
    let mut f = boot(FsmuxConfig::default(), secure);
    assert_eq!(get(&mut f.fs, "keep"), b"persisted");
    assert_eq!(get(&mut f.fs, "SL:cert"), b"pem");
}

#[test]
fn test_snapshot_marks_open_writers_torn() {
    let mut f = fixture();
    let fd = f.fs.open("open", OpenFlags::create(), 0).unwrap();
    f.fs.write(fd, b"x").unwrap();

    let snapshot = f.secure.lock().snapshot();
    let secure = shared_secure_store(MemorySecureStore::from_snapshot(snapshot, 8));
    let f = boot(FsmuxConfig::default(), secure);
    assert!(!f.fs.is_general_mounted());
}

/// A container whose close always fails.
struct FlakyContainer {
    inner: SecureContainer<SharedSecureStore>,
}

impl Container for FlakyContainer {
    fn load(&mut self) -> Result<Option<Vec<u8>>, ContainerError> {
        self.inner.load()
    }

    fn store(&mut self, image: &[u8]) -> Result<(), ContainerError> {
        self.inner.store(image)
    }

    fn close(&mut self) -> Result<(), ContainerError> {
        Err(ContainerError::secure(
            self.inner.name(),
            SecureStatus::INVALID_HANDLE,
        ))
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}

fn flaky_dispatcher(secure: SharedSecureStore) -> Dispatcher {
    let config = FsmuxConfig::default();
    let container = FlakyContainer {
        inner: SecureContainer::new(
            secure.clone(),
            config.general.container_name.clone(),
            config.general.container_size,
        ),
    };
    let mut general = MemoryGeneralStore::new(container, config.general.max_open_files);
    general.mount().unwrap();
    Dispatcher::new(
        config.descriptor_layout().unwrap(),
        Console::new(Box::new(BufferDevice::new())),
        GeneralStoreAdapter::new(Box::new(general)),
        SecureStoreAdapter::new(Box::new(secure), config.secure.create_size),
    )
}

#[test]
fn test_commit_failure_is_not_surfaced() {
    common::init_tracing();
    let secure = shared_secure_store(MemorySecureStore::new(8));
    let mut fs = flaky_dispatcher(secure.clone());

    let fd = fs.open("data", OpenFlags::create(), 0).unwrap();
    fs.write(fd, b"payload").unwrap();
    assert_eq!(fs.close(fd), Ok(()));

    let stats = fs.commit_stats();
    assert_eq!(stats.attempted, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.succeeded(), 0);
    let failure = stats.last_failure.unwrap();
    assert_eq!(failure.trigger, CommitTrigger::CloseAfterWrite);
    assert_eq!(failure.errno, Errno::ENXIO);

    // The container was never closed, so power loss tears it.
    secure.lock().power_cycle();
    assert!(secure.lock().is_torn("fsmux.img"));
}

#[test]
fn test_commit_failure_on_unlink_still_succeeds() {
    common::init_tracing();
    let secure = shared_secure_store(MemorySecureStore::new(8));
    let mut fs = flaky_dispatcher(secure);
    put(&mut fs, "victim", b"x");

    assert_eq!(fs.unlink("victim"), Ok(()));
    assert_eq!(fs.commit_stats().failed, 2);
    assert_eq!(
        fs.commit_stats().last_failure.map(|f| f.trigger),
        Some(CommitTrigger::Unlink)
    );
}
