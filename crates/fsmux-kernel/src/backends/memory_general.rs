//! In-memory general store.
//!
//! A flat object namespace whose image is serialized with postcard into a
//! [`Container`] after every mutation. Like the log-structured store it
//! models, a failing call returns the generic sentinel and leaves the cause
//! in [`GeneralStore::last_status`].

use std::collections::BTreeMap;

use fsmux_types::{NativeFd, Whence};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::native::{
    Container, ContainerError, GeneralDir, GeneralMode, GeneralObject, GeneralStatus,
    GeneralStore, SecureStatus,
};

/// Longest accepted object name, in bytes.
pub const MAX_NAME_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Image {
    next_id: u32,
    objects: BTreeMap<String, ImageObject>,
}

impl Default for Image {
    fn default() -> Self {
        // Object id 0 is the root directory.
        Self {
            next_id: 1,
            objects: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ImageObject {
    id: u32,
    data: Vec<u8>,
}

impl ImageObject {
    fn describe(&self, name: &str) -> GeneralObject {
        GeneralObject {
            id: self.id,
            name: name.to_owned(),
            size: self.data.len() as u32,
        }
    }
}

#[derive(Debug)]
struct OpenObject {
    name: String,
    mode: GeneralMode,
    pos: u64,
}

/// In-memory general store persisted into a container.
#[derive(Debug)]
pub struct MemoryGeneralStore<C> {
    container: C,
    image: Image,
    mounted: bool,
    epoch: u32,
    fds: Vec<Option<OpenObject>>,
    last: GeneralStatus,
}

impl<C: Container> MemoryGeneralStore<C> {
    /// Create an unmounted store with `max_open_files` descriptor slots.
    pub fn new(container: C, max_open_files: u32) -> Self {
        Self {
            container,
            image: Image::default(),
            mounted: false,
            epoch: 0,
            fds: (0..max_open_files).map(|_| None).collect(),
            last: GeneralStatus::OK,
        }
    }

    /// Load the image from the container.
    ///
    /// A container that was never written mounts as an empty filesystem.
    /// One that cannot be read or decoded leaves the store unmounted.
    pub fn mount(&mut self) -> Result<(), GeneralStatus> {
        if self.mounted {
            return Ok(());
        }
        let image = match self.container.load() {
            Ok(None) => Image::default(),
            Ok(Some(bytes)) => match postcard::take_from_bytes::<Image>(&bytes) {
                Ok((image, _)) => image,
                Err(err) => {
                    warn!(%err, "container does not hold a filesystem image");
                    return self.record(Err(GeneralStatus::NOT_A_FS));
                }
            },
            Err(err) => {
                warn!(%err, "failed to load container");
                return self.record(Err(GeneralStatus::NOT_A_FS));
            }
        };
        self.image = image;
        self.mounted = true;
        self.epoch = self.epoch.wrapping_add(1);
        self.fds.iter_mut().for_each(|fd| *fd = None);
        debug!(objects = self.image.objects.len(), "general store mounted");
        Ok(())
    }

    /// Close the container and drop every open descriptor.
    pub fn unmount(&mut self) -> Result<(), GeneralStatus> {
        self.fds.iter_mut().for_each(|fd| *fd = None);
        self.mounted = false;
        self.try_close_container()
    }

    pub fn container(&self) -> &C {
        &self.container
    }

    /// Object names in listing order.
    pub fn names(&self) -> Vec<String> {
        self.image.objects.keys().cloned().collect()
    }

    fn record<T>(&mut self, result: Result<T, GeneralStatus>) -> Result<T, GeneralStatus> {
        result.map_err(|status| {
            self.last = status;
            GeneralStatus::GENERIC
        })
    }

    fn ensure_mounted(&self) -> Result<(), GeneralStatus> {
        if self.mounted {
            Ok(())
        } else {
            Err(GeneralStatus::NOT_MOUNTED)
        }
    }

    fn persist(&mut self) -> Result<(), GeneralStatus> {
        let bytes = postcard::to_allocvec(&self.image).map_err(|err| {
            warn!(%err, "failed to encode filesystem image");
            GeneralStatus::CONTAINER_IO
        })?;
        self.container.store(&bytes).map_err(|err| {
            warn!(%err, "failed to store filesystem image");
            match err {
                ContainerError::TooLarge { .. } => GeneralStatus::FULL,
                ContainerError::Secure {
                    status: SecureStatus::NO_SPACE | SecureStatus::MAX_SIZE_EXCEEDED,
                    ..
                } => GeneralStatus::FULL,
                ContainerError::Secure { .. } => GeneralStatus::CONTAINER_IO,
            }
        })
    }

    /// Apply a change to the image and persist it, rolling back on failure.
    fn mutate<T>(
        &mut self,
        change: impl FnOnce(&mut Image) -> Result<T, GeneralStatus>,
    ) -> Result<T, GeneralStatus> {
        let saved = self.image.clone();
        let result = change(&mut self.image).and_then(|out| self.persist().map(|()| out));
        if result.is_err() {
            self.image = saved;
        }
        result
    }

    fn check_name(name: &str) -> Result<(), GeneralStatus> {
        if name.is_empty() {
            return Err(GeneralStatus::NOT_FOUND);
        }
        if name.len() > MAX_NAME_LEN {
            return Err(GeneralStatus::NAME_TOO_LONG);
        }
        Ok(())
    }

    fn try_open(&mut self, name: &str, mode: GeneralMode) -> Result<NativeFd, GeneralStatus> {
        self.ensure_mounted()?;
        Self::check_name(name)?;
        let slot = self
            .fds
            .iter()
            .position(Option::is_none)
            .ok_or(GeneralStatus::FULL)?;
        let exists = self.image.objects.contains_key(name);
        if exists && mode.contains(GeneralMode::CREAT | GeneralMode::EXCL) {
            return Err(GeneralStatus::FILE_EXISTS);
        }
        if !exists && !mode.contains(GeneralMode::CREAT) {
            return Err(GeneralStatus::NOT_FOUND);
        }
        if !exists {
            self.mutate(|image| {
                let id = image.next_id;
                image.next_id += 1;
                image.objects.insert(
                    name.to_owned(),
                    ImageObject {
                        id,
                        data: Vec::new(),
                    },
                );
                Ok(())
            })?;
        } else if mode.contains(GeneralMode::TRUNC | GeneralMode::WRONLY) {
            self.mutate(|image| {
                if let Some(object) = image.objects.get_mut(name) {
                    object.data.clear();
                }
                Ok(())
            })?;
        }
        self.fds[slot] = Some(OpenObject {
            name: name.to_owned(),
            mode,
            pos: 0,
        });
        Ok(NativeFd(slot as u32))
    }

    fn try_close(&mut self, fd: NativeFd) -> Result<(), GeneralStatus> {
        self.ensure_mounted()?;
        self.fds
            .get_mut(fd.0 as usize)
            .and_then(Option::take)
            .map(|_| ())
            .ok_or(GeneralStatus::BAD_DESCRIPTOR)
    }

    fn try_read(&mut self, fd: NativeFd, buf: &mut [u8]) -> Result<usize, GeneralStatus> {
        self.ensure_mounted()?;
        let open = slot_mut(&mut self.fds, fd)?;
        if !open.mode.contains(GeneralMode::RDONLY) {
            return Err(GeneralStatus::NOT_READABLE);
        }
        let object = self
            .image
            .objects
            .get(&open.name)
            .ok_or(GeneralStatus::NOT_FOUND)?;
        let start = (open.pos as usize).min(object.data.len());
        let n = buf.len().min(object.data.len() - start);
        buf[..n].copy_from_slice(&object.data[start..start + n]);
        open.pos += n as u64;
        Ok(n)
    }

    fn try_write(&mut self, fd: NativeFd, data: &[u8]) -> Result<usize, GeneralStatus> {
        self.ensure_mounted()?;
        let open = slot_mut(&mut self.fds, fd)?;
        if !open.mode.contains(GeneralMode::WRONLY) {
            return Err(GeneralStatus::NOT_WRITABLE);
        }
        let name = open.name.clone();
        let append = open.mode.contains(GeneralMode::APPEND);
        let pos = open.pos as usize;
        let end = self.mutate(|image| {
            let object = image
                .objects
                .get_mut(&name)
                .ok_or(GeneralStatus::NOT_FOUND)?;
            let start = if append { object.data.len() } else { pos };
            let end = start + data.len();
            if object.data.len() < end {
                object.data.resize(end, 0);
            }
            object.data[start..end].copy_from_slice(data);
            Ok(end)
        })?;
        slot_mut(&mut self.fds, fd)?.pos = end as u64;
        Ok(data.len())
    }

    fn try_seek(
        &mut self,
        fd: NativeFd,
        offset: i64,
        whence: Whence,
    ) -> Result<u64, GeneralStatus> {
        self.ensure_mounted()?;
        let open = slot_mut(&mut self.fds, fd)?;
        let len = self
            .image
            .objects
            .get(&open.name)
            .map(|o| o.data.len() as u64)
            .ok_or(GeneralStatus::NOT_FOUND)?;
        let base = match whence {
            Whence::Set => 0,
            Whence::Current => open.pos,
            Whence::End => len,
        };
        let target = (base as i64)
            .checked_add(offset)
            .filter(|t| *t >= 0 && *t as u64 <= len)
            .ok_or(GeneralStatus::END_OF_OBJECT)?;
        open.pos = target as u64;
        Ok(open.pos)
    }

    fn try_fstat(&mut self, fd: NativeFd) -> Result<GeneralObject, GeneralStatus> {
        self.ensure_mounted()?;
        let open = slot_mut(&mut self.fds, fd)?;
        self.image
            .objects
            .get(&open.name)
            .map(|o| o.describe(&open.name))
            .ok_or(GeneralStatus::NOT_FOUND)
    }

    fn try_stat(&self, name: &str) -> Result<GeneralObject, GeneralStatus> {
        self.ensure_mounted()?;
        self.image
            .objects
            .get(name)
            .map(|o| o.describe(name))
            .ok_or(GeneralStatus::NOT_FOUND)
    }

    fn try_rename(&mut self, from: &str, to: &str) -> Result<(), GeneralStatus> {
        self.ensure_mounted()?;
        Self::check_name(to)?;
        self.mutate(|image| {
            if image.objects.contains_key(to) {
                return Err(GeneralStatus::FILE_EXISTS);
            }
            let object = image
                .objects
                .remove(from)
                .ok_or(GeneralStatus::NOT_FOUND)?;
            image.objects.insert(to.to_owned(), object);
            Ok(())
        })?;
        for open in self.fds.iter_mut().flatten().filter(|o| o.name == from) {
            open.name = to.to_owned();
        }
        Ok(())
    }

    fn try_remove(&mut self, name: &str) -> Result<(), GeneralStatus> {
        self.ensure_mounted()?;
        self.mutate(|image| {
            image
                .objects
                .remove(name)
                .map(|_| ())
                .ok_or(GeneralStatus::NOT_FOUND)
        })
    }

    fn try_readdir(
        &mut self,
        dir: &mut GeneralDir,
    ) -> Result<Option<GeneralObject>, GeneralStatus> {
        self.ensure_mounted()?;
        if dir.epoch != self.epoch {
            return Err(GeneralStatus::BAD_DESCRIPTOR);
        }
        let entry = self
            .image
            .objects
            .iter()
            .nth(dir.cursor)
            .map(|(name, object)| object.describe(name));
        if entry.is_some() {
            dir.cursor += 1;
        }
        Ok(entry)
    }

    fn try_close_container(&mut self) -> Result<(), GeneralStatus> {
        self.container.close().map_err(|err| {
            warn!(%err, "failed to close container");
            GeneralStatus::CONTAINER_IO
        })
    }
}

fn slot_mut(
    fds: &mut [Option<OpenObject>],
    fd: NativeFd,
) -> Result<&mut OpenObject, GeneralStatus> {
    fds.get_mut(fd.0 as usize)
        .and_then(Option::as_mut)
        .ok_or(GeneralStatus::BAD_DESCRIPTOR)
}

impl<C: Container> GeneralStore for MemoryGeneralStore<C> {
    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn open(&mut self, name: &str, mode: GeneralMode) -> Result<NativeFd, GeneralStatus> {
        let result = self.try_open(name, mode);
        self.record(result)
    }

    fn close(&mut self, fd: NativeFd) -> Result<(), GeneralStatus> {
        let result = self.try_close(fd);
        self.record(result)
    }

    fn read(&mut self, fd: NativeFd, buf: &mut [u8]) -> Result<usize, GeneralStatus> {
        let result = self.try_read(fd, buf);
        self.record(result)
    }

    fn write(&mut self, fd: NativeFd, data: &[u8]) -> Result<usize, GeneralStatus> {
        let result = self.try_write(fd, data);
        self.record(result)
    }

    fn seek(&mut self, fd: NativeFd, offset: i64, whence: Whence) -> Result<u64, GeneralStatus> {
        let result = self.try_seek(fd, offset, whence);
        self.record(result)
    }

    fn fstat(&mut self, fd: NativeFd) -> Result<GeneralObject, GeneralStatus> {
        let result = self.try_fstat(fd);
        self.record(result)
    }

    fn stat(&mut self, name: &str) -> Result<GeneralObject, GeneralStatus> {
        let result = self.try_stat(name);
        self.record(result)
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), GeneralStatus> {
        let result = self.try_rename(from, to);
        self.record(result)
    }

    fn remove(&mut self, name: &str) -> Result<(), GeneralStatus> {
        let result = self.try_remove(name);
        self.record(result)
    }

    /// The namespace is flat; every name lists the whole store.
    fn opendir(&mut self, _name: &str) -> Result<GeneralDir, GeneralStatus> {
        let result = self.ensure_mounted().map(|()| GeneralDir {
            epoch: self.epoch,
            cursor: 0,
        });
        self.record(result)
    }

    fn readdir(&mut self, dir: &mut GeneralDir) -> Result<Option<GeneralObject>, GeneralStatus> {
        let result = self.try_readdir(dir);
        self.record(result)
    }

    fn closedir(&mut self, dir: GeneralDir) -> Result<(), GeneralStatus> {
        let result = if dir.epoch == self.epoch {
            Ok(())
        } else {
            Err(GeneralStatus::BAD_DESCRIPTOR)
        };
        self.record(result)
    }

    fn close_container(&mut self) -> Result<(), GeneralStatus> {
        let result = self.try_close_container();
        self.record(result)
    }

    fn last_status(&self) -> GeneralStatus {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{
        MemorySecureStore, SecureContainer, SharedSecureStore, shared_secure_store,
    };

    type Store = MemoryGeneralStore<SecureContainer<SharedSecureStore>>;

    fn mounted(max_open: u32) -> (Store, SharedSecureStore) {
        let secure = shared_secure_store(MemorySecureStore::new(4));
        let container = SecureContainer::new(secure.clone(), "fs.img", 4096);
        let mut store = MemoryGeneralStore::new(container, max_open);
        store.mount().unwrap();
        (store, secure)
    }

    fn create(store: &mut Store, name: &str, data: &[u8]) {
        let fd = store
            .open(name, GeneralMode::WRONLY | GeneralMode::CREAT)
            .unwrap();
        store.write(fd, data).unwrap();
        store.close(fd).unwrap();
    }

    #[test]
    fn test_failures_use_generic_sentinel() {
        let (mut store, _) = mounted(4);
        assert_eq!(
            store.open("missing", GeneralMode::RDONLY),
            Err(GeneralStatus::GENERIC)
        );
        assert_eq!(store.last_status(), GeneralStatus::NOT_FOUND);
    }

    #[test]
    fn test_write_read_seek() {
        let (mut store, _) = mounted(4);
        create(&mut store, "log", b"hello world");

        let fd = store.open("log", GeneralMode::RDONLY).unwrap();
        assert_eq!(store.seek(fd, 6, Whence::Set).unwrap(), 6);
        let mut buf = [0u8; 32];
        assert_eq!(store.read(fd, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"world");
        assert_eq!(store.read(fd, &mut buf).unwrap(), 0);
        assert_eq!(store.fstat(fd).unwrap().size, 11);
        assert!(store.seek(fd, 1, Whence::End).is_err());
        assert_eq!(store.last_status(), GeneralStatus::END_OF_OBJECT);
    }

    #[test]
    fn test_mode_checks() {
        let (mut store, _) = mounted(4);
        create(&mut store, "f", b"x");
        let ro = store.open("f", GeneralMode::RDONLY).unwrap();
        assert!(store.write(ro, b"y").is_err());
        assert_eq!(store.last_status(), GeneralStatus::NOT_WRITABLE);

        let wo = store.open("f", GeneralMode::WRONLY).unwrap();
        let mut buf = [0u8; 1];
        assert!(store.read(wo, &mut buf).is_err());
        assert_eq!(store.last_status(), GeneralStatus::NOT_READABLE);
    }

    #[test]
    fn test_exclusive_truncate_append() {
        let (mut store, _) = mounted(4);
        create(&mut store, "f", b"abc");
        assert!(
            store
                .open("f", GeneralMode::WRONLY | GeneralMode::CREAT | GeneralMode::EXCL)
                .is_err()
        );
        assert_eq!(store.last_status(), GeneralStatus::FILE_EXISTS);

        let fd = store
            .open("f", GeneralMode::WRONLY | GeneralMode::APPEND)
            .unwrap();
        store.write(fd, b"def").unwrap();
        store.close(fd).unwrap();
        assert_eq!(store.stat("f").unwrap().size, 6);

        let fd = store
            .open("f", GeneralMode::WRONLY | GeneralMode::TRUNC)
            .unwrap();
        store.close(fd).unwrap();
        assert_eq!(store.stat("f").unwrap().size, 0);
    }

    #[test]
    fn test_descriptor_exhaustion_reports_full() {
        let (mut store, _) = mounted(2);
        create(&mut store, "f", b"x");
        store.open("f", GeneralMode::RDONLY).unwrap();
        store.open("f", GeneralMode::RDONLY).unwrap();
        assert!(store.open("f", GeneralMode::RDONLY).is_err());
        assert_eq!(store.last_status(), GeneralStatus::FULL);
    }

    #[test]
    fn test_image_too_large_rolls_back() {
        let secure = shared_secure_store(MemorySecureStore::new(4));
        let container = SecureContainer::new(secure, "fs.img", 64);
        let mut store = MemoryGeneralStore::new(container, 4);
        store.mount().unwrap();

        let fd = store
            .open("big", GeneralMode::WRONLY | GeneralMode::CREAT)
            .unwrap();
        assert!(store.write(fd, &[7u8; 128]).is_err());
        assert_eq!(store.last_status(), GeneralStatus::FULL);
        assert_eq!(store.stat("big").unwrap().size, 0);
    }

    #[test]
    fn test_rename_follows_open_descriptors() {
        let (mut store, _) = mounted(4);
        create(&mut store, "old", b"data");
        let fd = store.open("old", GeneralMode::RDONLY).unwrap();
        store.rename("old", "new").unwrap();
        assert_eq!(store.fstat(fd).unwrap().name, "new");
        assert!(store.stat("old").is_err());

        create(&mut store, "other", b"");
        assert!(store.rename("new", "other").is_err());
        assert_eq!(store.last_status(), GeneralStatus::FILE_EXISTS);
    }

    #[test]
    fn test_remove() {
        let (mut store, _) = mounted(4);
        create(&mut store, "gone", b"1");
        store.remove("gone").unwrap();
        assert!(store.remove("gone").is_err());
        assert_eq!(store.last_status(), GeneralStatus::NOT_FOUND);
    }

    #[test]
    fn test_readdir_lists_in_name_order() {
        let (mut store, _) = mounted(4);
        create(&mut store, "b", b"22");
        create(&mut store, "a", b"1");

        let mut dir = store.opendir("").unwrap();
        let first = store.readdir(&mut dir).unwrap().unwrap();
        let second = store.readdir(&mut dir).unwrap().unwrap();
        assert_eq!((first.name.as_str(), first.size), ("a", 1));
        assert_eq!((second.name.as_str(), second.size), ("b", 2));
        assert_eq!(store.readdir(&mut dir).unwrap(), None);
        store.closedir(dir).unwrap();
    }

    #[test]
    fn test_image_survives_remount_after_container_close() {
        let (mut store, secure) = mounted(4);
        create(&mut store, "keep", b"persisted");
        store.close_container().unwrap();
        assert!(!store.container().is_open());

        let container = SecureContainer::new(secure, "fs.img", 4096);
        let mut again = MemoryGeneralStore::new(container, 4);
        again.mount().unwrap();
        assert_eq!(again.names(), vec!["keep".to_string()]);
        assert_eq!(again.stat("keep").unwrap().size, 9);
    }

    #[test]
    fn test_unmounted_store_rejects_operations() {
        let (mut store, _) = mounted(4);
        store.unmount().unwrap();
        assert!(!store.is_mounted());
        assert!(store.stat("x").is_err());
        assert_eq!(store.last_status(), GeneralStatus::NOT_MOUNTED);
    }

    #[test]
    fn test_stale_directory_cursor() {
        let (mut store, _) = mounted(4);
        let mut dir = store.opendir("").unwrap();
        store.unmount().unwrap();
        store.mount().unwrap();
        assert!(store.readdir(&mut dir).is_err());
        assert_eq!(store.last_status(), GeneralStatus::BAD_DESCRIPTOR);
    }
}
