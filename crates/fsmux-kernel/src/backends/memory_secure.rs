//! In-memory secure store.
//!
//! Models the parts of the vendor store the dispatcher depends on: a fixed
//! handle pool, objects with a size reserved at creation, and objects that
//! become unreadable when power is lost while they are open for writing.

use std::collections::BTreeMap;
use std::sync::Arc;

use fsmux_types::{NativeFd, Whence};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::native::{SecureAccess, SecureInfo, SecureStatus, SecureStore};

/// A secure store shared between the dispatcher and the container that
/// hosts the general store.
pub type SharedSecureStore = Arc<Mutex<MemorySecureStore>>;

/// Wrap a store for sharing.
pub fn shared_secure_store(store: MemorySecureStore) -> SharedSecureStore {
    Arc::new(Mutex::new(store))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SecureObject {
    token: u32,
    max_size: u32,
    data: Vec<u8>,
    /// Open for writing at the last power loss.
    torn: bool,
}

/// Persistent state of a [`MemorySecureStore`].
///
/// Objects that are open for writing when the snapshot is taken are
/// recorded as torn, the same as after a power loss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureSnapshot {
    next_token: u32,
    objects: BTreeMap<String, SecureObject>,
}

impl Default for SecureSnapshot {
    fn default() -> Self {
        Self {
            next_token: 1,
            objects: BTreeMap::new(),
        }
    }
}

impl SecureSnapshot {
    /// Encode with postcard.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Decode a postcard-encoded snapshot.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[derive(Debug)]
struct OpenHandle {
    name: String,
    write: bool,
    pos: u64,
}

/// In-memory secure store.
#[derive(Debug)]
pub struct MemorySecureStore {
    objects: BTreeMap<String, SecureObject>,
    next_token: u32,
    handles: Vec<Option<OpenHandle>>,
    last: SecureStatus,
}

impl MemorySecureStore {
    /// Create an empty store with `max_open` handle slots.
    pub fn new(max_open: u32) -> Self {
        Self::from_snapshot(SecureSnapshot::default(), max_open)
    }

    /// Restore a store from a snapshot. No handles are open afterwards.
    pub fn from_snapshot(snapshot: SecureSnapshot, max_open: u32) -> Self {
        Self {
            objects: snapshot.objects,
            next_token: snapshot.next_token,
            handles: (0..max_open).map(|_| None).collect(),
            last: SecureStatus::OK,
        }
    }

    /// Replace the persistent state with a snapshot, dropping every handle.
    pub fn restore(&mut self, snapshot: SecureSnapshot) {
        self.objects = snapshot.objects;
        self.next_token = snapshot.next_token;
        self.handles.iter_mut().for_each(|h| *h = None);
        self.last = SecureStatus::OK;
    }

    /// Capture the persistent state.
    pub fn snapshot(&self) -> SecureSnapshot {
        let mut objects = self.objects.clone();
        for handle in self.handles.iter().flatten().filter(|h| h.write) {
            if let Some(object) = objects.get_mut(&handle.name) {
                object.torn = true;
            }
        }
        SecureSnapshot {
            next_token: self.next_token,
            objects,
        }
    }

    /// Simulate a power loss: every handle is dropped and objects that were
    /// open for writing become torn. Returns the number of torn objects.
    pub fn power_cycle(&mut self) -> usize {
        let mut torn = 0;
        for handle in self.handles.iter_mut().filter_map(Option::take) {
            if !handle.write {
                continue;
            }
            if let Some(object) = self.objects.get_mut(&handle.name) {
                object.torn = true;
                torn += 1;
            }
        }
        if torn > 0 {
            warn!(torn, "power lost with objects open for writing");
        }
        torn
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    /// True if the object was open for writing at a power loss.
    pub fn is_torn(&self, name: &str) -> bool {
        self.objects.get(name).is_some_and(|o| o.torn)
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.handles.iter().flatten().count()
    }

    fn is_open(&self, name: &str, write_only: bool) -> bool {
        self.handles
            .iter()
            .flatten()
            .any(|h| h.name == name && (h.write || !write_only))
    }

    fn record<T>(&mut self, result: Result<T, SecureStatus>) -> Result<T, SecureStatus> {
        if let Err(status) = &result {
            self.last = *status;
        }
        result
    }

    fn try_open(&mut self, name: &str, access: SecureAccess) -> Result<NativeFd, SecureStatus> {
        if name.is_empty() {
            return Err(SecureStatus::INVALID_ARGS);
        }
        let create = match (self.objects.get(name), access) {
            (None, SecureAccess::Create { max_size: 0 }) => return Err(SecureStatus::INVALID_ARGS),
            (None, SecureAccess::Create { max_size }) => Some(max_size),
            (None, _) => return Err(SecureStatus::FILE_NOT_EXISTS),
            (Some(object), _) if object.torn => return Err(SecureStatus::NOT_CLOSED_CORRECTLY),
            (Some(_), _) if access.is_write() && self.is_open(name, true) => {
                return Err(SecureStatus::ACCESS_DENIED);
            }
            (Some(_), _) => None,
        };
        let slot = self
            .handles
            .iter()
            .position(Option::is_none)
            .ok_or(SecureStatus::NO_SPACE)?;

        if let Some(max_size) = create {
            let token = self.next_token;
            self.next_token += 1;
            self.objects.insert(
                name.to_owned(),
                SecureObject {
                    token,
                    max_size,
                    data: Vec::new(),
                    torn: false,
                },
            );
            debug!(name, token, max_size, "secure object created");
        }
        self.handles[slot] = Some(OpenHandle {
            name: name.to_owned(),
            write: access.is_write(),
            pos: 0,
        });
        Ok(NativeFd(slot as u32))
    }

    fn try_close(&mut self, fd: NativeFd) -> Result<(), SecureStatus> {
        self.handles
            .get_mut(fd.0 as usize)
            .and_then(Option::take)
            .map(|_| ())
            .ok_or(SecureStatus::INVALID_HANDLE)
    }

    fn try_read(&mut self, fd: NativeFd, buf: &mut [u8]) -> Result<usize, SecureStatus> {
        let handle = slot_mut(&mut self.handles, fd)?;
        if handle.write {
            return Err(SecureStatus::ACCESS_DENIED);
        }
        let object = self
            .objects
            .get(&handle.name)
            .ok_or(SecureStatus::FILE_NOT_EXISTS)?;
        let start = (handle.pos as usize).min(object.data.len());
        let n = buf.len().min(object.data.len() - start);
        buf[..n].copy_from_slice(&object.data[start..start + n]);
        handle.pos += n as u64;
        Ok(n)
    }

    fn try_write(&mut self, fd: NativeFd, data: &[u8]) -> Result<usize, SecureStatus> {
        let handle = slot_mut(&mut self.handles, fd)?;
        if !handle.write {
            return Err(SecureStatus::ACCESS_DENIED);
        }
        let object = self
            .objects
            .get_mut(&handle.name)
            .ok_or(SecureStatus::FILE_NOT_EXISTS)?;
        let end = handle.pos + data.len() as u64;
        if end > u64::from(object.max_size) {
            return Err(SecureStatus::MAX_SIZE_EXCEEDED);
        }
        let (start, end) = (handle.pos as usize, end as usize);
        if object.data.len() < end {
            object.data.resize(end, 0);
        }
        object.data[start..end].copy_from_slice(data);
        handle.pos = end as u64;
        Ok(data.len())
    }

    fn try_seek(&mut self, fd: NativeFd, offset: i64, whence: Whence) -> Result<u64, SecureStatus> {
        let handle = slot_mut(&mut self.handles, fd)?;
        let object = self
            .objects
            .get(&handle.name)
            .ok_or(SecureStatus::FILE_NOT_EXISTS)?;
        let len = object.data.len() as u64;
        let limit = if handle.write {
            u64::from(object.max_size)
        } else {
            len
        };
        let base = match whence {
            Whence::Set => 0,
            Whence::Current => handle.pos,
            Whence::End => len,
        };
        let target = (base as i64)
            .checked_add(offset)
            .filter(|t| *t >= 0 && *t as u64 <= limit)
            .ok_or(SecureStatus::INVALID_ARGS)?;
        handle.pos = target as u64;
        Ok(handle.pos)
    }

    fn try_info(&self, name: &str) -> Result<SecureInfo, SecureStatus> {
        let object = self
            .objects
            .get(name)
            .ok_or(SecureStatus::FILE_NOT_EXISTS)?;
        Ok(SecureInfo {
            token: object.token,
            size: object.data.len() as u32,
            max_size: object.max_size,
        })
    }

    fn try_rename(&mut self, from: &str, to: &str) -> Result<(), SecureStatus> {
        if to.is_empty() {
            return Err(SecureStatus::INVALID_ARGS);
        }
        if !self.objects.contains_key(from) {
            return Err(SecureStatus::FILE_NOT_EXISTS);
        }
        if self.objects.contains_key(to) {
            return Err(SecureStatus::FILE_EXISTS);
        }
        if self.is_open(from, false) {
            return Err(SecureStatus::ACCESS_DENIED);
        }
        if let Some(object) = self.objects.remove(from) {
            self.objects.insert(to.to_owned(), object);
        }
        Ok(())
    }

    fn try_delete(&mut self, name: &str) -> Result<(), SecureStatus> {
        if !self.objects.contains_key(name) {
            return Err(SecureStatus::FILE_NOT_EXISTS);
        }
        if self.is_open(name, false) {
            return Err(SecureStatus::ACCESS_DENIED);
        }
        self.objects.remove(name);
        Ok(())
    }
}

fn slot_mut(
    handles: &mut [Option<OpenHandle>],
    fd: NativeFd,
) -> Result<&mut OpenHandle, SecureStatus> {
    handles
        .get_mut(fd.0 as usize)
        .and_then(Option::as_mut)
        .ok_or(SecureStatus::INVALID_HANDLE)
}

impl SecureStore for MemorySecureStore {
    fn open(&mut self, name: &str, access: SecureAccess) -> Result<NativeFd, SecureStatus> {
        let result = self.try_open(name, access);
        self.record(result)
    }

    fn close(&mut self, fd: NativeFd) -> Result<(), SecureStatus> {
        let result = self.try_close(fd);
        self.record(result)
    }

    fn read(&mut self, fd: NativeFd, buf: &mut [u8]) -> Result<usize, SecureStatus> {
        let result = self.try_read(fd, buf);
        self.record(result)
    }

    fn write(&mut self, fd: NativeFd, data: &[u8]) -> Result<usize, SecureStatus> {
        let result = self.try_write(fd, data);
        self.record(result)
    }

    fn seek(&mut self, fd: NativeFd, offset: i64, whence: Whence) -> Result<u64, SecureStatus> {
        let result = self.try_seek(fd, offset, whence);
        self.record(result)
    }

    fn info(&mut self, name: &str) -> Result<SecureInfo, SecureStatus> {
        let result = self.try_info(name);
        self.record(result)
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), SecureStatus> {
        let result = self.try_rename(from, to);
        self.record(result)
    }

    fn delete(&mut self, name: &str) -> Result<(), SecureStatus> {
        let result = self.try_delete(name);
        self.record(result)
    }

    fn last_status(&self) -> SecureStatus {
        self.last
    }
}

impl<S: SecureStore> SecureStore for Arc<Mutex<S>> {
    fn open(&mut self, name: &str, access: SecureAccess) -> Result<NativeFd, SecureStatus> {
        self.lock().open(name, access)
    }

    fn close(&mut self, fd: NativeFd) -> Result<(), SecureStatus> {
        self.lock().close(fd)
    }

    fn read(&mut self, fd: NativeFd, buf: &mut [u8]) -> Result<usize, SecureStatus> {
        self.lock().read(fd, buf)
    }

    fn write(&mut self, fd: NativeFd, data: &[u8]) -> Result<usize, SecureStatus> {
        self.lock().write(fd, data)
    }

    fn seek(&mut self, fd: NativeFd, offset: i64, whence: Whence) -> Result<u64, SecureStatus> {
        self.lock().seek(fd, offset, whence)
    }

    fn info(&mut self, name: &str) -> Result<SecureInfo, SecureStatus> {
        self.lock().info(name)
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), SecureStatus> {
        self.lock().rename(from, to)
    }

    fn delete(&mut self, name: &str) -> Result<(), SecureStatus> {
        self.lock().delete(name)
    }

    fn last_status(&self) -> SecureStatus {
        self.lock().last_status()
    }
}
