//! Secure-store adapter.
//!
//! The secure store has no combined read-write access, no exclusive create
//! and no truncate or append modes. They are emulated here:
//!
//! * read + write is refused with `ENOTSUP`
//! * exclusive create looks the object up first (`EEXIST`)
//! * truncate checks a write handle is available, then deletes the object and
//!   recreates it with the same reserved size
//! * append seeks to the end right after opening

use std::collections::BTreeMap;

use fsmux_types::{Errno, FileStat, FsResult, NativeFd, OpenFlags, Whence};
use tracing::{debug, error, trace};

use crate::native::{SecureAccess, SecureInfo, SecureStatus, SecureStore};
use crate::translate::{effective, resolve};

/// Errno-speaking front of a [`SecureStore`].
pub struct SecureStoreAdapter {
    store: Box<dyn SecureStore>,
    create_size: u32,
    /// Object name per open descriptor, for `fstat`.
    names: BTreeMap<NativeFd, String>,
}

impl SecureStoreAdapter {
    /// `create_size` is the capacity reserved for objects created by `open`.
    pub fn new(store: Box<dyn SecureStore>, create_size: u32) -> Self {
        Self {
            store,
            create_size,
            names: BTreeMap::new(),
        }
    }

    fn fail(&self, status: SecureStatus) -> Errno {
        let last = self.store.last_status();
        let errno = resolve(status, last);
        trace!(status = %effective(status, last), %errno, "secure store call failed");
        errno
    }

    /// `None` when the object does not exist.
    fn lookup(&mut self, name: &str) -> FsResult<Option<SecureInfo>> {
        match self.store.info(name) {
            Ok(info) => Ok(Some(info)),
            Err(status) => match effective(status, self.store.last_status()) {
                SecureStatus::FILE_NOT_EXISTS => Ok(None),
                _ => Err(self.fail(status)),
            },
        }
    }

    /// Take and release a write handle on an existing object, so that a
    /// destructive step only runs when the reopen that follows can succeed.
    fn reserve(&mut self, name: &str) -> FsResult<()> {
        let fd = self
            .store
            .open(name, SecureAccess::Write)
            .map_err(|status| self.fail(status))?;
        self.store.close(fd).map_err(|status| self.fail(status))
    }

    /// Native access for `flags`, and whether an existing object was deleted
    /// to emulate truncation.
    fn access_for(&mut self, name: &str, flags: OpenFlags) -> FsResult<(SecureAccess, bool)> {
        if flags.read && flags.write {
            return Err(Errno::ENOTSUP);
        }
        if !flags.write {
            return Ok((SecureAccess::Read, false));
        }
        match self.lookup(name)? {
            Some(_) if flags.create && flags.exclusive => Err(Errno::EEXIST),
            Some(info) if flags.truncate => {
                self.reserve(name)?;
                self.store
                    .delete(name)
                    .map_err(|status| self.fail(status))?;
                debug!(name, max_size = info.max_size, "secure object truncated");
                let access = SecureAccess::Create {
                    max_size: info.max_size,
                };
                Ok((access, true))
            }
            Some(_) => Ok((SecureAccess::Write, false)),
            None if flags.create => {
                let access = SecureAccess::Create {
                    max_size: self.create_size,
                };
                Ok((access, false))
            }
            None => Err(Errno::ENOENT),
        }
    }

    pub fn open(&mut self, name: &str, flags: OpenFlags) -> FsResult<NativeFd> {
        let (access, truncated) = self.access_for(name, flags)?;
        let fd = match self.store.open(name, access) {
            Ok(fd) => fd,
            Err(status) => {
                let errno = self.fail(status);
                if truncated {
                    error!(name, %errno, "truncated secure object could not be recreated");
                }
                return Err(errno);
            }
        };
        if flags.append {
            if let Err(status) = self.store.seek(fd, 0, Whence::End) {
                let errno = self.fail(status);
                let _ = self.store.close(fd);
                return Err(errno);
            }
        }
        self.names.insert(fd, name.to_owned());
        Ok(fd)
    }

    pub fn close(&mut self, fd: NativeFd) -> FsResult<()> {
        self.names.remove(&fd);
        self.store.close(fd).map_err(|status| self.fail(status))
    }

    pub fn read(&mut self, fd: NativeFd, buf: &mut [u8]) -> FsResult<usize> {
        self.store.read(fd, buf).map_err(|status| self.fail(status))
    }

    pub fn write(&mut self, fd: NativeFd, data: &[u8]) -> FsResult<usize> {
        self.store
            .write(fd, data)
            .map_err(|status| self.fail(status))
    }

    pub fn seek(&mut self, fd: NativeFd, offset: i64, whence: Whence) -> FsResult<u64> {
        self.store
            .seek(fd, offset, whence)
            .map_err(|status| self.fail(status))
    }

    pub fn stat(&mut self, name: &str) -> FsResult<FileStat> {
        let info = self
            .store
            .info(name)
            .map_err(|status| self.fail(status))?;
        Ok(FileStat::file(u64::from(info.token), u64::from(info.size)))
    }

    pub fn fstat(&mut self, fd: NativeFd) -> FsResult<FileStat> {
        let name = self.names.get(&fd).cloned().ok_or(Errno::EBADF)?;
        self.stat(&name)
    }

    pub fn rename(&mut self, from: &str, to: &str) -> FsResult<()> {
        self.store
            .rename(from, to)
            .map_err(|status| self.fail(status))
    }

    pub fn remove(&mut self, name: &str) -> FsResult<()> {
        self.store.delete(name).map_err(|status| self.fail(status))
    }
}
