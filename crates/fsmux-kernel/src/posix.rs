//! Raw-integer POSIX boundary.
//!
//! Failures return `-errno` and leave the errno in [`PosixShim::errno`];
//! successes leave it untouched.

use std::ffi::CStr;

use fsmux_types::{DirEntry, Errno, FileStat, FsResult, OpenFlags, Whence};

use crate::adapter::DirHandle;
use crate::dispatch::Dispatcher;

/// POSIX-style calls over a [`Dispatcher`].
pub struct PosixShim {
    dispatcher: Dispatcher,
    errno: i32,
}

impl PosixShim {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            errno: 0,
        }
    }

    /// Errno of the most recent failing call.
    pub fn errno(&self) -> i32 {
        self.errno
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    pub fn into_dispatcher(self) -> Dispatcher {
        self.dispatcher
    }

    fn set_errno(&mut self, errno: Errno) {
        self.errno = errno.code();
    }

    fn status(&mut self, result: FsResult<()>) -> i32 {
        match result {
            Ok(()) => 0,
            Err(errno) => {
                self.set_errno(errno);
                errno.as_return()
            }
        }
    }

    fn count(&mut self, result: FsResult<usize>) -> isize {
        match result {
            Ok(n) => n as isize,
            Err(errno) => {
                self.set_errno(errno);
                errno.as_return() as isize
            }
        }
    }

    fn path(path: &CStr) -> FsResult<&str> {
        path.to_str().map_err(|_| Errno::EINVAL)
    }

    pub fn open(&mut self, path: &CStr, flags: i32, mode: u32) -> i32 {
        let result = Self::path(path).and_then(|path| {
            let flags = OpenFlags::from_bits(flags)?;
            let handle = self.dispatcher.open(path, flags, mode)?;
            self.dispatcher.raw(handle)
        });
        match result {
            Ok(fd) => fd,
            Err(errno) => {
                self.set_errno(errno);
                errno.as_return()
            }
        }
    }

    pub fn close(&mut self, fd: i32) -> i32 {
        let result = self
            .dispatcher
            .resolve(fd)
            .and_then(|handle| self.dispatcher.close(handle));
        self.status(result)
    }

    pub fn read(&mut self, fd: i32, buf: &mut [u8]) -> isize {
        let result = self
            .dispatcher
            .resolve(fd)
            .and_then(|handle| self.dispatcher.read(handle, buf));
        self.count(result)
    }

    pub fn write(&mut self, fd: i32, buf: &[u8]) -> isize {
        let result = self
            .dispatcher
            .resolve(fd)
            .and_then(|handle| self.dispatcher.write(handle, buf));
        self.count(result)
    }

    pub fn lseek(&mut self, fd: i32, offset: i64, whence: i32) -> i64 {
        let result = self.dispatcher.resolve(fd).and_then(|handle| {
            let whence = Whence::from_raw(whence)?;
            self.dispatcher.seek(handle, offset, whence)
        });
        match result {
            Ok(pos) => pos as i64,
            Err(errno) => {
                self.set_errno(errno);
                i64::from(errno.as_return())
            }
        }
    }

    /// `out` is zeroed before the lookup.
    pub fn stat(&mut self, path: &CStr, out: &mut FileStat) -> i32 {
        *out = FileStat::default();
        let result = Self::path(path)
            .and_then(|path| self.dispatcher.stat(path))
            .map(|st| *out = st);
        self.status(result)
    }

    /// `out` is zeroed before the lookup.
    pub fn fstat(&mut self, fd: i32, out: &mut FileStat) -> i32 {
        *out = FileStat::default();
        let result = self
            .dispatcher
            .resolve(fd)
            .and_then(|handle| self.dispatcher.fstat(handle))
            .map(|st| *out = st);
        self.status(result)
    }

    pub fn rename(&mut self, from: &CStr, to: &CStr) -> i32 {
        let result = Self::path(from)
            .and_then(|from| Ok((from, Self::path(to)?)))
            .and_then(|(from, to)| self.dispatcher.rename(from, to));
        self.status(result)
    }

    pub fn unlink(&mut self, path: &CStr) -> i32 {
        let result = Self::path(path).and_then(|path| self.dispatcher.unlink(path));
        self.status(result)
    }

    pub fn link(&mut self, from: &CStr, to: &CStr) -> i32 {
        let result = Self::path(from)
            .and_then(|from| Ok((from, Self::path(to)?)))
            .and_then(|(from, to)| self.dispatcher.link(from, to));
        self.status(result)
    }

    pub fn mkdir(&mut self, path: &CStr, mode: u32) -> i32 {
        let result = Self::path(path).and_then(|path| self.dispatcher.mkdir(path, mode));
        self.status(result)
    }

    pub fn rmdir(&mut self, path: &CStr) -> i32 {
        let result = Self::path(path).and_then(|path| self.dispatcher.rmdir(path));
        self.status(result)
    }

    pub fn opendir(&mut self, path: &CStr) -> Option<DirHandle> {
        match Self::path(path).and_then(|path| self.dispatcher.opendir(path)) {
            Ok(dir) => Some(dir),
            Err(errno) => {
                self.set_errno(errno);
                None
            }
        }
    }

    /// `None` both at the end of the listing and on failure; only a failure
    /// sets errno.
    pub fn readdir(&mut self, dir: &mut DirHandle) -> Option<DirEntry> {
        match self.dispatcher.readdir(dir) {
            Ok(entry) => entry,
            Err(errno) => {
                self.set_errno(errno);
                None
            }
        }
    }

    pub fn closedir(&mut self, dir: DirHandle) -> i32 {
        let result = self.dispatcher.closedir(dir);
        self.status(result)
    }
}
