//! General-store adapter.

use fsmux_types::{DirEntry, Errno, FileStat, FsResult, NativeFd, OpenFlags, Whence};
use tracing::trace;

use crate::native::{GeneralDir, GeneralMode, GeneralObject, GeneralStatus, GeneralStore};
use crate::translate::{effective, resolve};

/// An open general-store directory listing.
#[derive(Debug)]
pub struct DirHandle {
    inner: GeneralDir,
}

/// Errno-speaking front of a [`GeneralStore`].
///
/// Every call on an unmounted store fails with `EBADF`.
pub struct GeneralStoreAdapter {
    store: Box<dyn GeneralStore>,
}

impl GeneralStoreAdapter {
    pub fn new(store: Box<dyn GeneralStore>) -> Self {
        Self { store }
    }

    pub fn is_mounted(&self) -> bool {
        self.store.is_mounted()
    }

    /// Native mode for portable flags.
    pub fn mode_for(flags: OpenFlags) -> GeneralMode {
        let mut mode = GeneralMode::empty();
        mode.set(GeneralMode::RDONLY, flags.read);
        mode.set(GeneralMode::WRONLY, flags.write);
        mode.set(GeneralMode::CREAT, flags.create);
        mode.set(GeneralMode::TRUNC, flags.truncate);
        mode.set(GeneralMode::APPEND, flags.append);
        mode.set(GeneralMode::EXCL, flags.exclusive);
        mode
    }

    fn mounted(&self) -> FsResult<()> {
        if self.store.is_mounted() {
            Ok(())
        } else {
            Err(Errno::EBADF)
        }
    }

    fn fail(&self, status: GeneralStatus) -> Errno {
        let last = self.store.last_status();
        let errno = resolve(status, last);
        trace!(status = %effective(status, last), %errno, "general store call failed");
        errno
    }

    fn attrs(object: GeneralObject) -> FileStat {
        FileStat::file(u64::from(object.id), u64::from(object.size))
    }

    pub fn open(&mut self, name: &str, flags: OpenFlags) -> FsResult<NativeFd> {
        self.mounted()?;
        self.store
            .open(name, Self::mode_for(flags))
            .map_err(|status| self.fail(status))
    }

    pub fn close(&mut self, fd: NativeFd) -> FsResult<()> {
        self.mounted()?;
        self.store.close(fd).map_err(|status| self.fail(status))
    }

    pub fn read(&mut self, fd: NativeFd, buf: &mut [u8]) -> FsResult<usize> {
        self.mounted()?;
        self.store.read(fd, buf).map_err(|status| self.fail(status))
    }

    pub fn write(&mut self, fd: NativeFd, data: &[u8]) -> FsResult<usize> {
        self.mounted()?;
        self.store
            .write(fd, data)
            .map_err(|status| self.fail(status))
    }

    pub fn seek(&mut self, fd: NativeFd, offset: i64, whence: Whence) -> FsResult<u64> {
        self.mounted()?;
        self.store
            .seek(fd, offset, whence)
            .map_err(|status| self.fail(status))
    }

    pub fn stat(&mut self, name: &str) -> FsResult<FileStat> {
        self.mounted()?;
        self.store
            .stat(name)
            .map(Self::attrs)
            .map_err(|status| self.fail(status))
    }

    pub fn fstat(&mut self, fd: NativeFd) -> FsResult<FileStat> {
        self.mounted()?;
        self.store
            .fstat(fd)
            .map(Self::attrs)
            .map_err(|status| self.fail(status))
    }

    pub fn rename(&mut self, from: &str, to: &str) -> FsResult<()> {
        self.mounted()?;
        self.store
            .rename(from, to)
            .map_err(|status| self.fail(status))
    }

    pub fn remove(&mut self, name: &str) -> FsResult<()> {
        self.mounted()?;
        self.store.remove(name).map_err(|status| self.fail(status))
    }

    pub fn opendir(&mut self, name: &str) -> FsResult<DirHandle> {
        self.mounted()?;
        self.store
            .opendir(name)
            .map(|inner| DirHandle { inner })
            .map_err(|status| self.fail(status))
    }

    /// Next entry, or `None` at the end of the listing.
    pub fn readdir(&mut self, dir: &mut DirHandle) -> FsResult<Option<DirEntry>> {
        self.mounted()?;
        let object = self
            .store
            .readdir(&mut dir.inner)
            .map_err(|status| self.fail(status))?;
        Ok(object.map(|o| DirEntry::file(o.name, u64::from(o.id), u64::from(o.size))))
    }

    pub fn closedir(&mut self, dir: DirHandle) -> FsResult<()> {
        self.mounted()?;
        self.store
            .closedir(dir.inner)
            .map_err(|status| self.fail(status))
    }

    /// Close the container object hosting the filesystem image.
    pub fn commit_container(&mut self) -> FsResult<()> {
        self.mounted()?;
        self.store
            .close_container()
            .map_err(|status| self.fail(status))
    }
}
