//! The descriptor dispatcher.
//!
//! Owns the console, both backend adapters and the descriptor table, and
//! routes every operation by descriptor range or by path. Failures are
//! returned immediately; nothing is retried.
//!
//! # Example
//!
//! ```
//! use fsmux_kernel::backends::{MemorySecureStore, memory_dispatcher, shared_secure_store};
//! use fsmux_kernel::console::BufferDevice;
//! use fsmux_types::{FsmuxConfig, OpenFlags};
//!
//! let secure = shared_secure_store(MemorySecureStore::new(8));
//! let console = Box::new(BufferDevice::new());
//! let mut fs = memory_dispatcher(&FsmuxConfig::default(), secure, console)?;
//!
//! let fd = fs.open("notes.txt", OpenFlags::create(), 0o666)?;
//! fs.write(fd, b"hello")?;
//! fs.close(fd)?;
//! assert_eq!(fs.stat("./notes.txt")?.size, 5);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use fsmux_types::{
    DescriptorHandle, DescriptorLayout, DirEntry, Errno, FileStat, FsResult, OpenFlags, Whence,
};
use tracing::{debug, error, warn};

use crate::adapter::{DirHandle, GeneralStoreAdapter, SecureStoreAdapter};
use crate::commit::{CommitPolicy, CommitStats, CommitTrigger};
use crate::console::Console;
use crate::route::{Route, classify_path, strip_relative};
use crate::table::{DescriptorTable, OpenEntry};

/// Routes one descriptor namespace across the console and both stores.
pub struct Dispatcher {
    layout: DescriptorLayout,
    console: Console,
    general: GeneralStoreAdapter,
    secure: SecureStoreAdapter,
    table: DescriptorTable,
    commit: CommitPolicy,
}

impl Dispatcher {
    pub fn new(
        layout: DescriptorLayout,
        console: Console,
        general: GeneralStoreAdapter,
        secure: SecureStoreAdapter,
    ) -> Self {
        Self {
            table: DescriptorTable::for_layout(&layout),
            layout,
            console,
            general,
            secure,
            commit: CommitPolicy::new(),
        }
    }

    pub fn layout(&self) -> &DescriptorLayout {
        &self.layout
    }

    /// Outcomes of every container commit so far.
    pub fn commit_stats(&self) -> &CommitStats {
        self.commit.stats()
    }

    /// Number of open backend descriptors.
    pub fn open_count(&self) -> usize {
        self.table.len()
    }

    pub fn is_general_mounted(&self) -> bool {
        self.general.is_mounted()
    }

    /// The table entry for an open backend descriptor.
    pub fn entry(&self, handle: DescriptorHandle) -> Option<&OpenEntry> {
        self.table.get(handle)
    }

    /// Fails with `EBADF` unless `handle` is in range and, for a backend
    /// descriptor, open.
    fn live(&self, handle: DescriptorHandle) -> FsResult<()> {
        if !self.layout.admits(handle) {
            return Err(Errno::EBADF);
        }
        match handle {
            DescriptorHandle::Console(_) => Ok(()),
            _ if self.table.get(handle).is_some() => Ok(()),
            _ => Err(Errno::EBADF),
        }
    }

    // ========================================================================
    // Descriptors
    // ========================================================================

    /// Open `path` on the backend it routes to.
    pub fn open(
        &mut self,
        path: &str,
        flags: OpenFlags,
        mode: u32,
    ) -> FsResult<DescriptorHandle> {
        let route = classify_path(path);
        let result = self.open_routed(route, flags);
        debug!(
            path,
            flags = flags.bits(),
            mode,
            fd = ?result.as_ref().ok().and_then(|h| self.layout.to_raw(*h)),
            result = ?result.as_ref().err(),
            "open"
        );
        result
    }

    fn open_routed(&mut self, route: Route<'_>, flags: OpenFlags) -> FsResult<DescriptorHandle> {
        let handle = match route {
            Route::General(name) => DescriptorHandle::General(self.general.open(name, flags)?),
            Route::Secure(name) => DescriptorHandle::Secure(self.secure.open(name, flags)?),
        };
        if !self.layout.admits(handle) {
            warn!(?handle, "backend descriptor outside its range; closing it");
            self.close_native(handle);
            return Err(Errno::ENOSPC);
        }
        let entry = OpenEntry {
            name: route.name().to_owned(),
            flags,
        };
        if let Err(err) = self.table.insert(handle, entry) {
            // The backend handed out a descriptor that is already open.
            // Closing it would close the other user's descriptor.
            error!(%err, "refusing to alias an open descriptor");
            return Err(Errno::ENXIO);
        }
        Ok(handle)
    }

    fn close_native(&mut self, handle: DescriptorHandle) {
        let result = match handle {
            DescriptorHandle::General(native) => self.general.close(native),
            DescriptorHandle::Secure(native) => self.secure.close(native),
            DescriptorHandle::Console(_) => Ok(()),
        };
        if let Err(errno) = result {
            warn!(?handle, %errno, "failed to close backend descriptor; handle leaked");
        }
    }

    /// Close a descriptor. Closing a general-store descriptor opened for
    /// writing commits the container, whatever the close itself returned.
    pub fn close(&mut self, handle: DescriptorHandle) -> FsResult<()> {
        let result = self.close_inner(handle);
        debug!(?handle, result = ?result.err(), "close");
        result
    }

    fn close_inner(&mut self, handle: DescriptorHandle) -> FsResult<()> {
        self.live(handle)?;
        let native = match handle {
            DescriptorHandle::Console(_) => return Err(Errno::EACCES),
            DescriptorHandle::General(native) | DescriptorHandle::Secure(native) => native,
        };
        let entry = self.table.remove(handle).ok_or(Errno::EBADF)?;
        match handle {
            DescriptorHandle::General(_) => {
                let result = self.general.close(native);
                if entry.flags.is_writable() {
                    self.commit
                        .commit(CommitTrigger::CloseAfterWrite, &mut self.general);
                }
                result
            }
            _ => self.secure.close(native),
        }
    }

    pub fn read(&mut self, handle: DescriptorHandle, buf: &mut [u8]) -> FsResult<usize> {
        let result = self.read_inner(handle, buf);
        debug!(?handle, len = buf.len(), result = ?result, "read");
        result
    }

    fn read_inner(&mut self, handle: DescriptorHandle, buf: &mut [u8]) -> FsResult<usize> {
        self.live(handle)?;
        match handle {
            DescriptorHandle::Console(fd) => self.console.read(fd),
            DescriptorHandle::General(native) => self.general.read(native, buf),
            DescriptorHandle::Secure(native) => self.secure.read(native, buf),
        }
    }

    pub fn write(&mut self, handle: DescriptorHandle, data: &[u8]) -> FsResult<usize> {
        let result = self.write_inner(handle, data);
        debug!(?handle, len = data.len(), result = ?result, "write");
        result
    }

    fn write_inner(&mut self, handle: DescriptorHandle, data: &[u8]) -> FsResult<usize> {
        self.live(handle)?;
        match handle {
            DescriptorHandle::Console(fd) => self.console.write(fd, data),
            DescriptorHandle::General(native) => self.general.write(native, data),
            DescriptorHandle::Secure(native) => self.secure.write(native, data),
        }
    }

    /// Reposition a descriptor; returns the new absolute offset.
    pub fn seek(
        &mut self,
        handle: DescriptorHandle,
        offset: i64,
        whence: Whence,
    ) -> FsResult<u64> {
        let result = self.seek_inner(handle, offset, whence);
        debug!(?handle, offset, ?whence, result = ?result, "lseek");
        result
    }

    fn seek_inner(
        &mut self,
        handle: DescriptorHandle,
        offset: i64,
        whence: Whence,
    ) -> FsResult<u64> {
        self.live(handle)?;
        match handle {
            DescriptorHandle::Console(_) => Err(Errno::ESPIPE),
            DescriptorHandle::General(native) => self.general.seek(native, offset, whence),
            DescriptorHandle::Secure(native) => self.secure.seek(native, offset, whence),
        }
    }

    pub fn fstat(&mut self, handle: DescriptorHandle) -> FsResult<FileStat> {
        let result = self.fstat_inner(handle);
        debug!(?handle, result = ?result.as_ref().err(), "fstat");
        result
    }

    fn fstat_inner(&mut self, handle: DescriptorHandle) -> FsResult<FileStat> {
        self.live(handle)?;
        match handle {
            DescriptorHandle::Console(fd) => Ok(self.console.fstat(fd)),
            DescriptorHandle::General(native) => self.general.fstat(native),
            DescriptorHandle::Secure(native) => self.secure.fstat(native),
        }
    }

    // ========================================================================
    // Namespace
    // ========================================================================

    /// Attributes of `path`. An empty name is the synthetic root directory.
    pub fn stat(&mut self, path: &str) -> FsResult<FileStat> {
        let result = match classify_path(path) {
            Route::General(name) => match strip_relative(name) {
                "" => Ok(FileStat::root()),
                name => self.general.stat(name),
            },
            Route::Secure(name) => match strip_relative(name) {
                "" => Ok(FileStat::root()),
                name => self.secure.stat(name),
            },
        };
        debug!(path, result = ?result.as_ref().err(), "stat");
        result
    }

    /// Rename within a backend.
    ///
    /// The secure store handles the rename when either path carries the
    /// secure prefix. The general store commits its container on success.
    pub fn rename(&mut self, from: &str, to: &str) -> FsResult<()> {
        let (src, dst) = (classify_path(from), classify_path(to));
        let result = if src.is_secure() || dst.is_secure() {
            if src.is_secure() != dst.is_secure() {
                warn!(from, to, "rename crosses backends; routing to the secure store");
            }
            self.secure.rename(src.name(), dst.name())
        } else {
            self.general.rename(src.name(), dst.name()).inspect(|_| {
                self.commit.commit(CommitTrigger::Rename, &mut self.general);
            })
        };
        debug!(from, to, result = ?result.err(), "rename");
        result
    }

    /// Remove a file. The general store commits its container on success.
    pub fn unlink(&mut self, path: &str) -> FsResult<()> {
        let result = match classify_path(path) {
            Route::Secure(name) => self.secure.remove(name),
            Route::General(name) => self.general.remove(name).inspect(|_| {
                self.commit.commit(CommitTrigger::Unlink, &mut self.general);
            }),
        };
        debug!(path, result = ?result.err(), "unlink");
        result
    }

    /// Hard links are not supported by either backend.
    pub fn link(&mut self, from: &str, to: &str) -> FsResult<()> {
        debug!(from, to, "link");
        Err(Errno::ENOTSUP)
    }

    /// Only the root directory exists; creating it again succeeds.
    pub fn mkdir(&mut self, path: &str, mode: u32) -> FsResult<()> {
        let result = match classify_path(path) {
            Route::Secure(_) => Err(Errno::ENOTSUP),
            Route::General("") => Ok(()),
            Route::General(_) => Err(Errno::ENOTDIR),
        };
        debug!(path, mode, result = ?result.err(), "mkdir");
        result
    }

    pub fn rmdir(&mut self, path: &str) -> FsResult<()> {
        let result = match classify_path(path) {
            Route::Secure(_) => Err(Errno::ENOTSUP),
            Route::General(_) => Err(Errno::ENOTDIR),
        };
        debug!(path, result = ?result.err(), "rmdir");
        result
    }

    // ========================================================================
    // Directories
    // ========================================================================

    /// Open a listing of the general store. The secure store has none.
    pub fn opendir(&mut self, path: &str) -> FsResult<DirHandle> {
        let result = match classify_path(path) {
            Route::Secure(_) => Err(Errno::ENOTSUP),
            Route::General(name) => self.general.opendir(name),
        };
        debug!(path, result = ?result.as_ref().err(), "opendir");
        result
    }

    /// Next entry, or `None` at the end of the listing.
    pub fn readdir(&mut self, dir: &mut DirHandle) -> FsResult<Option<DirEntry>> {
        let result = self.general.readdir(dir);
        debug!(
            entry = result.as_ref().ok().and_then(|e| e.as_ref()).map(|e| e.name.as_str()),
            result = ?result.as_ref().err(),
            "readdir"
        );
        result
    }

    pub fn closedir(&mut self, dir: DirHandle) -> FsResult<()> {
        let result = self.general.closedir(dir);
        debug!(result = ?result.err(), "closedir");
        result
    }

    // ========================================================================
    // Raw descriptors
    // ========================================================================

    /// Resolve a raw descriptor. Out-of-range values fail with `EBADF`.
    pub fn resolve(&self, raw: i32) -> FsResult<DescriptorHandle> {
        self.layout.resolve(raw).ok_or(Errno::EBADF)
    }

    /// The raw value handed to callers for `handle`.
    pub fn raw(&self, handle: DescriptorHandle) -> FsResult<i32> {
        self.layout.to_raw(handle).ok_or(Errno::EBADF)
    }
}
