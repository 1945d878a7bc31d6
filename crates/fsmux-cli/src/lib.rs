//! Host-side access to fsmux storage images.
//!
//! An image file is a postcard snapshot of the secure store. The general
//! store lives inside it as the configured container object, so one file
//! carries both namespaces. Every command runs through [`PosixShim`], the
//! same boundary device code uses.

use std::ffi::CString;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::Subcommand;
use fsmux_kernel::{
    CharDevice, Dispatcher, MemorySecureStore, PosixShim, SecureSnapshot, SharedSecureStore,
    memory_dispatcher, shared_secure_store,
};
use fsmux_types::flags::{O_CREAT, O_RDONLY, O_TRUNC, O_WRONLY};
use fsmux_types::{Errno, FileStat, FsmuxConfig};
use tracing::{debug, info};

/// Chunk size for copying file contents through the shim.
const CHUNK: usize = 512;

/// Image commands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Copy a host file into the image
    Put {
        /// Host file to read
        src: PathBuf,
        /// Destination path (prefix with SL: for the secure store)
        path: String,
    },
    /// Print a file from the image to stdout
    Cat { path: String },
    /// List the general store
    Ls {
        #[arg(default_value = ".")]
        dir: String,
    },
    /// Show file attributes
    Stat { path: String },
    /// Remove a file
    Rm { path: String },
    /// Rename a file
    Mv { from: String, to: String },
    /// Write text to the console
    Echo { text: Vec<String> },
}

/// A loaded image with a dispatcher over it.
pub struct Session {
    shim: PosixShim,
    secure: SharedSecureStore,
    image: Option<PathBuf>,
}

impl Session {
    /// Load `image` (an absent file is an empty image) and boot a dispatcher
    /// over it. Without an image path the session is ephemeral.
    pub fn open(
        config: &FsmuxConfig,
        image: Option<&Path>,
        console: Box<dyn CharDevice>,
    ) -> Result<Self> {
        let snapshot = match image {
            Some(path) => load_snapshot(path)?,
            None => SecureSnapshot::default(),
        };
        debug!(objects = snapshot.len(), "secure snapshot loaded");
        let secure = shared_secure_store(MemorySecureStore::from_snapshot(
            snapshot,
            config.secure.max_open_files,
        ));
        let dispatcher = memory_dispatcher(config, secure.clone(), console)?;
        if !dispatcher.is_general_mounted() {
            info!("general store did not mount; only SL: paths are usable");
        }
        Ok(Self::with_dispatcher(
            dispatcher,
            secure,
            image.map(Path::to_path_buf),
        ))
    }

    /// Wrap an already booted dispatcher. `secure` is what [`Session::save`]
    /// writes to `image`.
    pub fn with_dispatcher(
        dispatcher: Dispatcher,
        secure: SharedSecureStore,
        image: Option<PathBuf>,
    ) -> Self {
        Self {
            shim: PosixShim::new(dispatcher),
            secure,
            image,
        }
    }

    /// Write the secure store back to the image file.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.image else {
            return Ok(());
        };
        let bytes = self
            .secure
            .lock()
            .snapshot()
            .to_bytes()
            .context("encoding secure snapshot")?;
        std::fs::write(path, &bytes)
            .with_context(|| format!("writing image {}", path.display()))?;
        debug!(path = %path.display(), bytes = bytes.len(), "image saved");
        Ok(())
    }

    /// Run one command, sending its output to `out`.
    pub fn run(&mut self, command: &Command, out: &mut dyn Write) -> Result<()> {
        match command {
            Command::Put { src, path } => {
                let data = std::fs::read(src)
                    .with_context(|| format!("reading {}", src.display()))?;
                self.put(path, &data)?;
                info!(path, bytes = data.len(), "stored");
            }
            Command::Cat { path } => {
                let data = self.get(path)?;
                out.write_all(&data)?;
            }
            Command::Ls { dir } => {
                for (name, size) in self.list(dir)? {
                    writeln!(out, "{size:>8}  {name}")?;
                }
            }
            Command::Stat { path } => {
                let st = self.stat(path)?;
                let kind = if st.is_dir() {
                    "directory"
                } else if st.is_char_device() {
                    "character device"
                } else {
                    "regular file"
                };
                writeln!(out, "  File: {path}")?;
                writeln!(out, "  Size: {}\tInode: {}\tLinks: {}", st.size, st.ino, st.nlink)?;
                writeln!(out, "  Type: {kind}\tMode: {:o}", st.perm())?;
            }
            Command::Rm { path } => {
                let c = cstring(path)?;
                let ret = self.shim.unlink(&c);
                self.check(i64::from(ret), "unlink", path)?;
            }
            Command::Mv { from, to } => {
                let (src, dst) = (cstring(from)?, cstring(to)?);
                let ret = self.shim.rename(&src, &dst);
                self.check(i64::from(ret), "rename", from)?;
            }
            Command::Echo { text } => {
                let line = format!("{}\n", text.join(" "));
                let ret = self.shim.write(1, line.as_bytes());
                self.check(ret as i64, "write", "stdout")?;
            }
        }
        Ok(())
    }

    /// Create or replace `path` with `data`.
    pub fn put(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let c = cstring(path)?;
        let fd = self.shim.open(&c, O_CREAT | O_TRUNC | O_WRONLY, 0o666);
        let fd = self.check(i64::from(fd), "open", path)? as i32;
        let written = self.write_all(fd, data, path);
        let ret = self.shim.close(fd);
        written?;
        self.check(i64::from(ret), "close", path)?;
        Ok(())
    }

    /// Read the whole of `path`.
    pub fn get(&mut self, path: &str) -> Result<Vec<u8>> {
        let c = cstring(path)?;
        let fd = self.shim.open(&c, O_RDONLY, 0);
        let fd = self.check(i64::from(fd), "open", path)? as i32;
        let mut data = Vec::new();
        let mut buf = [0u8; CHUNK];
        let result = loop {
            let n = self.shim.read(fd, &mut buf);
            match self.check(n as i64, "read", path) {
                Ok(0) => break Ok(()),
                Ok(n) => data.extend_from_slice(&buf[..n as usize]),
                Err(err) => break Err(err),
            }
        };
        let ret = self.shim.close(fd);
        let data = result.map(|()| data)?;
        self.check(i64::from(ret), "close", path)?;
        Ok(data)
    }

    /// Names and sizes in `dir`, in listing order.
    pub fn list(&mut self, dir: &str) -> Result<Vec<(String, u64)>> {
        let c = cstring(dir)?;
        let Some(mut handle) = self.shim.opendir(&c) else {
            return Err(self.error("opendir", dir));
        };
        // The shim's readdir cannot tell the end from a failure.
        let mut entries = Vec::new();
        let listed = loop {
            match self.shim.dispatcher_mut().readdir(&mut handle) {
                Ok(Some(entry)) => entries.push((entry.name, entry.size)),
                Ok(None) => break Ok(()),
                Err(errno) => break Err(errno),
            }
        };
        self.shim.closedir(handle);
        listed.map_err(|errno| errno_error("readdir", dir, errno))?;
        Ok(entries)
    }

    pub fn stat(&mut self, path: &str) -> Result<FileStat> {
        let c = cstring(path)?;
        let mut st = FileStat::default();
        let ret = self.shim.stat(&c, &mut st);
        self.check(i64::from(ret), "stat", path)?;
        Ok(st)
    }

    fn write_all(&mut self, fd: i32, data: &[u8], path: &str) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            let end = (written + CHUNK).min(data.len());
            let n = self.shim.write(fd, &data[written..end]);
            match self.check(n as i64, "write", path)? {
                0 => bail!("write {path}: no progress"),
                n => written += n as usize,
            }
        }
        Ok(())
    }

    /// Pass a non-negative return through; turn a negative one into an
    /// error carrying the shim's errno.
    fn check(&self, ret: i64, op: &str, path: &str) -> Result<i64> {
        if ret < 0 {
            Err(self.error(op, path))
        } else {
            Ok(ret)
        }
    }

    fn error(&self, op: &str, path: &str) -> anyhow::Error {
        match Errno::from_code(self.shim.errno()) {
            Some(errno) => errno_error(op, path, errno),
            None => anyhow!("{op} {path}: errno {}", self.shim.errno()),
        }
    }
}

fn errno_error(op: &str, path: &str, errno: Errno) -> anyhow::Error {
    anyhow!("{op} {path}: {errno} ({})", errno.name())
}

fn cstring(path: &str) -> Result<CString> {
    CString::new(path).with_context(|| format!("path {path:?} contains a NUL byte"))
}

fn load_snapshot(path: &Path) -> Result<SecureSnapshot> {
    match std::fs::read(path) {
        Ok(bytes) => SecureSnapshot::from_bytes(&bytes)
            .with_context(|| format!("decoding image {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no image yet; starting empty");
            Ok(SecureSnapshot::default())
        }
        Err(err) => Err(err).with_context(|| format!("reading image {}", path.display())),
    }
}
