//! Console pseudo-backend.
//!
//! Descriptor 0 is input; every other console descriptor is an output stream
//! onto the same character device. Output expands `\n` to `\r\n`.

use std::io::Write;
use std::sync::Arc;

use fsmux_types::{Errno, FileStat, FsResult};
use parking_lot::Mutex;

/// A byte-at-a-time output device.
pub trait CharDevice {
    fn put_char(&mut self, byte: u8);
}

/// Writes to the host's stderr.
#[derive(Debug, Default)]
pub struct StderrDevice;

impl CharDevice for StderrDevice {
    fn put_char(&mut self, byte: u8) {
        // The device has no error channel.
        let _ = std::io::stderr().write_all(&[byte]);
    }
}

/// Writes to any [`Write`] sink.
#[derive(Debug)]
pub struct WriterDevice<W>(pub W);

impl<W: Write> CharDevice for WriterDevice<W> {
    fn put_char(&mut self, byte: u8) {
        let _ = self.0.write_all(&[byte]);
    }
}

/// Captures output in a shared buffer. Clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferDevice {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl BufferDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.buf.lock().clone()
    }

    /// Drain the buffer.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.buf.lock())
    }
}

impl CharDevice for BufferDevice {
    fn put_char(&mut self, byte: u8) {
        self.buf.lock().push(byte);
    }
}

/// The console streams.
pub struct Console {
    device: Box<dyn CharDevice>,
}

impl Console {
    pub fn new(device: Box<dyn CharDevice>) -> Self {
        Self { device }
    }

    /// Reading is not supported on stdin and not permitted on the outputs.
    pub fn read(&mut self, fd: u8) -> FsResult<usize> {
        match fd {
            0 => Err(Errno::ENOTSUP),
            _ => Err(Errno::EACCES),
        }
    }

    /// Emit `data` on an output stream. Returns `data.len()`.
    pub fn write(&mut self, fd: u8, data: &[u8]) -> FsResult<usize> {
        if fd == 0 {
            return Err(Errno::EACCES);
        }
        for &byte in data {
            if byte == b'\n' {
                self.device.put_char(b'\r');
            }
            self.device.put_char(byte);
        }
        Ok(data.len())
    }

    pub fn fstat(&self, fd: u8) -> FileStat {
        FileStat::char_device(fd)
    }
}
