//! General-store image hosted in a secure-store object.
//!
//! The container is opened for writing on the first store after a close
//! and stays open until [`Container::close`]. An object still open for
//! writing at a power loss is unreadable afterwards, which is why the
//! dispatcher closes the container after every durable general-store change.

use fsmux_types::{NativeFd, Whence};
use tracing::{debug, trace};

use crate::native::{Container, ContainerError, SecureAccess, SecureStatus, SecureStore};
use crate::translate::effective;

/// A [`Container`] backed by one secure-store object.
#[derive(Debug)]
pub struct SecureContainer<S> {
    store: S,
    name: String,
    capacity: u32,
    writer: Option<NativeFd>,
}

impl<S: SecureStore> SecureContainer<S> {
    pub fn new(store: S, name: impl Into<String>, capacity: u32) -> Self {
        Self {
            store,
            name: name.into(),
            capacity,
            writer: None,
        }
    }

    /// Name of the hosting object.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn fail(&self, status: SecureStatus) -> ContainerError {
        ContainerError::secure(&self.name, effective(status, self.store.last_status()))
    }

    fn read_all(&mut self, fd: NativeFd, len: usize) -> Result<Vec<u8>, SecureStatus> {
        let mut image = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match self.store.read(fd, &mut image[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        image.truncate(filled);
        Ok(image)
    }
}

impl<S: SecureStore> Container for SecureContainer<S> {
    fn load(&mut self) -> Result<Option<Vec<u8>>, ContainerError> {
        self.close()?;
        let info = match self.store.info(&self.name) {
            Ok(info) => info,
            Err(status) => {
                return match effective(status, self.store.last_status()) {
                    SecureStatus::FILE_NOT_EXISTS => Ok(None),
                    _ => Err(self.fail(status)),
                };
            }
        };
        let fd = self
            .store
            .open(&self.name, SecureAccess::Read)
            .map_err(|status| self.fail(status))?;
        let image = self.read_all(fd, info.size as usize);
        let closed = self.store.close(fd);
        let image = image.map_err(|status| self.fail(status))?;
        closed.map_err(|status| self.fail(status))?;
        debug!(name = %self.name, bytes = image.len(), "container loaded");
        Ok(Some(image))
    }

    fn store(&mut self, image: &[u8]) -> Result<(), ContainerError> {
        if image.len() > self.capacity as usize {
            return Err(ContainerError::TooLarge {
                size: image.len(),
                capacity: self.capacity,
            });
        }
        let fd = match self.writer {
            Some(fd) => fd,
            None => {
                let fd = self
                    .store
                    .open(
                        &self.name,
                        SecureAccess::Create {
                            max_size: self.capacity,
                        },
                    )
                    .map_err(|status| self.fail(status))?;
                trace!(name = %self.name, %fd, "container opened for writing");
                self.writer = Some(fd);
                fd
            }
        };
        self.store
            .seek(fd, 0, Whence::Set)
            .map_err(|status| self.fail(status))?;
        let mut written = 0;
        while written < image.len() {
            match self.store.write(fd, &image[written..]) {
                Ok(0) => return Err(self.fail(SecureStatus::NO_SPACE)),
                Ok(n) => written += n,
                Err(status) => return Err(self.fail(status)),
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), ContainerError> {
        if let Some(fd) = self.writer.take() {
            self.store.close(fd).map_err(|status| self.fail(status))?;
            trace!(name = %self.name, "container closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.writer.is_some()
    }
}
