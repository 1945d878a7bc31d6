//! Open-descriptor bookkeeping.
//!
//! The dispatcher records every backend descriptor it hands out, with the
//! name and flags it was opened with. A descriptor not in the table is not
//! open, whatever the backend believes.

use std::collections::BTreeMap;

use fsmux_types::{DescriptorHandle, DescriptorLayout, OpenFlags};
use thiserror::Error;

/// One open backend descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenEntry {
    /// Backend-local name.
    pub name: String,
    pub flags: OpenFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("descriptor {0:?} is already open")]
    Occupied(DescriptorHandle),

    #[error("console descriptors are not tracked")]
    Console,

    #[error("descriptor table is full ({0} entries)")]
    Full(usize),
}

/// Open backend descriptors, bounded at construction.
#[derive(Debug)]
pub struct DescriptorTable {
    entries: BTreeMap<DescriptorHandle, OpenEntry>,
    capacity: usize,
}

impl DescriptorTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity,
        }
    }

    /// Room for every descriptor a layout can hand out.
    pub fn for_layout(layout: &DescriptorLayout) -> Self {
        Self::new(layout.general_max() as usize + layout.secure_max() as usize)
    }

    pub fn insert(
        &mut self,
        handle: DescriptorHandle,
        entry: OpenEntry,
    ) -> Result<(), TableError> {
        if matches!(handle, DescriptorHandle::Console(_)) {
            return Err(TableError::Console);
        }
        if self.entries.contains_key(&handle) {
            return Err(TableError::Occupied(handle));
        }
        if self.entries.len() >= self.capacity {
            return Err(TableError::Full(self.capacity));
        }
        self.entries.insert(handle, entry);
        Ok(())
    }

    pub fn get(&self, handle: DescriptorHandle) -> Option<&OpenEntry> {
        self.entries.get(&handle)
    }

    pub fn remove(&mut self, handle: DescriptorHandle) -> Option<OpenEntry> {
        self.entries.remove(&handle)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Open descriptors in handle order.
    pub fn handles(&self) -> impl Iterator<Item = DescriptorHandle> + '_ {
        self.entries.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsmux_types::NativeFd;

    fn entry(name: &str) -> OpenEntry {
        OpenEntry {
            name: name.to_string(),
            flags: OpenFlags::read(),
        }
    }

    #[test]
    fn test_insert_get_remove() {
        let mut table = DescriptorTable::new(4);
        let handle = DescriptorHandle::General(NativeFd(0));
        table.insert(handle, entry("a")).unwrap();
        assert_eq!(table.get(handle).unwrap().name, "a");
        assert_eq!(table.len(), 1);
        assert_eq!(table.remove(handle).unwrap().name, "a");
        assert!(table.remove(handle).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_same_native_fd_in_both_backends() {
        let mut table = DescriptorTable::new(4);
        table
            .insert(DescriptorHandle::General(NativeFd(0)), entry("g"))
            .unwrap();
        table
            .insert(DescriptorHandle::Secure(NativeFd(0)), entry("s"))
            .unwrap();
        assert_eq!(table.handles().count(), 2);
    }

    #[test]
    fn test_rejects_aliasing_and_console() {
        let mut table = DescriptorTable::new(4);
        let handle = DescriptorHandle::Secure(NativeFd(3));
        table.insert(handle, entry("a")).unwrap();
        assert_eq!(
            table.insert(handle, entry("b")),
            Err(TableError::Occupied(handle))
        );
        assert_eq!(
            table.insert(DescriptorHandle::STDOUT, entry("c")),
            Err(TableError::Console)
        );
    }

    #[test]
    fn test_capacity() {
        let layout = DescriptorLayout::default();
        assert_eq!(DescriptorTable::for_layout(&layout).capacity(), 16);

        let mut table = DescriptorTable::new(1);
        table
            .insert(DescriptorHandle::General(NativeFd(0)), entry("a"))
            .unwrap();
        assert_eq!(
            table.insert(DescriptorHandle::General(NativeFd(1)), entry("b")),
            Err(TableError::Full(1))
        );
    }
}
