//! Per-process file descriptor tables.
//!
//! FDs are dense small integers into a fixed table. Slots 0/1/2 are the
//! console streams. Each entry records the inode, the cursor, and the open
//! flags; directory FDs reuse the cursor as their enumeration index.

use viper_abi::{VError, VResult};

pub const MAX_FDS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdKind {
    /// Serial console (stdin/stdout/stderr).
    Console,
    File,
    Directory,
}

#[derive(Debug, Clone, Copy)]
pub struct FdEntry {
    pub kind: FdKind,
    pub ino: u64,
    /// Byte offset for files; entry index for directories.
    pub offset: u64,
    pub flags: u32,
}

pub struct FdTable {
    entries: [Option<FdEntry>; MAX_FDS],
}

impl FdTable {
    /// Fresh table with the three console streams pre-opened.
    pub fn new() -> Self {
        let mut entries = [None; MAX_FDS];
        let console = FdEntry {
            kind: FdKind::Console,
            ino: 0,
            offset: 0,
            flags: 0,
        };
        entries[0] = Some(console);
        entries[1] = Some(console);
        entries[2] = Some(console);
        Self { entries }
    }

    /// Allocate the lowest free descriptor.
    pub fn alloc(&mut self, entry: FdEntry) -> VResult<usize> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.is_none())
            .ok_or(VError::OutOfMemory)?;
        self.entries[idx] = Some(entry);
        Ok(idx)
    }

    pub fn get(&self, fd: usize) -> VResult<FdEntry> {
        self.entries
            .get(fd)
            .and_then(|e| *e)
            .ok_or(VError::InvalidArg)
    }

    pub fn get_mut(&mut self, fd: usize) -> VResult<&mut FdEntry> {
        self.entries
            .get_mut(fd)
            .and_then(|e| e.as_mut())
            .ok_or(VError::InvalidArg)
    }

    pub fn close(&mut self, fd: usize) -> VResult<()> {
        let slot = self.entries.get_mut(fd).ok_or(VError::InvalidArg)?;
        slot.take().map(|_| ()).ok_or(VError::InvalidArg)
    }

    /// Duplicate onto the lowest free descriptor.
    pub fn dup(&mut self, fd: usize) -> VResult<usize> {
        let entry = self.get(fd)?;
        self.alloc(entry)
    }

    /// Duplicate onto a specific descriptor, closing it first if open.
    pub fn dup2(&mut self, fd: usize, newfd: usize) -> VResult<usize> {
        if newfd >= MAX_FDS {
            return Err(VError::InvalidArg);
        }
        let entry = self.get(fd)?;
        if fd == newfd {
            return Ok(newfd);
        }
        self.entries[newfd] = Some(entry);
        Ok(newfd)
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn std_streams_are_preopened() {
        let t = FdTable::new();
        for fd in 0..3 {
            assert_eq!(t.get(fd).unwrap().kind, FdKind::Console);
        }
        assert!(t.get(3).is_err());
    }

    #[test]
    fn alloc_uses_lowest_free() {
        let mut t = FdTable::new();
        let e = FdEntry {
            kind: FdKind::File,
            ino: 9,
            offset: 0,
            flags: 0,
        };
        assert_eq!(t.alloc(e).unwrap(), 3);
        assert_eq!(t.alloc(e).unwrap(), 4);
        t.close(3).unwrap();
        assert_eq!(t.alloc(e).unwrap(), 3);
    }

    #[test]
    fn close_invalidates() {
        let mut t = FdTable::new();
        let e = FdEntry {
            kind: FdKind::File,
            ino: 1,
            offset: 0,
            flags: 0,
        };
        let fd = t.alloc(e).unwrap();
        t.close(fd).unwrap();
        assert!(t.get(fd).is_err());
        assert!(t.close(fd).is_err());
        assert!(t.close(4096).is_err());
    }

    #[test]
    fn dup_and_dup2_copy_entries() {
        let mut t = FdTable::new();
        let e = FdEntry {
            kind: FdKind::File,
            ino: 42,
            offset: 128,
            flags: 2,
        };
        let fd = t.alloc(e).unwrap();

        let d = t.dup(fd).unwrap();
        assert_eq!(t.get(d).unwrap().ino, 42);
        assert_eq!(t.get(d).unwrap().offset, 128);

        let d2 = t.dup2(fd, 10).unwrap();
        assert_eq!(d2, 10);
        assert_eq!(t.get(10).unwrap().ino, 42);

        assert!(t.dup2(fd, MAX_FDS).is_err());
        assert_eq!(t.dup2(fd, fd).unwrap(), fd);
    }
}
